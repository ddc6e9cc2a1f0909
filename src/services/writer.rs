use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::domain::{FieldRecord, PipelineVariant, EMPTY_PLACEHOLDER};

/// Append-only CSV sink for one run. The header is written once at creation;
/// rows are normalized, padded to the variant's width and appended in batches.
pub struct RecordWriter {
    variant: PipelineVariant,
    path: PathBuf,
    dropped: usize,
}

impl RecordWriter {
    /// Truncates any previous output and writes the header row.
    pub fn create(variant: PipelineVariant, path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("出力ファイルを作成できません: {}", path.display()))?;
        writer.write_record(variant.header())?;
        writer.flush()?;
        log::info!("出力ファイルを初期化しました: {}", path.display());

        Ok(RecordWriter {
            variant,
            path: path.to_path_buf(),
            dropped: 0,
        })
    }

    /// Appends a batch of records. A write failure loses that batch but must
    /// not abort the run, so it is logged rather than propagated.
    pub fn append(&mut self, records: &[FieldRecord]) {
        match self.try_append(records) {
            Ok(written) => {
                if written > 0 {
                    log::info!("{}件を保存しました: {}", written, self.path.display());
                }
            }
            Err(e) => log::error!("CSV書き込みに失敗しました ({}): {:#}", self.path.display(), e),
        }
    }

    fn try_append(&mut self, records: &[FieldRecord]) -> anyhow::Result<usize> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let mut written = 0;
        for record in records {
            match normalize_row(self.variant, record) {
                Some(row) => {
                    writer.write_record(&row)?;
                    written += 1;
                }
                None => {
                    self.dropped += 1;
                    log::warn!(
                        "dropping malformed {}-column row for {}",
                        record.len(),
                        record.subject()
                    );
                }
            }
        }
        writer.flush()?;
        Ok(written)
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Pads a record to the variant's width, or rejects it when it is too short
/// to be meaningful. Every field passes through `normalize_field`.
pub fn normalize_row(variant: PipelineVariant, record: &FieldRecord) -> Option<Vec<String>> {
    if record.len() < variant.min_row_len() {
        return None;
    }

    let mut row: Vec<String> = record
        .values()
        .iter()
        .take(variant.column_count())
        .map(|value| normalize_field(value))
        .collect();
    while row.len() < variant.column_count() {
        row.push(EMPTY_PLACEHOLDER.to_string());
    }
    Some(row)
}

/// Strips whitespace, wrapping quote/bracket characters, and label prefixes
/// the model sometimes echoes back into a value.
pub fn normalize_field(value: &str) -> String {
    let mut cleaned = value.trim();
    loop {
        let stripped = cleaned
            .trim_matches(|c| matches!(c, '"' | '\'' | '[' | ']' | '{' | '}'))
            .trim();
        if stripped == cleaned {
            break;
        }
        cleaned = stripped;
    }

    const LABEL_PREFIXES: [&str; 6] = ["業種:", "業種：", "industry:", "年商:", "年商：", "annual_sales:"];
    for prefix in LABEL_PREFIXES {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    cleaned.to_string()
}
