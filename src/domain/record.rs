use std::collections::HashSet;

/// Sentinel written when a whole subject could not be processed.
pub const FAILURE_MARKER: &str = "取得失敗";
/// Sentinel for a single field that could not be determined.
pub const EMPTY_PLACEHOLDER: &str = "情報なし";
/// Sentinel for the industry column when classification failed.
pub const UNKNOWN_MARKER: &str = "不明";
/// Position column marker when a page yielded no executives.
pub const NO_EXECUTIVES_MARKER: &str = "役員情報なし";
/// Position column marker inside a failure row.
pub const FAILURE_DETAIL_MARKER: &str = "情報取得失敗";
/// Default recruiter name when only an address was recovered.
pub const GENERIC_RECRUITER_NAME: &str = "採用担当";

/// The five output schemas observed in production. They are deliberately kept
/// as distinct configurations; no unified schema exists upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineVariant {
    OfficialSite,
    CompanyInfo,
    Executives,
    ExecutivesFull,
    Recruiters,
}

impl PipelineVariant {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            PipelineVariant::OfficialSite => &["会社名", "公式サイトURL"],
            PipelineVariant::CompanyInfo => &["会社名", "業種", "公式サイトURL", "年商"],
            PipelineVariant::Executives => &["会社名", "URL", "役職", "氏名"],
            PipelineVariant::ExecutivesFull => {
                &["会社名", "URL", "役職", "氏名", "業種", "公式サイトURL", "年商"]
            }
            PipelineVariant::Recruiters => {
                &["会社名", "URL", "採用担当者名", "メールアドレス", "電話番号"]
            }
        }
    }

    pub fn column_count(&self) -> usize {
        self.header().len()
    }

    /// Rows with fewer populated values than this are malformed and dropped
    /// rather than padded.
    pub fn min_row_len(&self) -> usize {
        match self {
            PipelineVariant::OfficialSite | PipelineVariant::CompanyInfo => 1,
            PipelineVariant::Executives
            | PipelineVariant::ExecutivesFull
            | PipelineVariant::Recruiters => 4,
        }
    }

    /// Column indices forming the duplicate-suppression key, scoped to one
    /// subject's record set.
    pub fn identity_columns(&self) -> &'static [usize] {
        match self {
            // 氏名
            PipelineVariant::Executives | PipelineVariant::ExecutivesFull => &[3],
            // 採用担当者名 + メールアドレス
            PipelineVariant::Recruiters => &[2, 3],
            PipelineVariant::OfficialSite | PipelineVariant::CompanyInfo => &[0],
        }
    }
}

/// One output row. `values[0]` is always the subject name and is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    values: Vec<String>,
}

impl FieldRecord {
    pub fn new(subject: &str, rest: Vec<String>) -> Self {
        let mut values = Vec::with_capacity(rest.len() + 1);
        values.push(subject.to_string());
        values.extend(rest);
        FieldRecord { values }
    }

    /// The placeholder row written when a subject fails entirely. Mirrors the
    /// column layout of the variant so the output stays rectangular.
    pub fn failure(variant: PipelineVariant, subject: &str) -> Self {
        let rest: Vec<String> = match variant {
            PipelineVariant::OfficialSite => vec![FAILURE_MARKER.to_string()],
            PipelineVariant::CompanyInfo => vec![
                UNKNOWN_MARKER.to_string(),
                FAILURE_MARKER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
            ],
            PipelineVariant::Executives => vec![
                FAILURE_MARKER.to_string(),
                FAILURE_DETAIL_MARKER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
            ],
            PipelineVariant::ExecutivesFull => vec![
                FAILURE_MARKER.to_string(),
                FAILURE_DETAIL_MARKER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
                UNKNOWN_MARKER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
            ],
            PipelineVariant::Recruiters => vec![
                FAILURE_MARKER.to_string(),
                GENERIC_RECRUITER_NAME.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
            ],
        };
        FieldRecord::new(subject, rest)
    }

    pub fn subject(&self) -> &str {
        &self.values[0]
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn identity_key(&self, variant: PipelineVariant) -> Option<String> {
        if self.values.len() < variant.min_row_len() {
            return None;
        }
        let key = variant
            .identity_columns()
            .iter()
            .map(|&idx| self.values.get(idx).map(String::as_str).unwrap_or(""))
            .map(|v| v.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        Some(key)
    }
}

/// What one subject produced. The driver resolves this explicitly instead of
/// sniffing list shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Single(FieldRecord),
    Multiple(Vec<FieldRecord>),
    Failure(FieldRecord),
}

impl Outcome {
    pub fn into_records(self) -> Vec<FieldRecord> {
        match self {
            Outcome::Single(record) | Outcome::Failure(record) => vec![record],
            Outcome::Multiple(records) => records,
        }
    }
}

/// First-seen-wins duplicate suppression within one subject's record set.
/// Records too short to carry an identity key are dropped outright and do not
/// count as duplicates.
pub fn dedupe_records(variant: PipelineVariant, records: Vec<FieldRecord>) -> Vec<FieldRecord> {
    let before = records.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique: Vec<FieldRecord> = Vec::with_capacity(before);

    for record in records {
        let Some(key) = record.identity_key(variant) else {
            log::warn!("dropping malformed {}-column row", record.len());
            continue;
        };
        if seen.insert(key) {
            unique.push(record);
        } else {
            log::debug!("duplicate suppressed for {}", record.subject());
        }
    }

    let removed = before - unique.len();
    if removed > 0 {
        log::info!("{}件の重複データを除外しました", removed);
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_row(name: &str) -> FieldRecord {
        FieldRecord::new(
            "テスト株式会社",
            vec![
                "https://example.co.jp/".to_string(),
                "代表取締役社長".to_string(),
                name.to_string(),
            ],
        )
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let records = vec![exec_row("山田 太郎"), exec_row("佐藤 花子"), exec_row("山田 太郎")];
        let result = dedupe_records(PipelineVariant::Executives, records.clone());

        assert_eq!(result, vec![records[0].clone(), records[1].clone()]);
    }

    #[test]
    fn dedupe_drops_short_rows_without_counting() {
        let short = FieldRecord::new("テスト株式会社", vec!["url".to_string()]);
        let records = vec![short, exec_row("山田 太郎")];
        let result = dedupe_records(PipelineVariant::Executives, records);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].values()[3], "山田 太郎");
    }

    #[test]
    fn dedupe_output_is_stable_subsequence() {
        let records = vec![
            exec_row("a"),
            exec_row("b"),
            exec_row("a"),
            exec_row("c"),
            exec_row("b"),
        ];
        let result = dedupe_records(PipelineVariant::Executives, records);

        let names: Vec<&str> = result.iter().map(|r| r.values()[3].as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn recruiter_key_is_name_and_email() {
        let row = |name: &str, email: &str| {
            FieldRecord::new(
                "テスト株式会社",
                vec![
                    "https://example.co.jp/".to_string(),
                    name.to_string(),
                    email.to_string(),
                    "03-1234-5678".to_string(),
                ],
            )
        };
        let records = vec![
            row("採用担当", "saiyou@example.co.jp"),
            row("採用担当", "hr@example.co.jp"),
            row("採用担当", "saiyou@example.co.jp"),
        ];
        let result = dedupe_records(PipelineVariant::Recruiters, records);

        assert_eq!(result.len(), 2);
    }

    #[test]
    fn failure_rows_match_variant_width() {
        for variant in [
            PipelineVariant::OfficialSite,
            PipelineVariant::CompanyInfo,
            PipelineVariant::Executives,
            PipelineVariant::ExecutivesFull,
            PipelineVariant::Recruiters,
        ] {
            let row = FieldRecord::failure(variant, "テスト株式会社");
            assert_eq!(row.len(), variant.column_count());
            assert_eq!(row.subject(), "テスト株式会社");
        }
    }
}
