use std::path::Path;

use anyhow::Context;

/// One input row: a trimmed, non-empty company name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
}

impl Subject {
    pub fn parse(raw: &str) -> Option<Subject> {
        let name = raw.trim();
        if name.is_empty() {
            return None;
        }
        Some(Subject {
            name: name.to_string(),
        })
    }
}

/// Reads the subject list from the input table. The first row is a header and
/// is skipped; blank rows are dropped. An unreadable input file is the one
/// startup error that is fatal to the run.
pub fn read_subjects(path: &Path) -> anyhow::Result<Vec<Subject>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("入力ファイルが見つかりません: {}", path.display()))?;

    let mut subjects = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("failed to read row from {}", path.display()))?;
        if let Some(subject) = row.get(0).and_then(Subject::parse) {
            subjects.push(subject);
        }
    }

    log::info!("{}社を読み込みました: {}", subjects.len(), path.display());
    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_trims_and_rejects_blank() {
        assert_eq!(
            Subject::parse("  株式会社サンプル  "),
            Some(Subject {
                name: "株式会社サンプル".to_string()
            })
        );
        assert_eq!(Subject::parse("   "), None);
    }

    #[test]
    fn read_skips_header_and_blank_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "会社名").unwrap();
        writeln!(file, "スターバックス コーヒー ジャパン").unwrap();
        writeln!(file, "").unwrap();
        writeln!(file, "はま寿司").unwrap();
        file.flush().unwrap();

        let subjects = read_subjects(file.path()).unwrap();
        let names: Vec<&str> = subjects.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["スターバックス コーヒー ジャパン", "はま寿司"]);
    }

    #[test]
    fn missing_input_file_is_an_error() {
        let result = read_subjects(Path::new("./does-not-exist/input.csv"));
        assert!(result.is_err());
    }
}
