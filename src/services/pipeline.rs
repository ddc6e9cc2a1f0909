use std::path::PathBuf;

use anyhow::Context;
use rand::Rng;

use crate::configuration::PipelineSettings;
use crate::domain::{
    dedupe_records, read_subjects, FieldRecord, Outcome, PipelineVariant, Subject,
    EMPTY_PLACEHOLDER, FAILURE_MARKER, GENERIC_RECRUITER_NAME, NO_EXECUTIVES_MARKER,
    UNKNOWN_MARKER,
};
use crate::services::content_extractor::{
    extract, COMPANY_KEYWORDS, COMPANY_PREAMBLE, EXECUTIVE_PREAMBLE, OFFICER_KEYWORDS,
    RECRUITER_KEYWORDS, RECRUITER_PREAMBLE,
};
use crate::services::droid::Droid;
use crate::services::field_extractor::{
    extract_annual_sales, extract_executives, extract_industry, extract_recruiters,
    heuristic_recruiter_contacts, Executive, Recruiter,
};
use crate::services::openai_client::OpenaiClient;
use crate::services::resolver::{
    build_search_url, collect_revenue_panel_text, resolve, SearchIntent,
};
use crate::services::writer::RecordWriter;

/// Phases one subject moves through, surfaced in debug logs as the driver
/// progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    LoadingSubject,
    Resolving,
    Fetching,
    Extracting,
    Writing,
    CoolingDown,
    Done,
    FailedSubject,
}

impl Stage {
    /// The happy-path successor of each stage. A failed subject still cools
    /// down before the next subject starts.
    pub fn next(&self) -> Stage {
        match self {
            Stage::Idle => Stage::LoadingSubject,
            Stage::LoadingSubject => Stage::Resolving,
            Stage::Resolving => Stage::Fetching,
            Stage::Fetching => Stage::Extracting,
            Stage::Extracting => Stage::Writing,
            Stage::Writing => Stage::CoolingDown,
            Stage::CoolingDown => Stage::Done,
            Stage::Done => Stage::Done,
            Stage::FailedSubject => Stage::CoolingDown,
        }
    }
}

/// Run-scoped artifact directory holding debug screenshots. Screenshots are
/// working files; `teardown` removes them once the run is over.
pub struct RunContext {
    artifact_dir: PathBuf,
}

impl RunContext {
    pub fn new(artifact_dir: &std::path::Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(artifact_dir)
            .with_context(|| format!("failed to create {}", artifact_dir.display()))?;
        Ok(RunContext {
            artifact_dir: artifact_dir.to_path_buf(),
        })
    }

    pub async fn screenshot(&self, droid: &Droid, subject: &str, label: &str) {
        let path = self.artifact_dir.join(screenshot_file_name(subject, label));
        droid.screenshot(&path).await;
    }

    /// Deletes the screenshots this run produced. Other artifacts are kept.
    pub fn teardown(&self) {
        let Ok(entries) = std::fs::read_dir(&self.artifact_dir) else {
            return;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("screenshot_") && name.ends_with(".png") {
                if std::fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            log::info!("{}枚のスクリーンショットを削除しました", removed);
        }
    }
}

fn screenshot_file_name(subject: &str, label: &str) -> String {
    let sanitized: String = subject
        .chars()
        .map(|c| match c {
            ' ' | '　' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    format!("screenshot_{}_{}.png", sanitized, label)
}

/// Processes every subject in the input table and appends results to the
/// output table as each subject completes. A subject failure produces a
/// placeholder row and the run continues.
pub async fn run_pipeline(
    droid: &Droid,
    ctx: &RunContext,
    llm: &OpenaiClient,
    settings: &PipelineSettings,
) -> anyhow::Result<()> {
    let variant = settings.variant;
    let subjects = read_subjects(&settings.input_file)?;
    let mut writer = RecordWriter::create(variant, &settings.output_file)?;

    let total = subjects.len();
    for (index, subject) in subjects.iter().enumerate() {
        log::info!("[{}/{}] 処理開始: {}", index + 1, total, subject.name);
        log::debug!("{}: {:?}", subject.name, Stage::LoadingSubject);

        let outcome = match process_subject(droid, ctx, llm, variant, subject).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::debug!("{}: {:?}", subject.name, Stage::FailedSubject);
                log::error!("{} の処理に失敗しました: {:#}", subject.name, e);
                Outcome::Failure(FieldRecord::failure(variant, &subject.name))
            }
        };

        let records = match outcome {
            Outcome::Multiple(records) => dedupe_records(variant, records),
            other => other.into_records(),
        };
        log::debug!("{}: {:?}", subject.name, Stage::Writing);
        writer.append(&records);

        if index + 1 < total {
            let secs = rand::thread_rng()
                .gen_range(settings.cooldown_min_secs..=settings.cooldown_max_secs);
            log::debug!("{}: {:?} {}秒", subject.name, Stage::CoolingDown, secs);
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        }
    }

    if writer.dropped() > 0 {
        log::warn!("{}件の不正な行を破棄しました", writer.dropped());
    }
    log::info!("全{}社の処理が完了しました", total);
    Ok(())
}

async fn process_subject(
    droid: &Droid,
    ctx: &RunContext,
    llm: &OpenaiClient,
    variant: PipelineVariant,
    subject: &Subject,
) -> anyhow::Result<Outcome> {
    log::debug!("{}: {:?}", subject.name, Stage::Resolving);
    match variant {
        PipelineVariant::OfficialSite => {
            let url = resolve(droid, ctx, &subject.name, SearchIntent::OfficialSite).await?;
            Ok(official_site_outcome(&subject.name, url))
        }
        PipelineVariant::CompanyInfo => {
            let official =
                resolve(droid, ctx, &subject.name, SearchIntent::OfficialSite).await?;
            let industry = industry_for(droid, llm, &subject.name).await?;
            let sales = annual_sales_for(droid, llm, &subject.name).await?;
            Ok(Outcome::Single(company_info_record(
                &subject.name,
                official,
                industry,
                sales,
            )))
        }
        PipelineVariant::Executives => {
            let Some(url) =
                resolve(droid, ctx, &subject.name, SearchIntent::Executives).await?
            else {
                return Ok(Outcome::Failure(FieldRecord::failure(variant, &subject.name)));
            };
            let executives = executives_for(droid, ctx, llm, &subject.name, &url).await?;
            Ok(executive_outcome(&subject.name, &url, executives))
        }
        PipelineVariant::ExecutivesFull => {
            let Some(url) =
                resolve(droid, ctx, &subject.name, SearchIntent::Executives).await?
            else {
                return Ok(Outcome::Failure(FieldRecord::failure(variant, &subject.name)));
            };
            let executives = executives_for(droid, ctx, llm, &subject.name, &url).await?;
            let official =
                resolve(droid, ctx, &subject.name, SearchIntent::OfficialSite).await?;
            let industry = industry_for(droid, llm, &subject.name).await?;
            let sales = annual_sales_for(droid, llm, &subject.name).await?;
            Ok(executive_full_outcome(
                &subject.name,
                &url,
                executives,
                industry,
                official,
                sales,
            ))
        }
        PipelineVariant::Recruiters => {
            let search_url = build_search_url(&subject.name, SearchIntent::Recruiters);
            let resolved =
                resolve(droid, ctx, &subject.name, SearchIntent::Recruiters).await?;
            let Some(url) = resolved else {
                // The driver is still on the results page; scan it directly.
                let source = droid.page_source().await?;
                return Ok(recruiter_fallback_outcome(
                    &subject.name,
                    &search_url,
                    &source,
                ));
            };
            let source = droid.fetch_page(&url).await?;
            ctx.screenshot(droid, &subject.name, "page").await;
            let excerpt = extract(&source, &RECRUITER_KEYWORDS, RECRUITER_PREAMBLE);
            let recruiters = extract_recruiters(llm, &excerpt).await;
            if recruiters.is_empty() {
                // Result snippets often carry contact details the company
                // page itself does not.
                if droid.navigate(&search_url).await.is_err() {
                    return Ok(Outcome::Failure(FieldRecord::failure(
                        variant,
                        &subject.name,
                    )));
                }
                let results_source = droid.page_source().await?;
                return Ok(recruiter_fallback_outcome(
                    &subject.name,
                    &search_url,
                    &results_source,
                ));
            }
            Ok(Outcome::Multiple(recruiter_records(
                &subject.name,
                &url,
                recruiters,
            )))
        }
    }
}

async fn executives_for(
    droid: &Droid,
    ctx: &RunContext,
    llm: &OpenaiClient,
    subject: &str,
    url: &str,
) -> anyhow::Result<Vec<Executive>> {
    log::debug!("{}: {:?}", subject, Stage::Fetching);
    let source = droid.fetch_page(url).await?;
    ctx.screenshot(droid, subject, "page").await;
    log::debug!("{}: {:?}", subject, Stage::Extracting);
    let excerpt = extract(&source, &OFFICER_KEYWORDS, EXECUTIVE_PREAMBLE);
    let page_text = droid.body_text().await.unwrap_or_default();
    Ok(extract_executives(llm, &excerpt, &page_text).await)
}

/// Opens the industry search for `subject` and classifies from the results
/// page itself.
async fn industry_for(
    droid: &Droid,
    llm: &OpenaiClient,
    subject: &str,
) -> anyhow::Result<Option<String>> {
    let url = build_search_url(subject, SearchIntent::Industry);
    if let Err(e) = droid.navigate(&url).await {
        log::warn!("業種検索ページを開けませんでした ({}): {}", subject, e);
        return Ok(None);
    }
    let source = droid.page_source().await?;
    let excerpt = extract(&source, &COMPANY_KEYWORDS, COMPANY_PREAMBLE);
    let page_text = droid.body_text().await.unwrap_or_default();
    Ok(extract_industry(llm, &excerpt, &page_text).await)
}

/// Revenue comes off the results page, preferring answer-panel fragments.
async fn annual_sales_for(
    droid: &Droid,
    llm: &OpenaiClient,
    subject: &str,
) -> anyhow::Result<Option<String>> {
    let url = build_search_url(subject, SearchIntent::AnnualSales);
    if let Err(e) = droid.navigate(&url).await {
        log::warn!("年商検索ページを開けませんでした ({}): {}", subject, e);
        return Ok(None);
    }
    let mut overview = collect_revenue_panel_text(droid).await?;
    if overview.trim().is_empty() {
        overview = droid.body_text().await.unwrap_or_default();
    }
    Ok(extract_annual_sales(llm, &overview).await)
}

// ---------------------------------------------------------------------------
// Record assembly
// ---------------------------------------------------------------------------

fn official_site_outcome(subject: &str, url: Option<String>) -> Outcome {
    match url {
        Some(url) => Outcome::Single(FieldRecord::new(subject, vec![url])),
        None => Outcome::Failure(FieldRecord::new(subject, vec![FAILURE_MARKER.to_string()])),
    }
}

fn company_info_record(
    subject: &str,
    official: Option<String>,
    industry: Option<String>,
    sales: Option<String>,
) -> FieldRecord {
    FieldRecord::new(
        subject,
        vec![
            industry.unwrap_or_else(|| UNKNOWN_MARKER.to_string()),
            official.unwrap_or_else(|| FAILURE_MARKER.to_string()),
            sales.unwrap_or_else(|| EMPTY_PLACEHOLDER.to_string()),
        ],
    )
}

fn executive_outcome(subject: &str, url: &str, executives: Vec<Executive>) -> Outcome {
    if executives.is_empty() {
        return Outcome::Single(FieldRecord::new(
            subject,
            vec![
                url.to_string(),
                NO_EXECUTIVES_MARKER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
            ],
        ));
    }
    Outcome::Multiple(
        executives
            .into_iter()
            .map(|executive| {
                FieldRecord::new(
                    subject,
                    vec![
                        url.to_string(),
                        placeholder_if_empty(executive.position),
                        executive.name,
                    ],
                )
            })
            .collect(),
    )
}

fn executive_full_outcome(
    subject: &str,
    url: &str,
    executives: Vec<Executive>,
    industry: Option<String>,
    official: Option<String>,
    sales: Option<String>,
) -> Outcome {
    let industry = industry.unwrap_or_else(|| UNKNOWN_MARKER.to_string());
    let official = official.unwrap_or_else(|| FAILURE_MARKER.to_string());
    let sales = sales.unwrap_or_else(|| EMPTY_PLACEHOLDER.to_string());

    if executives.is_empty() {
        return Outcome::Single(FieldRecord::new(
            subject,
            vec![
                url.to_string(),
                NO_EXECUTIVES_MARKER.to_string(),
                EMPTY_PLACEHOLDER.to_string(),
                industry,
                official,
                sales,
            ],
        ));
    }
    Outcome::Multiple(
        executives
            .into_iter()
            .map(|executive| {
                FieldRecord::new(
                    subject,
                    vec![
                        url.to_string(),
                        placeholder_if_empty(executive.position),
                        executive.name,
                        industry.clone(),
                        official.clone(),
                        sales.clone(),
                    ],
                )
            })
            .collect(),
    )
}

fn recruiter_records(subject: &str, url: &str, recruiters: Vec<Recruiter>) -> Vec<FieldRecord> {
    recruiters
        .into_iter()
        .map(|recruiter| {
            let name = if recruiter.name.trim().is_empty() {
                GENERIC_RECRUITER_NAME.to_string()
            } else {
                recruiter.name
            };
            FieldRecord::new(
                subject,
                vec![
                    url.to_string(),
                    name,
                    placeholder_if_empty(recruiter.email),
                    placeholder_if_empty(recruiter.phone),
                ],
            )
        })
        .collect()
}

/// Builds the single contact row from a raw page scan, or a failure row when
/// the scan also comes up empty.
fn recruiter_fallback_outcome(subject: &str, url: &str, page_source: &str) -> Outcome {
    let (email, phones) = heuristic_recruiter_contacts(page_source);
    if email.is_none() && phones.is_empty() {
        return Outcome::Failure(FieldRecord::failure(PipelineVariant::Recruiters, subject));
    }
    Outcome::Single(FieldRecord::new(
        subject,
        vec![
            url.to_string(),
            GENERIC_RECRUITER_NAME.to_string(),
            email.unwrap_or_else(|| EMPTY_PLACEHOLDER.to_string()),
            phones
                .into_iter()
                .next()
                .unwrap_or_else(|| EMPTY_PLACEHOLDER.to_string()),
        ],
    ))
}

fn placeholder_if_empty(value: String) -> String {
    if value.trim().is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_advances_through_happy_path() {
        let mut stage = Stage::Idle;
        let mut seen = vec![stage];
        while stage != Stage::Done {
            stage = stage.next();
            seen.push(stage);
        }

        assert_eq!(
            seen,
            vec![
                Stage::Idle,
                Stage::LoadingSubject,
                Stage::Resolving,
                Stage::Fetching,
                Stage::Extracting,
                Stage::Writing,
                Stage::CoolingDown,
                Stage::Done,
            ]
        );
        assert_eq!(Stage::Done.next(), Stage::Done);
    }

    #[test]
    fn failed_subject_cools_down_before_the_next_subject() {
        assert_eq!(Stage::FailedSubject.next(), Stage::CoolingDown);
    }

    #[test]
    fn screenshot_names_replace_separators() {
        assert_eq!(
            screenshot_file_name("スターバックス コーヒー", "search"),
            "screenshot_スターバックス_コーヒー_search.png"
        );
    }

    #[test]
    fn unresolved_official_site_writes_failure_marker() {
        let outcome = official_site_outcome("Example Corp", None);
        let records = outcome.into_records();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values(), &["Example Corp", FAILURE_MARKER]);
    }

    #[test]
    fn resolved_official_site_writes_url() {
        let outcome =
            official_site_outcome("テスト株式会社", Some("https://example.co.jp/".to_string()));
        let records = outcome.into_records();

        assert_eq!(
            records[0].values(),
            &["テスト株式会社", "https://example.co.jp/"]
        );
    }

    #[test]
    fn company_info_fills_missing_fields_with_markers() {
        let record = company_info_record("テスト株式会社", None, None, None);
        assert_eq!(
            record.values(),
            &["テスト株式会社", UNKNOWN_MARKER, FAILURE_MARKER, EMPTY_PLACEHOLDER]
        );
    }

    #[test]
    fn executives_become_one_row_each() {
        let executives = vec![
            Executive {
                position: "代表取締役社長".to_string(),
                name: "山田 太郎".to_string(),
            },
            Executive {
                position: String::new(),
                name: "佐藤 花子".to_string(),
            },
        ];
        let outcome = executive_outcome("テスト株式会社", "https://example.co.jp/", executives);

        let records = outcome.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].values()[2], "代表取締役社長");
        // 役職不明はプレースホルダで埋める
        assert_eq!(records[1].values()[2], EMPTY_PLACEHOLDER);
        assert_eq!(records[1].values()[3], "佐藤 花子");
    }

    #[test]
    fn empty_executive_list_yields_single_marker_row() {
        let outcome = executive_outcome("テスト株式会社", "https://example.co.jp/", Vec::new());
        let records = outcome.into_records();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values()[2], NO_EXECUTIVES_MARKER);
    }

    #[test]
    fn full_rows_share_company_columns() {
        let executives = vec![
            Executive {
                position: "社長".to_string(),
                name: "山田 太郎".to_string(),
            },
            Executive {
                position: "監査役".to_string(),
                name: "佐藤 花子".to_string(),
            },
        ];
        let outcome = executive_full_outcome(
            "テスト株式会社",
            "https://example.co.jp/ir/",
            executives,
            Some("飲食業".to_string()),
            Some("https://example.co.jp/".to_string()),
            Some("100億円".to_string()),
        );

        for record in outcome.into_records() {
            assert_eq!(record.values()[4], "飲食業");
            assert_eq!(record.values()[5], "https://example.co.jp/");
            assert_eq!(record.values()[6], "100億円");
        }
    }

    #[test]
    fn recruiter_rows_default_missing_name() {
        let recruiters = vec![Recruiter {
            name: String::new(),
            email: "saiyou@example.co.jp".to_string(),
            phone: String::new(),
        }];
        let records = recruiter_records("テスト株式会社", "https://example.co.jp/", recruiters);

        assert_eq!(records[0].values()[2], GENERIC_RECRUITER_NAME);
        assert_eq!(records[0].values()[3], "saiyou@example.co.jp");
        assert_eq!(records[0].values()[4], EMPTY_PLACEHOLDER);
    }

    #[test]
    fn recruiter_fallback_scans_page_for_contacts() {
        let page = "お問い合わせ 採用窓口 recruit@example.co.jp 03-1234-5678";
        let outcome = recruiter_fallback_outcome("テスト株式会社", "https://example.co.jp/", page);

        let records = outcome.into_records();
        assert_eq!(records[0].values()[2], GENERIC_RECRUITER_NAME);
        assert_eq!(records[0].values()[3], "recruit@example.co.jp");
        assert_eq!(records[0].values()[4], "03-1234-5678");
    }

    #[test]
    fn recruiter_fallback_row_carries_search_url() {
        let search_url = build_search_url("テスト株式会社", SearchIntent::Recruiters);
        let page = "検索結果スニペット saiyou@example.co.jp 03-1234-5678";
        let outcome = recruiter_fallback_outcome("テスト株式会社", &search_url, page);

        let records = outcome.into_records();
        assert_eq!(records[0].values()[1], search_url);
        assert!(records[0].values()[1].contains("google.co.jp"));
        assert_eq!(records[0].values()[3], "saiyou@example.co.jp");
    }

    #[test]
    fn recruiter_fallback_without_contacts_is_failure() {
        let outcome = recruiter_fallback_outcome("テスト株式会社", FAILURE_MARKER, "関連情報なし");
        let records = outcome.into_records();

        assert_eq!(records[0].values()[1], FAILURE_MARKER);
        assert_eq!(records[0].values()[2], GENERIC_RECRUITER_NAME);
    }
}
