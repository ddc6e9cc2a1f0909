use scraper::{Html, Selector};
use url::Url;

use crate::domain::first_some;
use crate::services::droid::Droid;
use crate::services::pipeline::RunContext;

/// Result-block selectors observed across Google results page variants, in
/// the order they are worth trying.
pub const RESULT_BLOCK_SELECTORS: [&str; 9] = [
    "div.g",
    "div[data-sokoban-container]",
    "div.tF2Cxc",
    "div.yuRUbf",
    "#search .g",
    ".rc",
    "div.hlcw0c",
    "div.MjjYud",
    "h3.LC20lb",
];

const LINK_SELECTORS: [&str; 3] = ["a[jsname='UWckNb']", "a[href]", "a"];

/// Answer-panel selectors carrying revenue figures on the results page.
pub const ANSWER_PANEL_SELECTORS: [&str; 8] = [
    "div[data-attrid='kc:/business/business_operation:revenue']",
    "div[data-attrid='kc:/organization/organization:revenue']",
    "div.kp-wholepage",
    "div.osrp-blk",
    "div[data-hveid]",
    "div.Z0LcW",
    "div.IZ6rdc",
    "div.zloOqf",
];

/// Known subjects whose official domain is guessable from the name alone.
const DOMAIN_GUESSES: [(&str, &str); 5] = [
    ("スターバックス", "starbucks"),
    ("ファーストリテイリング", "fastretailing"),
    ("コメダ", "komeda"),
    ("はま寿司", "hamazushi"),
    ("ドトール", "doutor"),
];

/// If a cleaned URL keeps more path segments than this it is collapsed to
/// scheme+host.
const MAX_PATH_SEGMENTS: usize = 1;

/// The category of field being resolved; selects the query suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchIntent {
    OfficialSite,
    Industry,
    AnnualSales,
    Executives,
    Recruiters,
}

impl SearchIntent {
    fn query_suffix(&self) -> &'static str {
        match self {
            SearchIntent::OfficialSite => "公式サイト",
            SearchIntent::Industry => "業種",
            SearchIntent::AnnualSales => "年商",
            SearchIntent::Executives => "役員一覧 OR 役員紹介 OR 経営陣 -pdf",
            SearchIntent::Recruiters => "採用担当者メールアドレス",
        }
    }
}

pub fn build_search_url(subject: &str, intent: SearchIntent) -> String {
    let query = format!("{} {}", subject, intent.query_suffix());
    search_url_for_query(&query)
}

fn search_url_for_query(query: &str) -> String {
    // The base is static; parsing it cannot fail.
    Url::parse_with_params(
        "https://www.google.co.jp/search",
        &[("q", query), ("hl", "ja")],
    )
    .unwrap()
    .to_string()
}

/// Turns a subject and intent into a candidate source URL by inspecting the
/// search results page. Returns `None` when every selector fails and no name
/// guess applies; the caller decides what a missing URL means.
pub async fn resolve(
    droid: &Droid,
    ctx: &RunContext,
    subject: &str,
    intent: SearchIntent,
) -> anyhow::Result<Option<String>> {
    let search_url = build_search_url(subject, intent);
    log::debug!("search url: {}", search_url);

    if let Err(e) = droid.navigate(&search_url).await {
        log::error!("failed to open search page for {}: {}", subject, e);
        return Ok(guess_domain(subject));
    }
    ctx.screenshot(droid, subject, "search").await;

    if let Some(href) = first_link_from_results(droid).await? {
        return Ok(Some(clean_url(&href)));
    }

    // One secondary attempt including PDFs; executives lists often only
    // exist as IR documents.
    if intent == SearchIntent::Executives {
        let pdf_query = format!("{} 役員一覧 OR 役員紹介 OR 経営陣 filetype:pdf", subject);
        let pdf_url = search_url_for_query(&pdf_query);
        log::debug!("pdf search url: {}", pdf_url);
        if droid.navigate(&pdf_url).await.is_ok() {
            if let Some(href) = first_link_from_results(droid).await? {
                return Ok(Some(clean_url(&href)));
            }
        }
    }

    log::warn!("no search results found for {}", subject);
    Ok(guess_domain(subject))
}

async fn first_link_from_results(droid: &Droid) -> anyhow::Result<Option<String>> {
    for selector in RESULT_BLOCK_SELECTORS {
        if !droid.wait_for_selector(selector).await {
            continue;
        }
        let page_source = droid.page_source().await?;
        if let Some(href) = extract_link_from_block(&page_source, selector) {
            log::debug!("found result link using selector {}", selector);
            return Ok(Some(href));
        }
    }
    Ok(None)
}

/// Pulls the first usable href out of the first block matching
/// `block_selector`, trying the link-selector variants in order.
pub fn extract_link_from_block(page_source: &str, block_selector: &str) -> Option<String> {
    let document = Html::parse_document(page_source);
    let block_selector = Selector::parse(block_selector).ok()?;
    let block = document.select(&block_selector).next()?;

    first_some(&LINK_SELECTORS, |link_selector| {
        let selector = Selector::parse(link_selector).ok()?;
        block
            .select(&selector)
            .find_map(|anchor| anchor.value().attr("href"))
            .map(str::to_string)
    })
    .filter(|href| href.starts_with("http"))
}

/// Strips tracking parameters and collapses deep links to scheme+host.
pub fn clean_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };
    parsed.set_query(None);
    parsed.set_fragment(None);

    let segment_count = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count())
        .unwrap_or(0);
    if segment_count > MAX_PATH_SEGMENTS {
        if let Some(host) = parsed.host_str() {
            return format!("{}://{}/", parsed.scheme(), host);
        }
    }
    parsed.to_string()
}

/// Static name→domain table for a handful of known subjects.
pub fn guess_domain(subject: &str) -> Option<String> {
    first_some(&DOMAIN_GUESSES, |(fragment, domain)| {
        subject
            .contains(fragment)
            .then(|| format!("https://www.{}.co.jp/", domain))
    })
}

/// Collects answer-panel text from the current results page, keeping only
/// fragments that actually carry a yen figure.
pub async fn collect_revenue_panel_text(droid: &Droid) -> anyhow::Result<String> {
    let page_source = droid.page_source().await?;
    Ok(revenue_text_from_source(&page_source))
}

pub fn revenue_text_from_source(page_source: &str) -> String {
    let document = Html::parse_document(page_source);
    let mut overview = String::new();

    for selector in ANSWER_PANEL_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            let text: String = element.text().collect();
            if text.contains('億') || text.contains("万円") {
                overview.push_str(text.trim());
                overview.push('\n');
            }
        }
    }
    overview
}
