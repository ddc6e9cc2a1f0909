use std::sync::OnceLock;

use anyhow::{anyhow, bail};
use regex::Regex;
use serde::Deserialize;

use crate::domain::first_some;
use crate::services::openai_client::OpenaiClient;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Executive {
    #[serde(rename = "役職", default)]
    pub position: String,
    #[serde(rename = "氏名", default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Recruiter {
    #[serde(rename = "採用担当者名", default)]
    pub name: String,
    #[serde(rename = "メールアドレス", default)]
    pub email: String,
    #[serde(rename = "電話番号", default)]
    pub phone: String,
}

/// Position titles the heuristic pass pairs with name-shaped tokens,
/// longest first so the regex alternation prefers the most specific title.
const POSITION_VOCABULARY: [&str; 14] = [
    "代表取締役最高経営責任者",
    "代表取締役社長兼CEO",
    "代表取締役社長CEO",
    "代表取締役社長",
    "代表取締役CEO",
    "代表取締役",
    "取締役会長",
    "取締役社長",
    "常務取締役",
    "副社長",
    "監査役",
    "社長",
    "会長",
    "CEO",
];

/// Tokens that look name-shaped to the regex but are actually titles.
const POSITION_TERMS: [&str; 14] = [
    "取締役",
    "監査等委員",
    "代表取締役",
    "社長",
    "会長",
    "執行役員",
    "CEO",
    "取締役会長",
    "副社長",
    "常務",
    "専務",
    "執行",
    "監査役",
    "支配人",
];

const SENTENCE_KEYWORDS: [&str; 8] = [
    "役員",
    "取締役",
    "代表",
    "社長",
    "会長",
    "CEO",
    "取締役会長",
    "執行役員",
];

const PREFERRED_EMAIL_KEYWORDS: [&str; 6] =
    ["recruit", "career", "personnel", "hr", "jinji", "saiyou"];

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub fn executives_prompt(text: &str) -> String {
    format!(
        r#"与えられた文脈から役員情報をできるだけ多く抽出してJSON形式で返してください。

文脈:
{text}

出力形式:
{{
    "executives": [
        {{"役職": "役職名", "氏名": "氏名"}}
    ]
}}

抽出ルール:
1. 文脈に明示的に記載されている情報のみを使用すること
2. できるだけ多くの役員情報を抽出すること
3. 情報が不明確・欠落している場合は該当フィールドを空文字列("")として返すこと
4. 名前に含まれる漢字や仮名は変換や置き換えをせず、そのまま保持すること

エラー処理:
- 文脈が空の場合: {{"executives": []}}
- 役員情報が見つからない場合: {{"executives": []}}
- 不正なフォーマットの場合: {{"error": "Invalid format in source text"}}

注意事項:
- 推測や外部知識は使用しないこと
- JSON以外の文字列を出力しないこと"#
    )
}

pub fn recruiters_prompt(text: &str) -> String {
    format!(
        r#"与えられた文脈から採用担当者情報を抽出してJSON形式で返してください。

文脈:
{text}

出力形式:
{{
    "recruiters": [
        {{"採用担当者名": "氏名", "メールアドレス": "アドレス", "電話番号": "番号"}}
    ]
}}

抽出ルール:
1. 文脈に明示的に記載されている情報のみを使用すること
2. 情報が不明確・欠落している場合は該当フィールドを空文字列("")として返すこと

エラー処理:
- 文脈が空の場合: {{"recruiters": []}}
- 採用担当者情報が見つからない場合: {{"recruiters": []}}
- 不正なフォーマットの場合: {{"error": "Invalid format in source text"}}

注意事項:
- 推測や外部知識は使用しないこと
- JSON以外の文字列を出力しないこと"#
    )
}

pub fn industry_prompt(text: &str) -> String {
    format!(
        r#"以下の文脈から企業の業種を特定してください。

文脈:
{text}

出力形式:
{{"industry": "業種名"}}

注意事項:
1. 文脈に明示的に記載されている情報のみを使用すること
2. できるだけ具体的な業種を選択すること
3. 不明な場合は "不明" と返すこと
4. JSON以外の文字列を出力しないこと"#
    )
}

pub fn annual_sales_prompt(text: &str) -> String {
    format!(
        r#"以下のテキストから最新の年商（売上高）を抽出してください。
金額は「億円」「万円」などの単位を含めて正確に抽出してください。

テキスト:
{text}

出力形式:
{{"annual_sales": "金額（単位含む）"}}

注意事項:
1. 最新の数値を優先すること
2. 数値と単位は正確に抽出すること（例: 772億9600万円）
3. 見つからない場合は空文字列を返すこと
4. JSON以外の文字列を出力しないこと"#
    )
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// Models occasionally wrap JSON in a markdown code fence despite the prompt.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses a JSON object response. An `error` key from the model propagates as
/// a failure rather than a value.
fn parse_json_object(raw: &str) -> anyhow::Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(raw))?;
    if let Some(message) = value.get("error") {
        bail!("model reported an extraction error: {}", message);
    }
    Ok(value)
}

pub fn parse_executives_payload(raw: &str) -> anyhow::Result<Vec<Executive>> {
    let value = parse_json_object(raw)?;
    let list = value
        .get("executives")
        .ok_or_else(|| anyhow!("missing \"executives\" key"))?;
    let executives: Vec<Executive> = serde_json::from_value(list.clone())?;
    Ok(executives
        .into_iter()
        .filter(|executive| !executive.name.trim().is_empty())
        .collect())
}

pub fn parse_recruiters_payload(raw: &str) -> anyhow::Result<Vec<Recruiter>> {
    let value = parse_json_object(raw)?;
    let list = value
        .get("recruiters")
        .ok_or_else(|| anyhow!("missing \"recruiters\" key"))?;
    let recruiters: Vec<Recruiter> = serde_json::from_value(list.clone())?;
    // 連絡先のない行は書いても使い道がない
    Ok(recruiters
        .into_iter()
        .filter(|recruiter| {
            !recruiter.email.trim().is_empty() || !recruiter.phone.trim().is_empty()
        })
        .collect())
}

pub fn parse_scalar_payload(raw: &str, key: &str) -> anyhow::Result<String> {
    let value = parse_json_object(raw)?;
    let scalar = value
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing \"{}\" key", key))?;
    Ok(scalar.trim().to_string())
}

// ---------------------------------------------------------------------------
// Heuristic fallback
// ---------------------------------------------------------------------------

fn executive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let positions = POSITION_VOCABULARY.join("|");
        Regex::new(&format!(
            r"({positions})[\s　]*([一-龯ぁ-んァ-ヶー]{{1,10}}[\s　]*[一-龯ぁ-んァ-ヶー]{{1,10}})"
        ))
        .unwrap()
    })
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[一-龯ぁ-んァ-ヶー]{1,10}[\s　]*[一-龯ぁ-んァ-ヶー]{1,10}").unwrap()
    })
}

fn is_plausible_name(name: &str) -> bool {
    name.chars().count() >= 2 && !POSITION_TERMS.contains(&name)
}

/// Regex pass over the keyword-densest sentence of the page, used when the
/// model response is absent, malformed or empty.
pub fn heuristic_executives(page_text: &str) -> Vec<Executive> {
    let best_section = page_text
        .split(['。', '\n'])
        .map(str::trim)
        .filter(|sentence| SENTENCE_KEYWORDS.iter().any(|k| sentence.contains(k)))
        .max_by_key(|sentence| sentence.chars().count());
    let Some(best_section) = best_section else {
        return Vec::new();
    };

    let passes: [fn(&str) -> Vec<Executive>; 2] = [combined_pattern_pass, position_then_name_pass];
    first_some(&passes, |pass| {
        let found = pass(best_section);
        (!found.is_empty()).then_some(found)
    })
    .unwrap_or_default()
}

fn combined_pattern_pass(section: &str) -> Vec<Executive> {
    executive_regex()
        .captures_iter(section)
        .filter_map(|captures| {
            let position = captures.get(1)?.as_str().to_string();
            let name = captures.get(2)?.as_str().trim().to_string();
            is_plausible_name(&name).then_some(Executive { position, name })
        })
        .collect()
}

fn position_then_name_pass(section: &str) -> Vec<Executive> {
    let mut found = Vec::new();
    for position in POSITION_VOCABULARY {
        let Some(index) = section.find(position) else {
            continue;
        };
        let after = &section[index + position.len()..];
        let window: String = after.chars().take(50).collect();
        if let Some(name) = name_regex().find(&window) {
            let name = name.as_str().trim().to_string();
            if is_plausible_name(&name) {
                found.push(Executive {
                    position: position.to_string(),
                    name,
                });
            }
        }
    }
    found
}

fn sales_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9０-９][0-9０-９,，\.]*(?:億(?:[0-9０-９,，]+)?万?|万)?円").unwrap()
    })
}

/// Direct extraction of a currency-style figure.
pub fn heuristic_annual_sales(text: &str) -> Option<String> {
    sales_regex()
        .find(text)
        .map(|figure| figure.as_str().to_string())
}

/// Colon-delimited line scan for the industry field.
pub fn heuristic_industry(page_text: &str) -> Option<String> {
    const INDUSTRY_KEYWORDS: [&str; 9] = [
        "事業内容",
        "事業概要",
        "企業概要",
        "主な事業",
        "主要な事業",
        "業種",
        "業態",
        "事業領域",
        "事業分野",
    ];

    page_text.lines().find_map(|line| {
        if !INDUSTRY_KEYWORDS.iter().any(|keyword| line.contains(keyword)) {
            return None;
        }
        let mut parts = line.split(['：', ':', '｜', '|']);
        parts.next()?;
        let industry = parts.next()?.trim();
        (!industry.is_empty()).then(|| industry.to_string())
    })
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap()
    })
}

fn phone_patterns() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"0\d{1,3}-\d{1,4}-\d{4}",
            r"0\d{9,10}",
            r"\(\d{1,4}\)\d{1,4}-\d{4}",
            r"0\d{1,3}[ー－]\d{1,4}[ー－]\d{4}",
            r"0120-\d{3}-\d{3}",
            r"0[789]\d-\d{4}-\d{4}",
            r"0\d{1,3}\s+\d{1,4}\s+\d{4}",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
    })
}

fn phone_shape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:0\d{1,3}-\d{1,4}-\d{4}|0120-\d{3}-\d{3})$").unwrap())
}

fn tollfree_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0120-\d{3}-\d{3}$").unwrap())
}

/// Hyphen normalization plus area-code validation for Japanese numbers.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    if cleaned.len() < 10 {
        return None;
    }

    let cleaned = if cleaned.contains('-') {
        cleaned
    } else {
        match cleaned.len() {
            10 => format!("{}-{}-{}", &cleaned[..2], &cleaned[2..6], &cleaned[6..]),
            11 => format!("{}-{}-{}", &cleaned[..3], &cleaned[3..7], &cleaned[7..]),
            12 => format!("{}-{}-{}", &cleaned[..4], &cleaned[4..8], &cleaned[8..]),
            _ => cleaned,
        }
    };

    if !phone_shape_regex().is_match(&cleaned) {
        return None;
    }

    let area_code = cleaned.split('-').next().unwrap_or("");
    if area_code == "0120" {
        if !tollfree_regex().is_match(&cleaned) {
            return None;
        }
    } else if !["080", "090", "070"].contains(&area_code) {
        // 市外局番の2桁目が0になることはない
        if area_code.len() < 2 || area_code.as_bytes()[1] == b'0' {
            return None;
        }
    }

    Some(cleaned)
}

/// Scans a results page for contact details: the preferred recruiting email
/// (if any) plus validated phone numbers, duplicates removed in order.
pub fn heuristic_recruiter_contacts(page_source: &str) -> (Option<String>, Vec<String>) {
    let emails: Vec<&str> = email_regex()
        .find_iter(page_source)
        .map(|m| m.as_str())
        .collect();
    let preferred_email = emails
        .iter()
        .find(|email| {
            let lowered = email.to_lowercase();
            PREFERRED_EMAIL_KEYWORDS
                .iter()
                .any(|keyword| lowered.contains(keyword))
        })
        .or_else(|| emails.first())
        .map(|email| email.to_string());

    let mut seen = std::collections::HashSet::new();
    let mut phones = Vec::new();
    for pattern in phone_patterns().iter() {
        for candidate in pattern.find_iter(page_source) {
            if let Some(phone) = normalize_phone(candidate.as_str()) {
                if seen.insert(phone.clone()) {
                    phones.push(phone);
                }
            }
        }
    }

    (preferred_email, phones)
}

// ---------------------------------------------------------------------------
// Orchestration: model first, heuristics second
// ---------------------------------------------------------------------------

pub async fn extract_executives(
    llm: &OpenaiClient,
    excerpt: &str,
    page_text: &str,
) -> Vec<Executive> {
    let attempt = match llm.generate(&executives_prompt(excerpt)).await {
        Ok(raw) => parse_executives_payload(&raw),
        Err(e) => Err(e),
    };
    match attempt {
        Ok(executives) if !executives.is_empty() => executives,
        Ok(_) => {
            log::debug!("model returned no executives, trying heuristic pass");
            heuristic_executives(page_text)
        }
        Err(e) => {
            log::warn!("structured executive extraction failed: {:#}", e);
            heuristic_executives(page_text)
        }
    }
}

pub async fn extract_recruiters(llm: &OpenaiClient, excerpt: &str) -> Vec<Recruiter> {
    let attempt = match llm.generate(&recruiters_prompt(excerpt)).await {
        Ok(raw) => parse_recruiters_payload(&raw),
        Err(e) => Err(e),
    };
    match attempt {
        Ok(recruiters) => recruiters,
        Err(e) => {
            log::warn!("structured recruiter extraction failed: {:#}", e);
            Vec::new()
        }
    }
}

pub async fn extract_industry(
    llm: &OpenaiClient,
    excerpt: &str,
    page_text: &str,
) -> Option<String> {
    let attempt = match llm.generate(&industry_prompt(excerpt)).await {
        Ok(raw) => parse_scalar_payload(&raw, "industry"),
        Err(e) => Err(e),
    };
    match attempt {
        Ok(industry) if !industry.is_empty() => Some(industry),
        Ok(_) => heuristic_industry(page_text),
        Err(e) => {
            log::warn!("structured industry extraction failed: {:#}", e);
            heuristic_industry(page_text)
        }
    }
}

pub async fn extract_annual_sales(llm: &OpenaiClient, overview_text: &str) -> Option<String> {
    if overview_text.trim().is_empty() {
        return None;
    }
    let attempt = match llm.generate(&annual_sales_prompt(overview_text)).await {
        Ok(raw) => parse_scalar_payload(&raw, "annual_sales"),
        Err(e) => Err(e),
    };
    match attempt {
        Ok(sales) if !sales.is_empty() => Some(sales),
        Ok(_) => heuristic_annual_sales(overview_text),
        Err(e) => {
            log::warn!("structured sales extraction failed: {:#}", e);
            heuristic_annual_sales(overview_text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_executives_payload_parses() {
        let raw = r#"{"executives": [
            {"役職": "代表取締役社長", "氏名": "山田 太郎"},
            {"役職": "監査役", "氏名": "佐藤 花子"}
        ]}"#;
        let executives = parse_executives_payload(raw).unwrap();

        assert_eq!(executives.len(), 2);
        assert_eq!(executives[0].position, "代表取締役社長");
        assert_eq!(executives[0].name, "山田 太郎");
    }

    #[test]
    fn fenced_payload_parses() {
        let raw = "```json\n{\"executives\": [{\"役職\": \"社長\", \"氏名\": \"山田 太郎\"}]}\n```";
        let executives = parse_executives_payload(raw).unwrap();
        assert_eq!(executives.len(), 1);
    }

    #[test]
    fn error_key_propagates_as_failure() {
        let raw = r#"{"error": "Invalid format in source text"}"#;
        assert!(parse_executives_payload(raw).is_err());
    }

    #[test]
    fn empty_payload_is_empty_not_error() {
        let executives = parse_executives_payload(r#"{"executives": []}"#).unwrap();
        assert!(executives.is_empty());
    }

    #[test]
    fn nameless_entries_are_dropped() {
        let raw = r#"{"executives": [{"役職": "取締役", "氏名": ""}]}"#;
        let executives = parse_executives_payload(raw).unwrap();
        assert!(executives.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_executives_payload("role: name").is_err());
        assert!(parse_executives_payload("").is_err());
    }

    #[test]
    fn contactless_recruiters_are_dropped() {
        let raw = r#"{"recruiters": [
            {"採用担当者名": "山田 太郎", "メールアドレス": "", "電話番号": ""},
            {"採用担当者名": "", "メールアドレス": "", "電話番号": "03-1234-5678"},
            {"採用担当者名": "佐藤 花子", "メールアドレス": "saiyou@example.co.jp", "電話番号": ""}
        ]}"#;
        let recruiters = parse_recruiters_payload(raw).unwrap();

        assert_eq!(recruiters.len(), 2);
        assert_eq!(recruiters[0].phone, "03-1234-5678");
        assert_eq!(recruiters[1].email, "saiyou@example.co.jp");
    }

    #[test]
    fn scalar_payload_parses() {
        let industry = parse_scalar_payload(r#"{"industry": "カフェ・コーヒーショップ"}"#, "industry");
        assert_eq!(industry.unwrap(), "カフェ・コーヒーショップ");
    }

    #[test]
    fn heuristic_finds_position_name_pair() {
        let page_text = "会社概要。\n当社の経営体制は次のとおりです。代表取締役社長 竹林 基哉、監査役 田中 一郎が務めています。";
        let executives = heuristic_executives(page_text);

        assert!(!executives.is_empty());
        assert_eq!(executives[0].position, "代表取締役社長");
        assert_eq!(executives[0].name, "竹林 基哉");
    }

    #[test]
    fn heuristic_without_keywords_returns_empty() {
        let page_text = "このページは製品の使い方を説明しています。特に重要な注意事項はありません。";
        assert!(heuristic_executives(page_text).is_empty());
    }

    #[test]
    fn heuristic_rejects_title_shaped_names() {
        // 社長の直後に別の役職名しか続かない場合は名前として拾わない
        let page_text = "役員構成: 社長 取締役";
        let executives = heuristic_executives(page_text);
        assert!(executives.iter().all(|e| e.name != "取締役"));
    }

    #[test]
    fn sales_figure_is_extracted() {
        assert_eq!(
            heuristic_annual_sales("当社の売上高は772億9600万円でした"),
            Some("772億9600万円".to_string())
        );
        assert_eq!(
            heuristic_annual_sales("年商100億円を突破"),
            Some("100億円".to_string())
        );
        assert_eq!(heuristic_annual_sales("売上は非公開です"), None);
    }

    #[test]
    fn industry_line_scan_takes_text_after_delimiter() {
        let text = "会社名: テスト株式会社\n事業内容：回転寿司チェーンの運営\n設立: 2001年";
        assert_eq!(
            heuristic_industry(text),
            Some("回転寿司チェーンの運営".to_string())
        );
    }

    #[test]
    fn phone_normalization_formats_and_validates() {
        assert_eq!(normalize_phone("0312345678"), Some("03-1234-5678".to_string()));
        assert_eq!(normalize_phone("09012345678"), Some("090-1234-5678".to_string()));
        assert_eq!(normalize_phone("03-1234-5678"), Some("03-1234-5678".to_string()));
        // too short
        assert_eq!(normalize_phone("123-456"), None);
        // second digit of a three-digit area code must be 1-9
        assert_eq!(normalize_phone("00-1234-5678"), None);
        // フリーダイヤルは3桁-3桁のみ
        assert_eq!(normalize_phone("0120-123-456"), Some("0120-123-456".to_string()));
        assert_eq!(normalize_phone("0120-1234-5678"), None);
    }

    #[test]
    fn recruiting_emails_are_preferred() {
        let page = "お問い合わせ: info@example.co.jp / 採用は saiyou@example.co.jp まで 03-1234-5678";
        let (email, phones) = heuristic_recruiter_contacts(page);

        assert_eq!(email, Some("saiyou@example.co.jp".to_string()));
        assert_eq!(phones, vec!["03-1234-5678".to_string()]);
    }

    #[test]
    fn contact_scan_of_empty_page_is_empty() {
        let (email, phones) = heuristic_recruiter_contacts("関連情報はありません");
        assert_eq!(email, None);
        assert!(phones.is_empty());
    }
}
