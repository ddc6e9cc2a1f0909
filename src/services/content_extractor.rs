use scraper::{ElementRef, Html, Selector};

/// Keyword vocabulary biasing extraction toward executive sections.
pub const OFFICER_KEYWORDS: [&str; 10] = [
    "役員",
    "取締役",
    "代表",
    "社長",
    "会長",
    "ceo",
    "執行役員",
    "監査役",
    "オフィサー",
    "ディレクター",
];

/// Keyword vocabulary for recruiter contact sections.
pub const RECRUITER_KEYWORDS: [&str; 7] = [
    "採用担当",
    "採用責任者",
    "採用窓口",
    "採用",
    "recruit",
    "recruitment",
    "採用情報",
];

/// Keyword vocabulary for company profile sections.
pub const COMPANY_KEYWORDS: [&str; 13] = [
    "企業概要",
    "会社概要",
    "事業内容",
    "業種",
    "業態",
    "売上高",
    "年商",
    "年間売上",
    "連結売上",
    "事業領域",
    "主な事業",
    "主要な事業",
    "事業分野",
];

pub const EXECUTIVE_PREAMBLE: &str = "\
以下は企業の役員情報を含むウェブページからの抽出テキストです。役職と氏名のペアを特定してください。
役職には「代表取締役社長」「代表取締役会長」「取締役」「社外取締役」「監査役」などがあります。
特に注意: ウェブページにある氏名の漢字は正確にそのまま抽出してください。

本文:
";

pub const RECRUITER_PREAMBLE: &str = "\
以下は企業の採用担当者情報を含むウェブページからの抽出テキストです。採用担当者名とメールアドレスのペアを特定してください。

本文:
";

pub const COMPANY_PREAMBLE: &str = "\
以下は企業情報を含むウェブページからの抽出テキストです。業種や売上高などの企業概要を特定してください。

本文:
";

/// Upper bound on the excerpt forwarded to the model. Pages regularly render
/// to hundreds of kilobytes of text; everything past the bound is cut on a
/// char boundary before the preamble is added.
pub const MAX_EXCERPT_CHARS: usize = 20_000;

const NOISE_TAGS: [&str; 6] = ["script", "style", "meta", "link", "noscript", "svg"];
const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Returns a prioritized excerpt of `raw_markup` biased toward sections
/// matching `keywords`, or the full plain-text rendering when nothing matches.
/// The returned text always starts with `preamble`.
///
/// Priority order: tables, headings with their trailing siblings, matching
/// containers, definition lists, unordered lists. Within one category,
/// snippets keep document order.
pub fn extract(raw_markup: &str, keywords: &[&str], preamble: &str) -> String {
    let document = Html::parse_document(raw_markup);
    let mut priority_content: Vec<String> = Vec::new();

    collect_table_snippets(&document, keywords, &mut priority_content);
    collect_heading_snippets(&document, keywords, &mut priority_content);
    collect_container_snippets(&document, keywords, &mut priority_content);
    collect_definition_list_snippets(&document, keywords, &mut priority_content);
    collect_list_snippets(&document, keywords, &mut priority_content);

    let body = if priority_content.is_empty() {
        plain_text(&document)
    } else {
        priority_content.join("\n\n")
    };

    format!("{}{}", preamble, truncate_chars(&body, MAX_EXCERPT_CHARS))
}

/// Full plain-text rendering of the page with noise subtrees removed.
pub fn plain_text(document: &Html) -> String {
    let mut out = String::new();
    visible_text(document.root_element(), &mut out);
    out
}

fn visible_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        if let Some(child_element) = ElementRef::wrap(child) {
            if NOISE_TAGS.contains(&child_element.value().name()) {
                continue;
            }
            visible_text(child_element, out);
        }
    }
}

fn text_of(element: ElementRef) -> String {
    let mut out = String::new();
    visible_text(element, &mut out);
    out.trim().to_string()
}

fn matches_any(text: &str, keywords: &[&str]) -> bool {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .any(|keyword| haystack.contains(&keyword.to_lowercase()))
}

fn collect_table_snippets(document: &Html, keywords: &[&str], out: &mut Vec<String>) {
    let table_selector = Selector::parse("table").unwrap();
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("td, th").unwrap();

    for table in document.select(&table_selector) {
        let mut rows: Vec<String> = Vec::new();
        for row in table.select(&row_selector) {
            let cells: Vec<String> = row.select(&cell_selector).map(text_of).collect();
            if !cells.is_empty() && matches_any(&cells.join(" "), keywords) {
                rows.push(cells.join(" | "));
            }
        }
        if !rows.is_empty() {
            out.push(format!(
                "テーブルデータ:\n{}\n\nテーブルHTML:\n{}",
                rows.join("\n"),
                table.html()
            ));
        }
    }
}

fn collect_heading_snippets(document: &Html, keywords: &[&str], out: &mut Vec<String>) {
    let heading_selector = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();

    for heading in document.select(&heading_selector) {
        let heading_text = text_of(heading);
        if !matches_any(&heading_text, keywords) {
            continue;
        }
        // Everything after the heading up to the next heading belongs to it.
        let mut trailing: Vec<String> = Vec::new();
        for sibling in heading.next_siblings() {
            let Some(element) = ElementRef::wrap(sibling) else {
                continue;
            };
            if HEADING_TAGS.contains(&element.value().name()) {
                break;
            }
            trailing.push(element.html());
        }
        out.push(format!("見出し: {}\n\n{}", heading_text, trailing.join("\n")));
    }
}

fn collect_container_snippets(document: &Html, keywords: &[&str], out: &mut Vec<String>) {
    let container_selector = Selector::parse("section, div, article").unwrap();

    for container in document.select(&container_selector) {
        let class_attr = container.value().attr("class").unwrap_or("");
        let id_attr = container.value().attr("id").unwrap_or("");
        let own_text = text_of(container);

        if matches_any(class_attr, keywords)
            || matches_any(id_attr, keywords)
            || matches_any(&own_text, keywords)
        {
            out.push(format!(
                "セクションHTML:\n{}\n\nセクション平文:\n{}",
                container.html(),
                own_text
            ));
        }
    }
}

fn collect_definition_list_snippets(document: &Html, keywords: &[&str], out: &mut Vec<String>) {
    let dl_selector = Selector::parse("dl").unwrap();
    let dt_selector = Selector::parse("dt").unwrap();
    let dd_selector = Selector::parse("dd").unwrap();

    for dl in document.select(&dl_selector) {
        let terms: Vec<String> = dl.select(&dt_selector).map(text_of).collect();
        let definitions: Vec<String> = dl.select(&dd_selector).map(text_of).collect();
        if terms.len() != definitions.len() {
            continue;
        }

        let lines: Vec<String> = terms
            .iter()
            .zip(definitions.iter())
            .filter(|(term, definition)| {
                matches_any(term, keywords) || matches_any(definition, keywords)
            })
            .map(|(term, definition)| format!("{}: {}", term, definition))
            .collect();

        if !lines.is_empty() {
            out.push(format!(
                "DLデータ:\n{}\n\nDL HTML:\n{}",
                lines.join("\n"),
                dl.html()
            ));
        }
    }
}

fn collect_list_snippets(document: &Html, keywords: &[&str], out: &mut Vec<String>) {
    let ul_selector = Selector::parse("ul").unwrap();
    let li_selector = Selector::parse("li").unwrap();

    for ul in document.select(&ul_selector) {
        if !matches_any(&text_of(ul), keywords) {
            continue;
        }
        let items: Vec<String> = ul.select(&li_selector).map(text_of).collect();
        if !items.is_empty() {
            out.push(format!(
                "リストアイテム:\n{}\n\nリストHTML:\n{}",
                items.join("\n"),
                ul.html()
            ));
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
