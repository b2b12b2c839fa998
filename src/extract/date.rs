use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{Html, Selector};

use super::{first_success, Candidate, Strategy};

/// Meta names/properties checked first, in order.
const META_SELECTORS: &[&str] = &[
    r#"meta[property="article:published_time"]"#,
    r#"meta[property="article:published"]"#,
    r#"meta[name="publish-date"]"#,
    r#"meta[name="publication-date"]"#,
    r#"meta[name="date"]"#,
    r#"meta[name="DC.date"]"#,
    r#"meta[name="DC.Date"]"#,
    r#"meta[property="og:published_time"]"#,
    r#"meta[name="publishdate"]"#,
    r#"meta[name="pub_date"]"#,
    r#"meta[itemprop="datePublished"]"#,
    r#"meta[itemprop="publishDate"]"#,
];

const JSON_LD_DATE_FIELDS: &[&str] = &["datePublished", "publishDate", "dateCreated", "uploadDate"];

const TIME_SELECTORS: &[&str] = &[
    "time[datetime]",
    "time[pubdate]",
    ".published-date time",
    ".publish-date time",
    ".date time",
];

const DATE_CLASS_SELECTORS: &[&str] = &[
    ".published-date",
    ".publish-date",
    ".publication-date",
    ".date-published",
    ".article-date",
    ".post-date",
    ".entry-date",
    ".timestamp",
    r#"[class*="date"]"#,
    r#"[class*="publish"]"#,
];

/// Upper bound on element text considered date-bearing. Longer blocks are
/// prose that happens to contain a date-like class.
const MAX_DATE_TEXT_LEN: usize = 100;

static TEXT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Published:?\s*([A-Za-z]+ \d{1,2},? \d{4})",
        r"(?i)Publication Date:?\s*([A-Za-z]+ \d{1,2},? \d{4})",
        r"(\d{4}-\d{2}-\d{2})",
        r"(\d{1,2}/\d{1,2}/\d{4})",
        r"([A-Za-z]+ \d{1,2},? \d{4})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static EMBEDDED_ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap());

/// Resolve one canonical publication date from a fetched document.
/// Strategies run in fixed priority order; the first that yields a parseable
/// date wins. Returns the ISO date plus the winning strategy tag, or None.
pub fn resolve(doc: &Html) -> Option<Candidate<String>> {
    let strategies = vec![
        Strategy::new("meta", || date_from_meta(doc)),
        Strategy::new("jsonld", || date_from_json_ld(doc)),
        Strategy::new("time_tag", || date_from_time_tags(doc)),
        Strategy::new("class_text", || date_from_date_classes(doc)),
        Strategy::new("text_pattern", || date_from_text_patterns(doc)),
    ];
    first_success(&strategies)
}

fn date_from_meta(doc: &Html) -> Option<String> {
    for sel in META_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        let Some(el) = doc.select(&selector).next() else {
            continue;
        };
        let Some(content) = el
            .value()
            .attr("content")
            .or_else(|| el.value().attr("value"))
        else {
            continue;
        };
        if let Some(parsed) = parse_date_string(content) {
            return Some(parsed);
        }
    }
    None
}

fn date_from_json_ld(doc: &Html) -> Option<String> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for script in doc.select(&selector) {
        let raw: String = script.text().collect();
        if raw.trim().is_empty() {
            continue;
        }
        // Malformed blocks are a miss for this strategy, not an error.
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        if let Some(date) = date_from_json_value(&data) {
            return Some(date);
        }
    }
    None
}

/// Unwrap arrays recursively; check the fixed date fields on each object.
fn date_from_json_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Array(items) => items.iter().find_map(date_from_json_value),
        serde_json::Value::Object(obj) => JSON_LD_DATE_FIELDS.iter().find_map(|field| {
            obj.get(*field)
                .and_then(|v| v.as_str())
                .and_then(parse_date_string)
        }),
        _ => None,
    }
}

fn date_from_time_tags(doc: &Html) -> Option<String> {
    for sel in TIME_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        let Some(el) = doc.select(&selector).next() else {
            continue;
        };
        // Machine-readable attribute beats element text.
        let attr = el
            .value()
            .attr("datetime")
            .or_else(|| el.value().attr("pubdate"));
        if let Some(parsed) = attr.and_then(parse_date_string) {
            return Some(parsed);
        }
        let text: String = el.text().collect::<Vec<_>>().join(" ");
        let text = text.trim();
        if !text.is_empty() {
            if let Some(parsed) = parse_date_string(text) {
                return Some(parsed);
            }
        }
    }
    None
}

fn date_from_date_classes(doc: &Html) -> Option<String> {
    for sel in DATE_CLASS_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        for el in doc.select(&selector) {
            let text: String = el.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            if text.is_empty() || text.len() >= MAX_DATE_TEXT_LEN {
                continue;
            }
            if let Some(parsed) = parse_date_string(text) {
                return Some(parsed);
            }
        }
    }
    None
}

fn date_from_text_patterns(doc: &Html) -> Option<String> {
    let text = visible_text(doc);
    for pattern in TEXT_PATTERNS.iter() {
        for caps in pattern.captures_iter(&text) {
            if let Some(parsed) = caps.get(1).and_then(|m| parse_date_string(m.as_str())) {
                return Some(parsed);
            }
        }
    }
    None
}

fn visible_text(doc: &Html) -> String {
    doc.root_element().text().collect::<Vec<_>>().join(" ")
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

// US month-first deliberately precedes day-first for ambiguous slash dates;
// the order is inherited and load-bearing.
const DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Normalize a raw candidate to "YYYY-MM-DD" through the ordered format
/// list; final fallback extracts an embedded ISO date substring.
pub fn parse_date_string(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }
    // Zone-offset timestamps ("2024-03-05T10:00:00+02:00").
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }

    EMBEDDED_ISO_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_html(html: &str) -> Option<(String, &'static str)> {
        let doc = Html::parse_document(html);
        resolve(&doc).map(|c| (c.value, c.tag))
    }

    #[test]
    fn meta_beats_text_patterns() {
        let html = r#"<html><head>
            <meta property="article:published_time" content="2024-03-05T10:00:00Z">
            </head><body>
            <p>Originally published January 1, 2020 and updated 12/31/2021.</p>
            </body></html>"#;
        let (date, tag) = resolve_html(html).unwrap();
        assert_eq!(date, "2024-03-05");
        assert_eq!(tag, "meta");
    }

    #[test]
    fn json_ld_array_unwrapped() {
        let html = r#"<html><head><script type="application/ld+json">
            [{"@type":"Organization"},{"@type":"NewsArticle","datePublished":"2023-11-20T08:00:00Z"}]
            </script></head><body></body></html>"#;
        let (date, tag) = resolve_html(html).unwrap();
        assert_eq!(date, "2023-11-20");
        assert_eq!(tag, "jsonld");
    }

    #[test]
    fn malformed_json_ld_falls_through() {
        let html = r#"<html><head><script type="application/ld+json">
            {not json at all
            </script></head><body>
            <time datetime="2022-07-04">July 4</time>
            </body></html>"#;
        let (date, tag) = resolve_html(html).unwrap();
        assert_eq!(date, "2022-07-04");
        assert_eq!(tag, "time_tag");
    }

    #[test]
    fn time_attribute_preferred_over_text() {
        let html = r#"<html><body>
            <time datetime="2024-01-15T09:30:00Z">January 16, 2024</time>
            </body></html>"#;
        let (date, _) = resolve_html(html).unwrap();
        assert_eq!(date, "2024-01-15");
    }

    #[test]
    fn long_date_class_text_ignored() {
        let filler = "word ".repeat(40);
        let html = format!(
            r#"<html><body>
            <div class="post-date">{} 2021-05-05</div>
            <div class="entry-date">2021-06-06</div>
            </body></html>"#,
            filler
        );
        let (date, tag) = resolve_html(&html).unwrap();
        // The 200+ char block is skipped; the short one wins.
        assert_eq!(date, "2021-06-06");
        assert_eq!(tag, "class_text");
    }

    #[test]
    fn text_pattern_last_resort() {
        let html = r#"<html><body>
            <p>Some article text. Published: March 5, 2024. More text.</p>
            </body></html>"#;
        let (date, tag) = resolve_html(html).unwrap();
        assert_eq!(date, "2024-03-05");
        assert_eq!(tag, "text_pattern");
    }

    #[test]
    fn no_date_resolves_to_none() {
        let html = "<html><body><p>Nothing datelike here.</p></body></html>";
        assert!(resolve_html(html).is_none());
    }

    #[test]
    fn normalization_variants() {
        assert_eq!(parse_date_string("2024-03-05").as_deref(), Some("2024-03-05"));
        assert_eq!(
            parse_date_string("2024-03-05T10:00:00.000Z").as_deref(),
            Some("2024-03-05")
        );
        assert_eq!(
            parse_date_string("2024-03-05T10:00:00+02:00").as_deref(),
            Some("2024-03-05")
        );
        assert_eq!(parse_date_string("March 5, 2024").as_deref(), Some("2024-03-05"));
        assert_eq!(parse_date_string("Mar 5 2024").as_deref(), Some("2024-03-05"));
        assert_eq!(parse_date_string("5 March 2024").as_deref(), Some("2024-03-05"));
    }

    #[test]
    fn slash_dates_parse_us_first() {
        // 03/05/2024 is March 5 under the inherited US-first order.
        assert_eq!(parse_date_string("03/05/2024").as_deref(), Some("2024-03-05"));
        // Day > 12 only fits day-first.
        assert_eq!(parse_date_string("25/03/2024").as_deref(), Some("2024-03-25"));
    }

    #[test]
    fn embedded_iso_fallback() {
        assert_eq!(
            parse_date_string("updated 2024-03-05 14:00 UTC").as_deref(),
            Some("2024-03-05")
        );
        assert!(parse_date_string("no date here").is_none());
        assert!(parse_date_string("").is_none());
    }
}
