use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

static PUB_NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pub\s*:\s*(\d{4}-\d{2}-\d{2})").unwrap());
static WC_NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)wordcount\s*:\s*(\d[\d,]*)").unwrap());
static ISO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
static OUTL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([IVX]+)-([A-Z])$").unwrap());

/// One bookmark row from the export CSV. Column naming in the file is
/// flexible; `read_records` maps whatever headers are present onto these
/// fields.
#[derive(Debug, Clone, Default)]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub tags: String,
    pub note: String,
    pub excerpt: String,
    pub created: String,
    pub pub_date: String,
    pub wordcount: String,
}

impl ArticleRecord {
    /// Resolved publication date, in priority order: explicit
    /// `pub:YYYY-MM-DD` note override, then a date column (as written by the
    /// annotate pass), then the bookmark's created timestamp.
    pub fn pub_date_override(&self) -> Option<NaiveDate> {
        let text = PUB_NOTE_RE
            .captures(&self.note)
            .map(|c| c[1].to_string())
            .or_else(|| ISO_RE.find(&self.pub_date).map(|m| m.as_str().to_string()))
            .or_else(|| ISO_RE.find(&self.created).map(|m| m.as_str().to_string()))?;
        NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok()
    }

    /// Resolved word count: explicit `wordcount:NNN` note override
    /// (thousands separators allowed), else a wordcount column.
    pub fn wordcount_override(&self) -> Option<u32> {
        if let Some(m) = WC_NOTE_RE.captures(&self.note) {
            return m[1].replace(',', "").parse().ok();
        }
        let raw = self.wordcount.trim();
        if raw.is_empty() {
            return None;
        }
        raw.parse::<u32>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().map(|f| f as u32))
    }

    /// Subsection ids named by `_outl:` tags, e.g. "_outl:VII-A" places the
    /// article directly in s7a, bypassing the classifier.
    pub fn outline_placements(&self) -> Vec<String> {
        self.tags
            .split(',')
            .filter_map(|tag| outl_to_sub_id(tag.trim()))
            .collect()
    }
}

fn roman_to_int(r: &str) -> Option<u32> {
    match r.to_uppercase().as_str() {
        "I" => Some(1),
        "II" => Some(2),
        "III" => Some(3),
        "IV" => Some(4),
        "V" => Some(5),
        "VI" => Some(6),
        "VII" => Some(7),
        "VIII" => Some(8),
        "IX" => Some(9),
        "X" => Some(10),
        _ => None,
    }
}

/// "_outl:VIII-C" → "s8c". None for anything that does not match.
pub fn outl_to_sub_id(tag: &str) -> Option<String> {
    let val = tag.trim().strip_prefix("_outl:")?.trim();
    let caps = OUTL_RE.captures(val)?;
    let num = roman_to_int(&caps[1])?;
    Some(format!("s{}{}", num, caps[2].to_lowercase()))
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Read bookmark records from an export CSV, resolving columns by name. A
/// URL column is required; everything else defaults to empty.
pub fn read_records(path: &Path) -> Result<Vec<ArticleRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let url_col = find_column(&headers, &["url", "link"]).with_context(|| {
        format!(
            "Could not detect URL column in {}; add a column named 'url'",
            path.display()
        )
    })?;
    let title_col = find_column(&headers, &["title", "headline"]);
    let tags_col = find_column(&headers, &["tags"]);
    let note_col = find_column(&headers, &["note", "notes"]);
    let excerpt_col = find_column(&headers, &["excerpt", "description"]);
    let created_col = find_column(&headers, &["created", "created_at"]);
    let pub_date_col = find_column(&headers, &["publication_date", "pub_date", "date"]);
    let wordcount_col = find_column(&headers, &["wordcount", "word_count"]);

    let field = |record: &csv::StringRecord, col: Option<usize>| -> String {
        col.and_then(|i| record.get(i))
            .unwrap_or("")
            .trim()
            .to_string()
    };

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(ArticleRecord {
            title: field(&row, title_col),
            url: field(&row, Some(url_col)),
            tags: field(&row, tags_col),
            note: field(&row, note_col),
            excerpt: field(&row, excerpt_col),
            created: field(&row, created_col),
            pub_date: field(&row, pub_date_col),
            wordcount: field(&row, wordcount_col),
        });
    }

    if records.is_empty() {
        bail!("No rows in {}", path.display());
    }
    Ok(records)
}

/// One output row of the annotate run. Row order matches the input CSV,
/// including rows that had no URL.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedRow {
    pub title: String,
    pub url: String,
    pub pub_date: Option<String>,
    pub date_status: String,
    pub wordcount: Option<u32>,
    pub wc_status: String,
    pub wc_method: Option<String>,
}

impl AnnotatedRow {
    pub fn no_url(title: String) -> Self {
        Self {
            title,
            url: String::new(),
            pub_date: None,
            date_status: "no_url".to_string(),
            wordcount: None,
            wc_status: "no_url".to_string(),
            wc_method: None,
        }
    }

    pub fn fetch_failed(title: String, url: String, status_label: String) -> Self {
        Self {
            title,
            url,
            pub_date: None,
            date_status: status_label.clone(),
            wordcount: None,
            wc_status: status_label,
            wc_method: None,
        }
    }
}

pub fn write_results(path: &Path, rows: &[AnnotatedRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create results CSV: {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outl_tag_conversion() {
        assert_eq!(outl_to_sub_id("_outl:VII-A").as_deref(), Some("s7a"));
        assert_eq!(outl_to_sub_id("_outl:VIII-C").as_deref(), Some("s8c"));
        assert_eq!(outl_to_sub_id("_outl:i-b").as_deref(), Some("s1b"));
        assert_eq!(outl_to_sub_id("_outl: X-D ").as_deref(), Some("s10d"));
        assert_eq!(outl_to_sub_id("_outl:XI-A"), None);
        assert_eq!(outl_to_sub_id("_outl:VII"), None);
        assert_eq!(outl_to_sub_id("outl:VII-A"), None);
        assert_eq!(outl_to_sub_id("research"), None);
    }

    #[test]
    fn note_overrides() {
        let rec = ArticleRecord {
            note: "worth re-reading. pub:2024-03-15 wordcount:1,250".to_string(),
            ..Default::default()
        };
        assert_eq!(
            rec.pub_date_override(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(rec.wordcount_override(), Some(1250));
    }

    #[test]
    fn annotated_output_carries_into_next_read() {
        let rows = vec![AnnotatedRow {
            title: "An Article".to_string(),
            url: "https://example.com/a".to_string(),
            pub_date: Some("2024-03-15".to_string()),
            date_status: "success".to_string(),
            wordcount: Some(1250),
            wc_status: "success".to_string(),
            wc_method: Some("article_p".to_string()),
        }];
        let path = std::env::temp_dir().join("curator_roundtrip_test.csv");
        write_results(&path, &rows).unwrap();
        let records = read_records(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].pub_date_override(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(records[0].wordcount_override(), Some(1250));
    }

    #[test]
    fn note_override_beats_columns() {
        let rec = ArticleRecord {
            note: "pub:2022-01-01 wordcount:500".to_string(),
            pub_date: "2024-03-15".to_string(),
            wordcount: "1250".to_string(),
            ..Default::default()
        };
        assert_eq!(
            rec.pub_date_override(),
            NaiveDate::from_ymd_opt(2022, 1, 1)
        );
        assert_eq!(rec.wordcount_override(), Some(500));
    }

    #[test]
    fn wordcount_column_accepts_float_text() {
        let rec = ArticleRecord {
            wordcount: "1250.0".to_string(),
            ..Default::default()
        };
        assert_eq!(rec.wordcount_override(), Some(1250));
    }

    #[test]
    fn created_timestamp_fallback() {
        let rec = ArticleRecord {
            created: "2023-11-02T08:15:00Z".to_string(),
            ..Default::default()
        };
        assert_eq!(
            rec.pub_date_override(),
            NaiveDate::from_ymd_opt(2023, 11, 2)
        );
        assert_eq!(rec.wordcount_override(), None);
    }

    #[test]
    fn outline_placements_from_tags() {
        let rec = ArticleRecord {
            tags: "research, _outl:VII-A, llm, _outl:II-B".to_string(),
            ..Default::default()
        };
        assert_eq!(rec.outline_placements(), vec!["s7a", "s2b"]);
    }

    #[test]
    fn read_records_maps_headers() {
        let dir = std::env::temp_dir();
        let path = dir.join("curator_input_test.csv");
        std::fs::write(
            &path,
            "Title,url,tags,note,excerpt,created\n\
             An Article,https://example.com/a,llm,pub:2024-01-05,Short excerpt,2024-02-01T00:00:00Z\n\
             ,https://example.com/b,,,,\n",
        )
        .unwrap();
        let records = read_records(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "An Article");
        assert_eq!(records[0].url, "https://example.com/a");
        assert_eq!(
            records[0].pub_date_override(),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert!(records[1].title.is_empty());
        assert_eq!(records[1].url, "https://example.com/b");
    }
}
