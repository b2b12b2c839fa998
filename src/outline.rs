use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::signals::normalize_ws;

static HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head[^>]*>(.*?)</head>").unwrap());

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("No sections (details.sec) found in outline HTML")]
    NoSections,
    #[error("Subsection {0} has no article list (ul.arts)")]
    MissingArticleList(String),
    #[error("Unknown subsection id: {0}")]
    UnknownSubsection(String),
    #[error("Invalid selector: {0}")]
    Selector(String),
}

/// One article line in a subsection's list.
#[derive(Debug, Clone)]
pub struct Entry {
    pub title: String,
    pub url: String,
    pub date: Option<NaiveDate>,
    pub wordcount: Option<u32>,
    pub cross_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Subsection {
    pub id: String,
    pub title: String,
    pub open: bool,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub open: bool,
    pub subsections: Vec<Subsection>,
}

/// The collection outline as an owned tree. The document is parsed into this
/// model, mutated, and rendered back out; the input <head> (styles, meta) is
/// carried through verbatim.
#[derive(Debug, Clone)]
pub struct Outline {
    pub head_html: String,
    pub title: String,
    pub sections: Vec<Section>,
}

fn sel(css: &str) -> Result<Selector, OutlineError> {
    Selector::parse(css).map_err(|_| OutlineError::Selector(css.to_string()))
}

fn direct_child<'a>(el: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    el.children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == name)
}

fn element_text(el: ElementRef) -> String {
    normalize_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Summary text with the regenerated art-count span excluded.
fn summary_title(summary: ElementRef) -> String {
    let mut parts = Vec::new();
    for child in summary.children() {
        match child.value() {
            scraper::Node::Text(text) => parts.push(text.to_string()),
            scraper::Node::Element(element) => {
                let is_count = element.attr("class").is_some_and(|c| {
                    c.split_whitespace().any(|cls| cls == "art-count")
                });
                if is_count {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    parts.push(element_text(child_ref));
                }
            }
            _ => {}
        }
    }
    normalize_ws(&parts.join(" "))
}

fn badge_text(li: ElementRef, css: &str) -> Result<Option<String>, OutlineError> {
    let selector = sel(css)?;
    Ok(li
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty()))
}

fn parse_entry(li: ElementRef) -> Result<Option<Entry>, OutlineError> {
    let Some(anchor) = direct_child(li, "a") else {
        return Ok(None);
    };
    let url = anchor.value().attr("href").unwrap_or("").trim().to_string();
    let title = element_text(anchor);

    let date = badge_text(li, "span.bd-d")?
        .and_then(|t| NaiveDate::parse_from_str(&t, "%Y-%m-%d").ok());
    let wordcount = badge_text(li, "span.bd-w")?
        .and_then(|t| t.trim_end_matches(" wds").replace(',', "").parse().ok());
    let cross_ref = badge_text(li, "span.xr")?;

    Ok(Some(Entry {
        title,
        url,
        date,
        wordcount,
        cross_ref,
    }))
}

impl Outline {
    pub fn parse(raw: &str) -> Result<Self, OutlineError> {
        let doc = Html::parse_document(raw);

        let head_html = HEAD_RE
            .captures(raw)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        let title_sel = sel("header h1")?;
        let title = doc
            .select(&title_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let sec_sel = sel("details.sec")?;
        let sub_sel = sel("details.sub")?;
        let ul_sel = sel("div.sub-body ul.arts, ul.arts")?;

        let mut sections = Vec::new();
        for sec in doc.select(&sec_sel) {
            let sec_id = sec.value().attr("id").unwrap_or("").to_string();
            let sec_title = direct_child(sec, "summary")
                .map(summary_title)
                .unwrap_or_default();

            let mut subsections = Vec::new();
            for sub in sec.select(&sub_sel) {
                let sub_id = sub.value().attr("id").unwrap_or("").to_string();
                let sub_title = direct_child(sub, "summary")
                    .map(summary_title)
                    .unwrap_or_default();

                let ul = sub
                    .select(&ul_sel)
                    .next()
                    .ok_or_else(|| OutlineError::MissingArticleList(sub_id.clone()))?;

                let mut entries = Vec::new();
                for li in ul.children().filter_map(ElementRef::wrap) {
                    if li.value().name() != "li" {
                        continue;
                    }
                    if let Some(entry) = parse_entry(li)? {
                        entries.push(entry);
                    }
                }

                subsections.push(Subsection {
                    id: sub_id,
                    title: sub_title,
                    open: sub.value().attr("open").is_some(),
                    entries,
                });
            }

            sections.push(Section {
                id: sec_id,
                title: sec_title,
                open: sec.value().attr("open").is_some(),
                subsections,
            });
        }

        if sections.is_empty() {
            return Err(OutlineError::NoSections);
        }

        Ok(Outline {
            head_html,
            title,
            sections,
        })
    }

    pub fn existing_urls(&self) -> HashSet<String> {
        self.sections
            .iter()
            .flat_map(|sec| &sec.subsections)
            .flat_map(|sub| &sub.entries)
            .filter(|e| !e.url.is_empty())
            .map(|e| e.url.clone())
            .collect()
    }

    pub fn subsection(&self, sub_id: &str) -> Option<&Subsection> {
        self.sections
            .iter()
            .flat_map(|sec| &sec.subsections)
            .find(|sub| sub.id == sub_id)
    }

    pub fn insert(&mut self, sub_id: &str, entry: Entry) -> Result<(), OutlineError> {
        let sub = self
            .sections
            .iter_mut()
            .flat_map(|sec| &mut sec.subsections)
            .find(|sub| sub.id == sub_id)
            .ok_or_else(|| OutlineError::UnknownSubsection(sub_id.to_string()))?;
        sub.entries.push(entry);
        Ok(())
    }

    /// Reorder every subsection newest-first; undated entries sort last.
    /// Called once after all insertions for a run.
    pub fn sort_entries_by_date(&mut self) {
        for sec in &mut self.sections {
            for sub in &mut sec.subsections {
                sub.entries
                    .sort_by_key(|e| std::cmp::Reverse(e.date.unwrap_or(NaiveDate::MIN)));
            }
        }
    }

    pub fn total_entries(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|sec| &sec.subsections)
            .map(|sub| sub.entries.len())
            .sum()
    }

    /// Render back to a standalone HTML document. Counts in section headers
    /// and the header byline are regenerated from the current tree.
    pub fn render(&self) -> String {
        let total = self.total_entries();
        let secs = self.sections.len();
        let subs: usize = self.sections.iter().map(|s| s.subsections.len()).sum();

        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>");
        out.push_str(&self.head_html);
        out.push_str("</head>\n<body>\n<header>\n");
        let _ = writeln!(out, "<h1>{}</h1>", escape_text(&self.title));
        let _ = writeln!(
            out,
            "<p>{} articles · {} sections · {} subsections · links, publication dates &amp; word counts from source CSV</p>",
            total, secs, subs
        );
        out.push_str("</header>\n<main>\n");

        for sec in &self.sections {
            let sec_count: usize = sec.subsections.iter().map(|s| s.entries.len()).sum();
            let _ = writeln!(
                out,
                "<details class=\"sec\" id=\"{}\"{}>",
                escape_attr(&sec.id),
                if sec.open { " open" } else { "" }
            );
            let _ = writeln!(
                out,
                "<summary>{} <span class=\"art-count\">({} articles)</span></summary>",
                escape_text(&sec.title),
                sec_count
            );

            for sub in &sec.subsections {
                let _ = writeln!(
                    out,
                    "<details class=\"sub\" id=\"{}\"{}>",
                    escape_attr(&sub.id),
                    if sub.open { " open" } else { "" }
                );
                let _ = writeln!(out, "<summary>{}</summary>", escape_text(&sub.title));
                out.push_str("<div class=\"sub-body\">\n<ul class=\"arts\">\n");
                for entry in &sub.entries {
                    out.push_str(&render_entry(entry));
                    out.push('\n');
                }
                out.push_str("</ul>\n</div>\n</details>\n");
            }
            out.push_str("</details>\n");
        }

        out.push_str("</main>\n</body>\n</html>\n");
        out
    }
}

fn render_entry(entry: &Entry) -> String {
    let mut li = format!(
        "<li><a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a><span class=\"meta\">",
        escape_attr(&entry.url),
        escape_text(&entry.title)
    );
    if let Some(date) = entry.date {
        let _ = write!(
            li,
            "<span class=\"bd bd-d\">{}</span>",
            date.format("%Y-%m-%d")
        );
    }
    if let Some(wc) = entry.wordcount {
        let _ = write!(
            li,
            "<span class=\"bd bd-w\">{} wds</span>",
            format_thousands(wc)
        );
    }
    if let Some(xr) = &entry.cross_ref {
        let _ = write!(li, "<span class=\"xr\">{}</span>", escape_text(xr));
    }
    li.push_str("</span></li>");
    li
}

fn format_thousands(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
