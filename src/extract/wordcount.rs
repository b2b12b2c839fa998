use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::config::Tunables;
use crate::signals::normalize_ws;

use super::{collect_candidates, Strategy};

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[\w'-]+\b").unwrap());

/// Class/id fragments that mark non-article chrome. An element whose class
/// or id matches is dropped wholesale from the stripped-document candidate.
static BOILERPLATE_CLASS_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^|[-_\s])(ad|ads|advert|advertisement|sponsor|promo|related|newsletter|footer|sidebar|share|social|cookie|banner|recommend|trending|outbrain|taboola)($|[-_\s])",
    )
    .unwrap()
});

const BOILERPLATE_TAGS: &[&str] =
    &["script", "style", "noscript", "svg", "iframe", "nav", "aside", "footer", "form"];

/// Tags whose candidates cover the whole page; only used when nothing
/// better exists.
const FULL_PAGE_TAGS: &[&str] = &["all_p", "body_full"];

/// High-precision methods, in preference order, for the short-circuit step.
const HIGH_PRECISION_TAGS: &[&str] =
    &["article_p", "main_p", "jsonld", "trafilatura", "article_tag"];

pub struct WordCount {
    pub count: u32,
    pub method: &'static str,
}

pub fn count_words(text: &str) -> u32 {
    WORD_RE.find_iter(text).count() as u32
}

/// Estimate the article body word count from independent candidates; no
/// single selector isolates "the body" reliably across sites, so every
/// strategy runs and a fixed policy picks. None means no candidate produced
/// any text.
pub fn estimate(raw_html: &str, doc: &Html, tunables: &Tunables) -> Option<WordCount> {
    let strategies = vec![
        Strategy::new("jsonld", || json_ld_article_text(doc)),
        Strategy::new("trafilatura", || trafilatura_text(raw_html)),
        Strategy::new("article_p", || paragraph_text(doc, "article p")),
        Strategy::new("article_tag", || container_text(doc, "article")),
        Strategy::new("main_p", || paragraph_text(doc, "main p")),
        Strategy::new("all_p", || paragraph_text(doc, "p")),
        Strategy::new("stripped_doc", || stripped_document_text(doc)),
        Strategy::new("body_full", || container_text(doc, "body")),
    ];

    let counted: Vec<(u32, &'static str)> = collect_candidates(&strategies)
        .into_iter()
        .map(|c| (count_words(&c.value), c.tag))
        .filter(|(wc, _)| *wc > 0)
        .collect();

    select(&counted, tunables).map(|(count, method)| WordCount { count, method })
}

/// Selection policy over counted candidates:
/// 1. a high-precision method at/over the threshold wins immediately;
/// 2. else the largest non-full-page candidate;
/// 3. else rank everything and demote a boilerplate-inflated top.
fn select(counted: &[(u32, &'static str)], tunables: &Tunables) -> Option<(u32, &'static str)> {
    if counted.is_empty() {
        return None;
    }

    for tag in HIGH_PRECISION_TAGS {
        if let Some(&(wc, _)) = counted.iter().find(|(_, t)| t == tag) {
            if wc >= tunables.high_precision_words {
                return Some((wc, *tag));
            }
        }
    }

    if let Some(&(wc, tag)) = counted
        .iter()
        .filter(|(_, tag)| !FULL_PAGE_TAGS.contains(tag))
        .max_by_key(|(wc, _)| *wc)
    {
        return Some((wc, tag));
    }

    let mut ranked: Vec<(u32, &'static str)> = counted.to_vec();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    if ranked.len() >= 2 {
        let (top, runner) = (ranked[0], ranked[1]);
        let inflated = f64::from(top.0) > f64::from(runner.0) * tunables.demotion_ratio
            && top.0 - runner.0 > tunables.demotion_margin;
        if inflated {
            return Some(runner);
        }
    }
    Some(ranked[0])
}

/// Longest article-like text found in JSON-LD blocks. Parse errors in one
/// block never abort the cascade.
fn json_ld_article_text(doc: &Html) -> Option<String> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    let mut texts = Vec::new();
    for script in doc.select(&selector) {
        let raw: String = script.text().collect();
        if raw.trim().is_empty() {
            continue;
        }
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        collect_body_texts(&data, &mut texts);
    }
    texts
        .into_iter()
        .max_by_key(|t| count_words(t))
        .filter(|t| !t.is_empty())
}

const JSON_LD_BODY_FIELDS: &[&str] = &["articleBody", "text", "description"];

fn collect_body_texts(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, v) in obj {
                if JSON_LD_BODY_FIELDS.contains(&key.as_str()) {
                    if let Some(s) = v.as_str() {
                        let normalized = normalize_ws(s);
                        if !normalized.is_empty() {
                            out.push(normalized);
                        }
                    }
                } else {
                    collect_body_texts(v, out);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_body_texts(item, out);
            }
        }
        _ => {}
    }
}

fn trafilatura_text(raw_html: &str) -> Option<String> {
    let options = rs_trafilatura::Options {
        favor_precision: true,
        include_tables: false,
        ..rs_trafilatura::Options::default()
    };
    match rs_trafilatura::extract_with_options(raw_html, &options) {
        Ok(result) => {
            let text = normalize_ws(&result.content_text);
            (!text.is_empty()).then_some(text)
        }
        Err(_) => None,
    }
}

fn paragraph_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let joined = doc
        .select(&sel)
        .map(|p| p.text().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" ");
    let text = normalize_ws(&joined);
    (!text.is_empty()).then_some(text)
}

fn container_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let text = normalize_ws(&el.text().collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}

/// Full-document text with boilerplate containers removed by tag name and
/// by the class/id denylist.
fn stripped_document_text(doc: &Html) -> Option<String> {
    let root = Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .unwrap_or_else(|| doc.root_element());

    let mut parts = Vec::new();
    collect_stripped_text(root, &mut parts);
    let text = normalize_ws(&parts.join(" "));
    (!text.is_empty()).then_some(text)
}

fn collect_stripped_text(el: scraper::ElementRef, out: &mut Vec<String>) {
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => out.push(text.to_string()),
            scraper::Node::Element(element) => {
                if BOILERPLATE_TAGS.contains(&element.name()) {
                    continue;
                }
                let class_attr = element.attr("class").unwrap_or("");
                let id_attr = element.attr("id").unwrap_or("");
                let marker = format!("{} {}", class_attr, id_attr);
                let marker = marker.trim();
                if !marker.is_empty() && BOILERPLATE_CLASS_ID_RE.is_match(marker) {
                    continue;
                }
                if let Some(child_ref) = scraper::ElementRef::wrap(child) {
                    collect_stripped_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}
