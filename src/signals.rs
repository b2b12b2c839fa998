use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9][a-z0-9\-']+").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Function words plus terms so common across this collection ("ai",
/// "artificial", "intelligence") that they carry no placement signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "did", "do", "for",
    "from", "has", "have", "how", "in", "is", "it", "its", "of", "on", "or",
    "our", "says", "so", "than", "that", "the", "this", "to", "up", "us",
    "was", "we", "what", "when", "where", "which", "who", "why", "will", "with",
    "you", "your", "ai", "artificial", "intelligence",
];

static STOPWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOPWORDS.iter().copied().collect());

pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|w| w.len() > 2 && !STOPWORD_SET.contains(w.as_str()))
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

pub fn token_histogram(text: &str) -> HashMap<String, u32> {
    let mut hist = HashMap::new();
    for token in tokenize(text) {
        *hist.entry(token).or_insert(0) += 1;
    }
    hist
}

pub fn normalize_ws(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").to_string()
}

/// All text evidence gathered for one article. CSV fields first, fetched
/// fields filled in when the fetch succeeds.
#[derive(Debug, Clone, Default)]
pub struct ArticleSignals {
    pub title: String,
    pub tags: String,
    pub note: String,
    pub excerpt: String,
    pub fetched_title: String,
    pub fetched_description: String,
    pub fetched_keywords: String,
    pub fetched_headings: String,
    pub fetched_body: String,
    pub fetch_ok: bool,
}

impl ArticleSignals {
    /// Topic text in fixed field order, skipping empties. Body text is kept
    /// separate; it is scored at lower weight.
    pub fn combined_text(&self) -> String {
        let title = if self.fetched_title.is_empty() {
            &self.title
        } else {
            &self.fetched_title
        };
        let parts = [
            title.as_str(),
            &self.tags,
            &self.note,
            &self.excerpt,
            &self.fetched_description,
            &self.fetched_keywords,
            &self.fetched_headings,
        ];
        parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn body_text(&self) -> &str {
        &self.fetched_body
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.fetched_title
        } else {
            &self.title
        }
    }

    /// Merge fetched evidence into CSV-derived signals.
    pub fn absorb_fetched(&mut self, fetched: ArticleSignals) {
        self.fetched_title = fetched.fetched_title;
        self.fetched_description = fetched.fetched_description;
        self.fetched_keywords = fetched.fetched_keywords;
        self.fetched_headings = fetched.fetched_headings;
        self.fetched_body = fetched.fetched_body;
        self.fetch_ok = fetched.fetch_ok;
    }
}

const BODY_WORD_LIMIT: usize = 600;
const HEADING_LIMIT: usize = 6;

fn meta_content(doc: &Html, selectors: &[&str]) -> String {
    for sel in selectors {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            let content = el
                .value()
                .attr("content")
                .or_else(|| el.value().attr("value"))
                .unwrap_or("");
            if !content.trim().is_empty() {
                return content.trim().to_string();
            }
        }
    }
    String::new()
}

fn element_text(el: scraper::ElementRef) -> String {
    normalize_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Extract classification signals from a fetched document: title and
/// description metadata, keyword-ish meta fields, the first h1/h2 headings,
/// and a bounded slice of body text.
pub fn extract_fetched_signals(doc: &Html) -> ArticleSignals {
    let mut sig = ArticleSignals::default();

    sig.fetched_title = meta_content(doc, &[r#"meta[property="og:title"]"#]);
    if sig.fetched_title.is_empty() {
        if let Ok(sel) = Selector::parse("title") {
            if let Some(el) = doc.select(&sel).next() {
                sig.fetched_title = element_text(el);
            }
        }
    }

    sig.fetched_description = meta_content(
        doc,
        &[
            r#"meta[property="og:description"]"#,
            r#"meta[name="description"]"#,
            r#"meta[name="Description"]"#,
        ],
    );

    let keyword_parts = [
        meta_content(doc, &[r#"meta[name="keywords"]"#, r#"meta[name="Keywords"]"#]),
        meta_content(doc, &[r#"meta[property="article:section"]"#]),
        meta_content(doc, &[r#"meta[property="article:tag"]"#]),
    ];
    sig.fetched_keywords = keyword_parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");

    if let Ok(sel) = Selector::parse("h1, h2") {
        let headings: Vec<String> = doc
            .select(&sel)
            .map(element_text)
            .filter(|t| !t.is_empty() && t.len() < 200)
            .take(HEADING_LIMIT)
            .collect();
        sig.fetched_headings = headings.join(" ");
    }

    sig.fetched_body = body_excerpt(doc);
    sig.fetch_ok = true;
    sig
}

/// First BODY_WORD_LIMIT words of the article/main/body container, with
/// script/style/nav/chrome containers skipped.
fn body_excerpt(doc: &Html) -> String {
    let root = ["article", "main", "body"]
        .iter()
        .filter_map(|name| Selector::parse(name).ok())
        .find_map(|sel| doc.select(&sel).next());

    let Some(root) = root else {
        return String::new();
    };

    let mut words = Vec::new();
    collect_visible_words(root, &mut words);
    words.truncate(BODY_WORD_LIMIT);
    words.join(" ")
}

const SKIPPED_CONTAINERS: &[&str] =
    &["script", "style", "noscript", "svg", "iframe", "nav", "footer", "aside", "header"];

fn collect_visible_words(el: scraper::ElementRef, out: &mut Vec<String>) {
    if out.len() >= BODY_WORD_LIMIT {
        return;
    }
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                out.extend(text.split_whitespace().map(|w| w.to_string()));
                if out.len() >= BODY_WORD_LIMIT {
                    return;
                }
            }
            scraper::Node::Element(element) => {
                if SKIPPED_CONTAINERS.contains(&element.name()) {
                    continue;
                }
                if let Some(child_ref) = scraper::ElementRef::wrap(child) {
                    collect_visible_words(child_ref, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("The AI model is a transformer, and it runs on GPUs");
        assert!(tokens.contains(&"model".to_string()));
        assert!(tokens.contains(&"transformer".to_string()));
        assert!(tokens.contains(&"gpus".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"ai".to_string()));
        // "on", "it" filtered by both length and stopword rules
        assert!(!tokens.iter().any(|t| t.len() <= 2));
    }

    #[test]
    fn tokenizer_keeps_internal_hyphens_and_apostrophes() {
        let tokens = tokenize("Multi-agent systems aren't new");
        assert!(tokens.contains(&"multi-agent".to_string()));
        assert!(tokens.contains(&"aren't".to_string()));
    }

    #[test]
    fn histogram_counts_repeats() {
        let hist = token_histogram("model model model prompt");
        assert_eq!(hist.get("model"), Some(&3));
        assert_eq!(hist.get("prompt"), Some(&1));
    }

    #[test]
    fn combined_text_prefers_fetched_title_and_skips_empties() {
        let sig = ArticleSignals {
            title: "csv title".into(),
            fetched_title: "fetched title".into(),
            tags: "tag1 tag2".into(),
            excerpt: "an excerpt".into(),
            ..Default::default()
        };
        let combined = sig.combined_text();
        assert_eq!(combined, "fetched title tag1 tag2 an excerpt");
    }

    #[test]
    fn display_title_prefers_csv_title() {
        let sig = ArticleSignals {
            title: "csv title".into(),
            fetched_title: "fetched title".into(),
            ..Default::default()
        };
        assert_eq!(sig.display_title(), "csv title");
    }

    #[test]
    fn fetched_signals_from_document() {
        let html = r#"<html><head>
            <title>Fallback Title</title>
            <meta property="og:title" content="OG Title">
            <meta name="description" content="A page about agent orchestration.">
            <meta name="keywords" content="agents, orchestration">
            </head><body>
            <nav>Home About Contact</nav>
            <article><h1>Agent Orchestration</h1><p>Agents coordinating work.</p></article>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let sig = extract_fetched_signals(&doc);
        assert_eq!(sig.fetched_title, "OG Title");
        assert_eq!(sig.fetched_description, "A page about agent orchestration.");
        assert!(sig.fetched_keywords.contains("agents"));
        assert!(sig.fetched_headings.contains("Agent Orchestration"));
        assert!(sig.fetched_body.contains("coordinating"));
        assert!(!sig.fetched_body.contains("Contact"));
        assert!(sig.fetch_ok);
    }
}
