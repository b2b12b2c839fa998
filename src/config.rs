use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Score weights for subsection placement. Defaults match the tuning the
/// outline was built with; override via the TOML config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub tags_summary: f64,
    pub topic_summary: f64,
    pub tags_hints: f64,
    pub topic_hints: f64,
    pub body_hints: f64,
    pub body_summary: f64,
    pub title_cooccur: f64,
    pub title_cap: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            tags_summary: 5.0,
            topic_summary: 3.0,
            tags_hints: 4.0,
            topic_hints: 3.0,
            body_hints: 2.5,
            body_summary: 1.5,
            title_cooccur: 0.6,
            title_cap: 3,
        }
    }
}

/// Empirical extraction and placement constants. The values are inherited
/// from long-running use against the existing collection; change them only
/// deliberately.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// A high-precision word-count candidate at or above this count wins
    /// immediately.
    pub high_precision_words: u32,
    /// Secondary placements must score at least this fraction of the top.
    pub tie_break_band: f64,
    /// Demote the top word-count candidate when it exceeds the runner-up by
    /// both this ratio and `demotion_margin` words.
    pub demotion_ratio: f64,
    pub demotion_margin: u32,
    pub weights: Weights,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            high_precision_words: 120,
            tie_break_band: 0.88,
            demotion_ratio: 1.6,
            demotion_margin: 500,
            weights: Weights::default(),
        }
    }
}

/// Per-section topic priors: section id → keyword set. Injected into the
/// scorer so tests can run against synthetic taxonomies.
#[derive(Debug, Clone, Default)]
pub struct SectionHints {
    hints: HashMap<String, HashSet<String>>,
}

impl SectionHints {
    pub fn from_table(table: &[(&str, &[&str])]) -> Self {
        let hints = table
            .iter()
            .map(|(id, words)| {
                (
                    id.to_string(),
                    words.iter().map(|w| w.to_string()).collect(),
                )
            })
            .collect();
        Self { hints }
    }

    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        let hints = map
            .into_iter()
            .map(|(id, words)| (id, words.into_iter().collect()))
            .collect();
        Self { hints }
    }

    pub fn for_section(&self, section_id: &str) -> Option<&HashSet<String>> {
        self.hints.get(section_id)
    }
}

impl Default for CurateConfig {
    fn default() -> Self {
        Self {
            tunables: Tunables::default(),
            section_hints: None,
        }
    }
}

/// Optional TOML config file:
///
/// ```toml
/// [tunables]
/// tie_break_band = 0.9
///
/// [section_hints]
/// s1 = ["llm", "model", "training"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CurateConfig {
    #[serde(default)]
    pub tunables: Tunables,
    #[serde(default)]
    pub section_hints: Option<HashMap<String, Vec<String>>>,
}

impl CurateConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CurateConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn section_hints(&self) -> SectionHints {
        match &self.section_hints {
            Some(map) => SectionHints::from_map(map.clone()),
            None => default_section_hints(),
        }
    }
}

/// Built-in priors for the research collection's eight top-level sections.
const DEFAULT_HINTS: &[(&str, &[&str])] = &[
    (
        "s1",
        &[
            "llm", "llms", "model", "models", "hallucination", "hallucinations", "rag",
            "benchmark", "benchmarks", "benchmarking", "architecture", "training",
            "inference", "reasoning", "transformer", "diffusion", "embedding", "token",
            "tokens", "tokenizer", "parameter", "parameters", "pretraining", "finetuning",
            "multimodal", "vision", "image", "video", "generation", "language",
        ],
    ),
    (
        "s2",
        &[
            "tool", "tools", "workflow", "prompt", "prompting", "coding", "code",
            "productivity", "search", "assistant", "copilot", "plugin", "browser",
            "extension", "summarize", "summarization", "ocr", "document", "spreadsheet",
            "excel", "pdf", "notebooklm", "perplexity", "replit", "writing",
        ],
    ),
    (
        "s3",
        &[
            "agent", "agents", "agentic", "autonomous", "orchestration", "multiagent",
            "multi-agent", "openclaw", "moltbook", "workflow", "automation", "automate",
            "deploy", "deployment", "mcp", "protocol",
        ],
    ),
    (
        "s4",
        &[
            "safety", "ethics", "ethical", "alignment", "misuse", "policy", "legal",
            "regulatory", "regulation", "law", "risk", "governance", "security",
            "privacy", "bias", "misinformation", "deepfake", "harm", "danger",
            "threat", "censor", "censorship", "rights",
        ],
    ),
    (
        "s5",
        &[
            "education", "educational", "student", "students", "teaching", "learning",
            "classroom", "school", "university", "college", "course", "curriculum",
            "academic", "professor", "homework",
        ],
    ),
    (
        "s6",
        &[
            "cognitive", "cognition", "psychology", "psychological", "neuroscience",
            "brain", "behavior", "behaviour", "human", "mind", "consciousness",
            "emotion", "mental", "perception", "memory",
        ],
    ),
    (
        "s7",
        &[
            "economy", "economic", "jobs", "job", "labor", "labour", "work", "workforce",
            "society", "societal", "social", "business", "industry", "industries",
            "advertising", "corporate", "company", "companies", "inequality", "wage",
            "employment", "unemployment", "copyright", "art", "creative",
        ],
    ),
    (
        "s8",
        &[
            "science", "biology", "health", "medicine", "medical", "climate",
            "environment", "environmental", "research", "discovery", "physics",
            "chemistry", "drug", "drugs", "genomics", "protein", "astronomy",
        ],
    ),
];

pub fn default_section_hints() -> SectionHints {
    SectionHints::from_table(DEFAULT_HINTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_inherited_values() {
        let t = Tunables::default();
        assert_eq!(t.high_precision_words, 120);
        assert_eq!(t.tie_break_band, 0.88);
        assert_eq!(t.demotion_ratio, 1.6);
        assert_eq!(t.demotion_margin, 500);
        assert_eq!(t.weights.tags_summary, 5.0);
        assert_eq!(t.weights.title_cap, 3);
    }

    #[test]
    fn default_hints_cover_all_sections() {
        let hints = default_section_hints();
        for id in ["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8"] {
            assert!(hints.for_section(id).is_some(), "missing hints for {}", id);
        }
        assert!(hints.for_section("s1").unwrap().contains("transformer"));
        assert!(hints.for_section("s9").is_none());
    }

    #[test]
    fn config_overrides_hints() {
        let toml_text = r#"
            [tunables]
            tie_break_band = 0.9

            [section_hints]
            x1 = ["rockets", "orbits"]
        "#;
        let config: CurateConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.tunables.tie_break_band, 0.9);
        assert_eq!(config.tunables.demotion_margin, 500);
        let hints = config.section_hints();
        assert!(hints.for_section("x1").unwrap().contains("rockets"));
        assert!(hints.for_section("s1").is_none());
    }
}
