use std::collections::{HashMap, HashSet};

use crate::config::{SectionHints, Weights};
use crate::outline::Outline;
use crate::signals::{token_histogram, token_set, ArticleSignals};

/// Token evidence for one subsection: its summary heading plus a histogram
/// of the titles already filed under it.
#[derive(Debug, Clone)]
pub struct SubsectionProfile {
    pub sub_id: String,
    pub section_id: String,
    pub summary_tokens: HashSet<String>,
    pub title_histogram: HashMap<String, u32>,
}

/// Profiles in document order. Document order is the tie-break for equal
/// scores and the fallback target for zero-signal articles.
pub fn build_profiles(outline: &Outline) -> Vec<SubsectionProfile> {
    let mut profiles = Vec::new();
    for section in &outline.sections {
        for sub in &section.subsections {
            let mut title_histogram: HashMap<String, u32> = HashMap::new();
            for entry in &sub.entries {
                for (token, count) in token_histogram(&entry.title) {
                    *title_histogram.entry(token).or_insert(0) += count;
                }
            }
            profiles.push(SubsectionProfile {
                sub_id: sub.id.clone(),
                section_id: section.id.clone(),
                summary_tokens: token_set(&sub.title),
                title_histogram,
            });
        }
    }
    profiles
}

fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    a.intersection(b).count() as f64
}

fn hint_overlap(tokens: &HashSet<String>, hints: Option<&HashSet<String>>) -> f64 {
    match hints {
        Some(hints) => tokens.iter().filter(|t| hints.contains(*t)).count() as f64,
        None => 0.0,
    }
}

pub fn score_subsection(
    profile: &SubsectionProfile,
    topic_tokens: &HashSet<String>,
    tag_tokens: &HashSet<String>,
    body_tokens: &HashSet<String>,
    hints: &SectionHints,
    weights: &Weights,
) -> f64 {
    let section_hints = hints.for_section(&profile.section_id);

    let title_cooccur: u32 = topic_tokens
        .iter()
        .map(|t| {
            profile
                .title_histogram
                .get(t)
                .copied()
                .unwrap_or(0)
                .min(weights.title_cap)
        })
        .sum();

    weights.tags_summary * overlap(tag_tokens, &profile.summary_tokens)
        + weights.topic_summary * overlap(topic_tokens, &profile.summary_tokens)
        + weights.tags_hints * hint_overlap(tag_tokens, section_hints)
        + weights.topic_hints * hint_overlap(topic_tokens, section_hints)
        + weights.body_hints * hint_overlap(body_tokens, section_hints)
        + weights.body_summary * overlap(body_tokens, &profile.summary_tokens)
        + weights.title_cooccur * f64::from(title_cooccur)
}

/// Pick placement targets for one article. The top scorer is always chosen;
/// with multi-placement enabled, runners-up join only within the relative
/// tie-break band. A non-positive top score means the evidence is
/// uninformative, so only the single top target is returned.
pub fn best_subsections<'a>(
    profiles: &'a [SubsectionProfile],
    signals: &ArticleSignals,
    hints: &SectionHints,
    weights: &Weights,
    tie_break_band: f64,
    max_sections: usize,
) -> Vec<&'a SubsectionProfile> {
    let topic_tokens = token_set(&signals.combined_text());
    let tag_tokens = token_set(&signals.tags);
    let body_tokens = token_set(signals.body_text());

    if topic_tokens.is_empty() && tag_tokens.is_empty() && body_tokens.is_empty() {
        return profiles.first().into_iter().collect();
    }

    let mut scored: Vec<(f64, &SubsectionProfile)> = profiles
        .iter()
        .map(|p| {
            (
                score_subsection(p, &topic_tokens, &tag_tokens, &body_tokens, hints, weights),
                p,
            )
        })
        .collect();
    // Stable sort keeps document order among equal scores.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let Some(&(top_score, top)) = scored.first() else {
        return Vec::new();
    };
    if top_score <= 0.0 {
        return vec![top];
    }

    let mut chosen = vec![top];
    if max_sections > 1 {
        for &(score, profile) in &scored[1..] {
            if chosen.len() >= max_sections {
                break;
            }
            if score >= top_score * tie_break_band {
                chosen.push(profile);
            }
        }
    }
    chosen
}

/// Cross-reference note for the primary entry when an article lands in more
/// than one subsection, e.g. "→ also in §3-A, §7-B". Secondary entries carry
/// no back-reference.
pub fn cross_ref_text(targets: &[&SubsectionProfile]) -> Option<String> {
    if targets.len() < 2 {
        return None;
    }
    let refs: Vec<String> = targets[1..]
        .iter()
        .map(|t| {
            let section = t.section_id.strip_prefix('s').unwrap_or(&t.section_id);
            let sub_letter = t
                .sub_id
                .chars()
                .last()
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or('?');
            format!("§{}-{}", section, sub_letter)
        })
        .collect();
    Some(format!("→ also in {}", refs.join(", ")))
}
