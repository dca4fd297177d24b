//! Novel character pass.
//!
//! Two passes over the enhanced text stream, only for novel-kind documents:
//! - discover: chunked character extraction with overlapping windows,
//!   filtered by page frequency and a sentence-start heuristic
//! - enhance: re-scan with the discovered set as prior, accumulating
//!   relationships, verbatim quotes, and personality/behavior tags
//!
//! Failure here is recorded in metrics, never fatal to the main pipeline.
//! Relationships are stored as an adjacency map keyed by character id, not
//! as embedded back-references.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::llm::{
    AiResult, CallOptions, CharacterPass, CharacterProfile, CharacterQuote, CharacterSet,
    ProviderClient,
};
use crate::pipeline::models::Section;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct CharacterPassConfig {
    /// Minimum distinct pages a character must appear on.
    pub min_pages: usize,
    /// Window size in characters for provider calls.
    pub chunk_chars: usize,
    /// Overlap between windows as a fraction (0.02-0.05 for continuity).
    pub overlap: f32,
}

impl Default for CharacterPassConfig {
    fn default() -> Self {
        Self { min_pages: 3, chunk_chars: 12_000, overlap: 0.03 }
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRecord {
    /// Stable id derived from the canonical name.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub pages: Vec<u32>,
    pub mentions: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personality: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<CharacterQuote>,
}

/// The parallel structure attached to the artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterReport {
    pub characters: Vec<CharacterRecord>,
    /// Adjacency map keyed by character id.
    pub relationships: BTreeMap<String, Vec<String>>,
}

/// Character id from a surface name.
pub fn character_id(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

// ============================================================================
// Pass driver
// ============================================================================

pub struct NovelCharacterPass {
    config: CharacterPassConfig,
}

impl NovelCharacterPass {
    pub fn new(config: CharacterPassConfig) -> Self {
        Self { config }
    }

    /// Run discover + enhance over the section stream.
    pub async fn run(
        &self,
        sections: &[Section],
        client: &ProviderClient,
        options: &CallOptions,
    ) -> AiResult<CharacterReport> {
        let marked = page_marked_text(sections);
        let chunks = chunk_with_overlap(&marked, self.config.chunk_chars, self.config.overlap);

        // Pass 1: discover.
        let mut merged: BTreeMap<String, CharacterProfile> = BTreeMap::new();
        for chunk in &chunks {
            let set = client
                .extract_characters(chunk, CharacterPass::Discover, None, options)
                .await?;
            for profile in set.characters {
                merge_profile(&mut merged, profile);
            }
        }

        // Frequency and sentence-start filters.
        let discovered: Vec<CharacterProfile> = merged
            .into_values()
            .filter(|p| p.pages.len() >= self.config.min_pages)
            .filter(|p| !only_sentence_starts(&marked, &p.name))
            .collect();

        if discovered.is_empty() {
            return Ok(CharacterReport::default());
        }

        // Pass 2: enhance with the discovered set as prior.
        let prior = CharacterSet { characters: discovered };
        let mut enhanced: BTreeMap<String, CharacterProfile> = BTreeMap::new();
        for profile in &prior.characters {
            enhanced.insert(profile.name.clone(), profile.clone());
        }
        for chunk in &chunks {
            let set = client
                .extract_characters(chunk, CharacterPass::Enhance, Some(&prior), options)
                .await?;
            for profile in set.characters {
                merge_profile(&mut enhanced, profile);
            }
        }

        Ok(build_report(enhanced.into_values().collect()))
    }
}

// ============================================================================
// Text windows
// ============================================================================

/// Concatenate section text with `[Page N]` markers at page boundaries.
pub fn page_marked_text(sections: &[Section]) -> String {
    let mut out = String::new();
    let mut current_page = 0u32;
    for section in sections {
        if section.page != current_page {
            current_page = section.page;
            out.push_str(&format!("[Page {current_page}]\n"));
        }
        out.push_str(&section.text);
        out.push_str("\n\n");
    }
    out
}

/// Split into overlapping windows on line boundaries.
pub fn chunk_with_overlap(text: &str, chunk_chars: usize, overlap: f32) -> Vec<String> {
    if text.len() <= chunk_chars {
        return vec![text.to_string()];
    }
    let overlap_chars = ((chunk_chars as f32) * overlap.clamp(0.02, 0.05)) as usize;
    let lines: Vec<&str> = text.lines().collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let mut size = 0usize;
        let mut end = start;
        while end < lines.len() && size + lines[end].len() + 1 <= chunk_chars {
            size += lines[end].len() + 1;
            end += 1;
        }
        // Always make progress, even past a single oversized line.
        if end == start {
            end = start + 1;
        }
        chunks.push(lines[start..end].join("\n"));
        if end >= lines.len() {
            break;
        }

        // Step back enough lines to cover the overlap budget.
        let mut back = 0usize;
        let mut covered = 0usize;
        while back < end - start - 1 && covered < overlap_chars {
            back += 1;
            covered += lines[end - back].len() + 1;
        }
        start = end - back;
    }
    chunks
}

// ============================================================================
// Merging and filters
// ============================================================================

fn merge_profile(into: &mut BTreeMap<String, CharacterProfile>, profile: CharacterProfile) {
    match into.get_mut(&profile.name) {
        None => {
            into.insert(profile.name.clone(), profile);
        }
        Some(existing) => {
            for page in &profile.pages {
                if !existing.pages.contains(page) {
                    existing.pages.push(*page);
                }
            }
            existing.pages.sort_unstable();
            // Windows overlap, so counts are merged by max, not sum.
            existing.mentions = existing.mentions.max(profile.mentions);
            if existing.description.is_empty() {
                existing.description = profile.description;
            }
            for alias in profile.aliases {
                if !existing.aliases.contains(&alias) {
                    existing.aliases.push(alias);
                }
            }
            for tag in profile.personality {
                if !existing.personality.contains(&tag) {
                    existing.personality.push(tag);
                }
            }
            for tag in profile.behaviors {
                if !existing.behaviors.contains(&tag) {
                    existing.behaviors.push(tag);
                }
            }
            for quote in profile.quotes {
                if !existing.quotes.contains(&quote) {
                    existing.quotes.push(quote);
                }
            }
            for name in profile.related {
                if !existing.related.contains(&name) {
                    existing.related.push(name);
                }
            }
        }
    }
}

/// True when every occurrence of `name` sits at a sentence start, which
/// usually marks an ordinary capitalized word rather than a character.
fn only_sentence_starts(text: &str, name: &str) -> bool {
    let mut found_any = false;
    let mut search_from = 0usize;
    while let Some(pos) = text[search_from..].find(name) {
        let absolute = search_from + pos;
        found_any = true;
        if !is_sentence_start(text, absolute) {
            return false;
        }
        search_from = absolute + name.len();
    }
    found_any
}

fn is_sentence_start(text: &str, pos: usize) -> bool {
    let before = text[..pos]
        .chars()
        .rev()
        .find(|c| !c.is_whitespace() && *c != '"' && *c != '\u{201C}');
    match before {
        None => true,
        Some(c) => matches!(c, '.' | '!' | '?' | ']'),
    }
}

fn build_report(profiles: Vec<CharacterProfile>) -> CharacterReport {
    let mut report = CharacterReport::default();
    let known_ids: BTreeMap<String, String> = profiles
        .iter()
        .map(|p| (p.name.clone(), character_id(&p.name)))
        .collect();

    for profile in profiles {
        let id = character_id(&profile.name);
        let related: Vec<String> = profile
            .related
            .iter()
            .filter_map(|name| known_ids.get(name).cloned())
            .filter(|other| other != &id)
            .collect();
        if !related.is_empty() {
            report.relationships.insert(id.clone(), related);
        }
        let mut pages = profile.pages;
        pages.sort_unstable();
        report.characters.push(CharacterRecord {
            id,
            name: profile.name,
            aliases: profile.aliases,
            pages,
            mentions: profile.mentions,
            description: profile.description,
            personality: profile.personality,
            behaviors: profile.behaviors,
            quotes: profile.quotes,
        });
    }
    report
}

// ============================================================================
// Tests
// ============================================================================
