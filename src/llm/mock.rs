//! Deterministic mock provider.
//!
//! Runs the catalog's title-synonym and keyword logic and synthesizes a
//! verdict whose confidence equals the keyword hit density. Always
//! registered; the orchestrator uses it as the last-resort fallback.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::catalog::{
    category_hints, normalize_title_text, ContentKind, GameCatalog, GameSystem,
};

use super::{
    AiProvider, AiResult, CallOptions, CategoryVerdict, CharacterPass, CharacterProfile,
    CharacterQuote, CharacterSet, IdentifyOutcome, ProviderHealth,
};

/// Capitalized words that start sentences far more often than they name
/// characters.
const NAME_STOPWORDS: &[&str] = &[
    "The", "A", "An", "And", "But", "Or", "He", "She", "It", "They", "We", "You", "I", "His",
    "Her", "Their", "Then", "There", "This", "That", "When", "Where", "What", "Why", "How", "In",
    "On", "At", "As", "After", "Before", "Chapter", "Page", "Suddenly", "Meanwhile", "Finally",
    "Now", "Once", "Yes", "No", "Not", "With", "For", "From", "To", "Of", "By", "If", "So",
];

/// Trait adjectives the enhance pass scans for near a character name.
const TRAIT_WORDS: &[&str] = &[
    "brave", "wise", "cruel", "kind", "cunning", "loyal", "fierce", "gentle", "proud", "grim",
    "quiet", "bold", "patient", "reckless", "stern",
];

pub struct MockProvider {
    catalog: Arc<GameCatalog>,
    page_marker: Regex,
}

impl MockProvider {
    pub fn new(catalog: Arc<GameCatalog>) -> Self {
        Self {
            catalog,
            page_marker: Regex::new(r"\[Page (\d+)\]").expect("static regex"),
        }
    }

    fn current_page(&self, line: &str, page: &mut u32) -> bool {
        if let Some(caps) = self.page_marker.captures(line) {
            if let Ok(n) = caps[1].parse::<u32>() {
                *page = n;
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn identify(
        &self,
        text: &str,
        kind: ContentKind,
        _options: &CallOptions,
    ) -> AiResult<IdentifyOutcome> {
        let normalized = normalize_title_text(text);

        if let Some(synonym) = self.catalog.find_title(&normalized) {
            return Ok(IdentifyOutcome {
                kind,
                game: synonym.system.as_str().to_string(),
                edition: synonym.edition.to_string(),
                book: synonym.book.to_string(),
                title: synonym.title.to_string(),
                publisher: None,
                confidence: 0.97,
                rationale: format!("title match: '{}'", synonym.fragment),
            });
        }

        let detection = self.catalog.detect_system(text);
        let (edition, book, title) = match self.catalog.fallback_edition_book(detection.system) {
            Some((edition, book)) if detection.system != GameSystem::Other => (
                edition.to_string(),
                book.code.to_string(),
                book.title.to_string(),
            ),
            _ => (
                "unknown".to_string(),
                "unknown".to_string(),
                first_line_title(text),
            ),
        };

        Ok(IdentifyOutcome {
            kind,
            game: detection.system.as_str().to_string(),
            edition,
            book,
            title,
            publisher: None,
            confidence: detection.confidence,
            rationale: if detection.matched.is_empty() {
                "no known vocabulary".to_string()
            } else {
                format!("keyword vote: {}", detection.matched.join(", "))
            },
        })
    }

    async fn categorize(
        &self,
        section_text: &str,
        allowed_categories: &[String],
        _options: &CallOptions,
    ) -> AiResult<CategoryVerdict> {
        let lower = section_text.to_lowercase();
        let mut best: Option<(&String, usize)> = None;
        for category in allowed_categories {
            let hits: usize = category_hints(category)
                .iter()
                .filter(|hint| lower.contains(*hint))
                .count();
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((category, hits));
            }
        }
        match best {
            Some((category, hits)) => Ok(CategoryVerdict {
                category: category.clone(),
                confidence: (hits as f32 / 4.0).min(1.0),
                rationale: format!("{hits} category hints"),
            }),
            None => Ok(CategoryVerdict {
                category: "Uncategorized".to_string(),
                confidence: 0.0,
                rationale: "no category hints".to_string(),
            }),
        }
    }

    async fn extract_characters(
        &self,
        novel_text: &str,
        pass: CharacterPass,
        prior: Option<&CharacterSet>,
        _options: &CallOptions,
    ) -> AiResult<CharacterSet> {
        match pass {
            CharacterPass::Discover => Ok(self.discover(novel_text)),
            CharacterPass::Enhance => Ok(self.enhance(novel_text, prior)),
        }
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth::Ok
    }
}

impl MockProvider {
    fn discover(&self, text: &str) -> CharacterSet {
        // name -> (pages, mentions)
        let mut seen: BTreeMap<String, (Vec<u32>, u64)> = BTreeMap::new();
        let mut page = 1u32;

        for line in text.lines() {
            if self.current_page(line, &mut page) {
                continue;
            }
            for raw in line.split_whitespace() {
                let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
                if word.len() < 3
                    || !word.chars().next().is_some_and(char::is_uppercase)
                    || !word.chars().all(char::is_alphabetic)
                    || NAME_STOPWORDS.contains(&word)
                {
                    continue;
                }
                let entry = seen.entry(word.to_string()).or_default();
                if !entry.0.contains(&page) {
                    entry.0.push(page);
                }
                entry.1 += 1;
            }
        }

        let characters = seen
            .into_iter()
            .filter(|(_, (_, mentions))| *mentions >= 2)
            .map(|(name, (pages, mentions))| {
                let mut profile = CharacterProfile::new(name);
                profile.pages = pages;
                profile.mentions = mentions;
                profile.description = format!("Mentioned {mentions} times");
                profile
            })
            .collect();
        CharacterSet { characters }
    }

    fn enhance(&self, text: &str, prior: Option<&CharacterSet>) -> CharacterSet {
        let mut set = prior.cloned().unwrap_or_default();
        let names: Vec<String> = set.characters.iter().map(|c| c.name.clone()).collect();

        for paragraph_with_page in paragraphs_with_pages(text, &self.page_marker) {
            let (page, paragraph) = paragraph_with_page;
            let lower = paragraph.to_lowercase();

            for profile in &mut set.characters {
                if !paragraph.contains(&profile.name) {
                    continue;
                }

                // Verbatim quotes sharing a paragraph with the name.
                for quote in quoted_spans(&paragraph) {
                    let q = CharacterQuote { text: quote, page };
                    if !profile.quotes.contains(&q) && profile.quotes.len() < 5 {
                        profile.quotes.push(q);
                    }
                }

                // Trait adjectives in the same paragraph.
                for trait_word in TRAIT_WORDS {
                    if lower.contains(trait_word)
                        && !profile.personality.iter().any(|t| t == trait_word)
                    {
                        profile.personality.push((*trait_word).to_string());
                    }
                }

                // Co-mentioned characters become relationships.
                for other in &names {
                    if other != &profile.name
                        && paragraph.contains(other.as_str())
                        && !profile.related.contains(other)
                    {
                        profile.related.push(other.clone());
                    }
                }
            }
        }
        set
    }
}

fn first_line_title(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Untitled")
        .chars()
        .take(80)
        .collect()
}

/// Split page-marked text into paragraphs, tracking the page each one
/// belongs to.
fn paragraphs_with_pages(text: &str, marker: &Regex) -> Vec<(u32, String)> {
    let mut out = Vec::new();
    let mut page = 1u32;
    let mut current = String::new();
    for line in text.lines() {
        if let Some(caps) = marker.captures(line) {
            if let Ok(n) = caps[1].parse::<u32>() {
                page = n;
            }
            continue;
        }
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push((page, std::mem::take(&mut current)));
            }
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(line.trim());
        }
    }
    if !current.is_empty() {
        out.push((page, current));
    }
    out
}

fn quoted_spans(paragraph: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = paragraph;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        match after.find('"') {
            Some(end) => {
                let quote = &after[..end];
                if quote.split_whitespace().count() >= 2 {
                    out.push(quote.to_string());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mock() -> MockProvider {
        MockProvider::new(Arc::new(GameCatalog::new()))
    }

    #[tokio::test]
    async fn test_identify_explicit_title() {
        let m = mock();
        let outcome = m
            .identify(
                "PLAYER'S HANDBOOK\nRules for adventurers",
                ContentKind::SourceMaterial,
                &CallOptions::identify(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.game, "dnd");
        assert_eq!(outcome.edition, "1st");
        assert_eq!(outcome.book, "phb");
        assert!(outcome.confidence >= 0.95);
    }

    #[tokio::test]
    async fn test_identify_keyword_vote() {
        let m = mock();
        let text = "Roll a saving throw against your armor class. \
                    The dungeon master checks hit dice and spell slots.";
        let outcome = m
            .identify(text, ContentKind::SourceMaterial, &CallOptions::identify())
            .await
            .unwrap();
        assert_eq!(outcome.game, "dnd");
        assert!(outcome.confidence > 0.5);
    }

    #[tokio::test]
    async fn test_identify_deterministic() {
        let m = mock();
        let text = "sanity check for the investigator; the keeper smiles";
        let a = m
            .identify(text, ContentKind::SourceMaterial, &CallOptions::identify())
            .await
            .unwrap();
        let b = m
            .identify(text, ContentKind::SourceMaterial, &CallOptions::identify())
            .await
            .unwrap();
        assert_eq!(a.game, b.game);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.rationale, b.rationale);
    }

    #[tokio::test]
    async fn test_categorize_combat() {
        let m = mock();
        let verdict = m
            .categorize(
                "The attack deals 2d6 damage; roll initiative and check armor.",
                &["Combat".to_string(), "Magic".to_string()],
                &CallOptions::categorize(),
            )
            .await
            .unwrap();
        assert_eq!(verdict.category, "Combat");
        assert!(verdict.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_categorize_no_hits() {
        let m = mock();
        let verdict = m
            .categorize(
                "zxq qqq unrelated text",
                &["Combat".to_string()],
                &CallOptions::categorize(),
            )
            .await
            .unwrap();
        assert_eq!(verdict.category, "Uncategorized");
        assert_eq!(verdict.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_discover_characters() {
        let m = mock();
        let text = "[Page 1]\nElara walked in. Elara smiled at Brom.\n\
                    [Page 2]\nBrom nodded. Elara left.";
        let set = m
            .extract_characters(
                text,
                CharacterPass::Discover,
                None,
                &CallOptions::identify(),
            )
            .await
            .unwrap();
        let elara = set.characters.iter().find(|c| c.name == "Elara").unwrap();
        assert_eq!(elara.pages, vec![1, 2]);
        assert_eq!(elara.mentions, 3);
        assert!(set.characters.iter().any(|c| c.name == "Brom"));
    }

    #[tokio::test]
    async fn test_enhance_adds_quotes_and_relations() {
        let m = mock();
        let text = "[Page 3]\nElara turned to Brom. \"We leave at dawn tonight,\" she said. \
                    The brave pair agreed.";
        let prior = CharacterSet {
            characters: vec![CharacterProfile::new("Elara"), CharacterProfile::new("Brom")],
        };
        let set = m
            .extract_characters(
                text,
                CharacterPass::Enhance,
                Some(&prior),
                &CallOptions::identify(),
            )
            .await
            .unwrap();
        let elara = set.characters.iter().find(|c| c.name == "Elara").unwrap();
        assert!(!elara.quotes.is_empty());
        assert_eq!(elara.quotes[0].page, 3);
        assert!(elara.related.contains(&"Brom".to_string()));
        assert!(elara.personality.contains(&"brave".to_string()));
    }
}
