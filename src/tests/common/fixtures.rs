//! Shared fixtures: documents and services wired to in-memory backends.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::pdf::{MemoryPage, MemoryPdf, MemoryPdfFacade};
use crate::service::ExtractorService;
use crate::storage::{MemoryDocumentStore, MemoryVectorStore};

/// Service over in-memory stores and a fixture document, returning the
/// store handles for post-run inspection.
pub fn service_with_stores(
    doc: MemoryPdf,
) -> (ExtractorService, Arc<MemoryVectorStore>, Arc<MemoryDocumentStore>) {
    service_with_config(doc, AppConfig::default())
}

pub fn service_with_config(
    doc: MemoryPdf,
    config: AppConfig,
) -> (ExtractorService, Arc<MemoryVectorStore>, Arc<MemoryDocumentStore>) {
    let vector = Arc::new(MemoryVectorStore::new());
    let document = Arc::new(MemoryDocumentStore::new());
    let service = ExtractorService::with_parts(
        config,
        Arc::new(MemoryPdfFacade::new(doc)),
        Arc::clone(&vector) as Arc<dyn crate::storage::VectorStore>,
        Arc::clone(&document) as Arc<dyn crate::storage::DocumentStore>,
    );
    (service, vector, document)
}

/// A 124-page Player's Handbook-like rulebook whose first page carries the
/// literal title and whose second page carries an ISBN.
pub fn players_handbook() -> MemoryPdf {
    let mut pages = Vec::with_capacity(124);
    pages.push(MemoryPage::text(
        "Player's Handbook\n\nA guide of rules for fantasy adventurers and their games.",
    ));
    pages.push(MemoryPage::text(
        "First published long ago.\n\nISBN 0-306-40615-2\n\nAll rights reserved.",
    ));
    for i in 2..124 {
        pages.push(MemoryPage::text(rulebook_page(i)));
    }
    MemoryPdf::new(pages).with_title("Player's Handbook")
}

/// Deterministic per-page rulebook text cycling through category
/// vocabulary, with an occasional table.
pub fn rulebook_page(i: usize) -> String {
    match i % 4 {
        0 => "Combat Rules\n\nThe fighter makes an attack roll against armor class. \
              Roll for damage and check initiative each round. A critical hit means \
              double damage dice for the attack."
            .to_string(),
        1 => "Magic and Spells\n\nThe wizard may cast a spell using arcane power. \
              Each spell has a level and a casting time. A cleric calls on divine \
              magic to help the party."
            .to_string(),
        2 => "Character Creation\n\nChoose a class and a race for your character. \
              Each level grants experience and new skill choices. A background \
              gives your character history."
            .to_string(),
        _ => format!(
            "Random Encounters\n\nRoll on the table below for the encounter.\n\n\
             Roll | Result | Notes\n1 | Goblin band | hostile\n2 | Orc patrol | hostile\n\
             3 | Wolf pack | neutral\n\nPage marker {i}."
        ),
    }
}

/// A rulebook with no explicit title but heavy system vocabulary.
pub fn ambiguous_rulebook() -> MemoryPdf {
    let mut pages = vec![MemoryPage::text(
        "An untitled compendium.\n\nRoll a saving throw against your armor class. \
         The dungeon master checks hit dice and spell slots before play.",
    )];
    for i in 2..30 {
        pages.push(MemoryPage::text(rulebook_page(i)));
    }
    MemoryPdf::new(pages)
}

/// A short novel with twelve principal characters, each mentioned
/// mid-sentence on at least three distinct pages.
pub fn novel_with_characters() -> MemoryPdf {
    const NAMES: [&str; 12] = [
        "Elara", "Brom", "Caspian", "Doria", "Edmund", "Fenric", "Gwendolyn", "Hale", "Isolde",
        "Joren", "Kestrel", "Lyra",
    ];
    let mut pages = Vec::new();
    pages.push(MemoryPage::text(
        "The Long Road\n\nA novel of the northern kingdoms and the people who walk them.",
    ));
    // Fifteen story pages; each page carries four name pairs, so every
    // name lands on several distinct pages with a companion for the
    // relationship pass.
    for page in 0..15 {
        let mut text = String::from("The road went on through the dark forest.\n\n");
        for slot in 0..4 {
            let name = NAMES[(page + slot * 3) % NAMES.len()];
            let companion = NAMES[(page + slot * 3 + 1) % NAMES.len()];
            text.push_str(&format!(
                "The morning light found {name} walking beside {companion}. \"We must \
                 keep moving before night,\" said {name} to {companion}. The cold wind \
                 worried {name}.\n\n"
            ));
        }
        pages.push(MemoryPage::text(text));
    }
    MemoryPdf::new(pages).with_title("The Long Road")
}

/// A partly scanned document: some native pages, one OCR page, one page
/// needing OCR with no engine available, one failing page.
pub fn scanned_mixed() -> MemoryPdf {
    MemoryPdf::new(vec![
        MemoryPage::text("Player's Handbook\n\nRules of the game for every adventurer."),
        MemoryPage::ocr(
            "Scanned combat rules. The attack roll uses armor class and damage dice.",
            0.8,
        ),
        MemoryPage::ocr_unavailable(),
        MemoryPage::failing(),
        MemoryPage::text(rulebook_page(2)),
    ])
}
