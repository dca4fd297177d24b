//! Property tests for the text enhancer.
//!
//! Invariants:
//! - enhancement is idempotent on already-clean text
//! - off mode is the identity
//! - quality scores stay in [0, 100]

use std::sync::Arc;

use proptest::prelude::*;

use crate::enhance::{quality_score, Dictionary, EnhanceMode, TextEnhancer};

/// Words guaranteed to be in the built-in dictionary.
const CLEAN_WORDS: &[&str] = &[
    "the", "wizard", "cast", "a", "spell", "dragon", "took", "damage", "attack", "roll",
    "combat", "magic", "character", "table", "rules", "adventure", "sword", "shield",
];

fn clean_text() -> impl Strategy<Value = String> {
    // 1-4 paragraphs of 3-12 dictionary words each.
    proptest::collection::vec(
        proptest::collection::vec(0usize..CLEAN_WORDS.len(), 3..12),
        1..4,
    )
    .prop_map(|paragraphs| {
        paragraphs
            .into_iter()
            .map(|indices| {
                indices
                    .into_iter()
                    .map(|i| CLEAN_WORDS[i])
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    })
}

fn enhancer(mode: EnhanceMode) -> TextEnhancer {
    TextEnhancer::new(Arc::new(Dictionary::builtin()), mode)
}

proptest! {
    #[test]
    fn idempotent_on_clean_text(text in clean_text()) {
        let e = enhancer(EnhanceMode::Normal);
        let once = e.enhance(&text);
        prop_assert_eq!(&once.text, &text);
        prop_assert_eq!(once.corrections.total(), 0);
        let twice = e.enhance(&once.text);
        prop_assert_eq!(&twice.text, &once.text);
    }

    #[test]
    fn enhancement_is_convergent(text in ".{0,200}") {
        // One pass reaches the fixed point: a second pass changes nothing.
        let e = enhancer(EnhanceMode::Normal);
        let once = e.enhance(&text);
        let twice = e.enhance(&once.text);
        prop_assert_eq!(&twice.text, &once.text);
    }

    #[test]
    fn off_mode_is_identity(text in ".{0,200}") {
        let e = enhancer(EnhanceMode::Off);
        let out = e.enhance(&text);
        prop_assert_eq!(&out.text, &text);
        prop_assert_eq!(out.corrections.total(), 0);
    }

    #[test]
    fn quality_score_bounded(text in ".{0,300}") {
        let dict = Dictionary::builtin();
        let score = quality_score(&text, &dict);
        prop_assert!((0.0..=100.0).contains(&score));
    }
}
