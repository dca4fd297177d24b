//! Property tests for the deterministic mock provider.
//!
//! Invariant: two invocations of any mock operation on the same input
//! return equal verdicts.

use std::sync::Arc;

use futures::executor::block_on;
use proptest::prelude::*;

use crate::catalog::{ContentKind, GameCatalog};
use crate::llm::{AiProvider, CallOptions, CharacterPass, MockProvider};

fn mock() -> MockProvider {
    MockProvider::new(Arc::new(GameCatalog::new()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn identify_is_deterministic(text in ".{0,400}") {
        let m = mock();
        let options = CallOptions::identify();
        let a = block_on(m.identify(&text, ContentKind::SourceMaterial, &options)).unwrap();
        let b = block_on(m.identify(&text, ContentKind::SourceMaterial, &options)).unwrap();
        prop_assert_eq!(&a.game, &b.game);
        prop_assert_eq!(&a.edition, &b.edition);
        prop_assert_eq!(&a.book, &b.book);
        prop_assert_eq!(a.confidence, b.confidence);
        prop_assert_eq!(&a.rationale, &b.rationale);
    }

    #[test]
    fn identify_confidence_bounded(text in ".{0,400}") {
        let m = mock();
        let outcome =
            block_on(m.identify(&text, ContentKind::Novel, &CallOptions::identify())).unwrap();
        prop_assert!((0.0..=1.0).contains(&outcome.confidence));
    }

    #[test]
    fn categorize_is_deterministic(text in ".{0,300}") {
        let m = mock();
        let categories = vec!["Combat".to_string(), "Magic".to_string(), "Lore".to_string()];
        let options = CallOptions::categorize();
        let a = block_on(m.categorize(&text, &categories, &options)).unwrap();
        let b = block_on(m.categorize(&text, &categories, &options)).unwrap();
        prop_assert_eq!(&a.category, &b.category);
        prop_assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn categorize_stays_in_allowed_set(text in ".{0,300}") {
        let m = mock();
        let categories = vec!["Combat".to_string(), "Magic".to_string()];
        let verdict =
            block_on(m.categorize(&text, &categories, &CallOptions::categorize())).unwrap();
        prop_assert!(
            verdict.category == "Uncategorized" || categories.contains(&verdict.category)
        );
    }

    #[test]
    fn discover_is_deterministic(text in "[A-Za-z .\n]{0,400}") {
        let m = mock();
        let options = CallOptions::identify();
        let a = block_on(m.extract_characters(&text, CharacterPass::Discover, None, &options))
            .unwrap();
        let b = block_on(m.extract_characters(&text, CharacterPass::Discover, None, &options))
            .unwrap();
        let names_a: Vec<&str> = a.characters.iter().map(|c| c.name.as_str()).collect();
        let names_b: Vec<&str> = b.characters.iter().map(|c| c.name.as_str()).collect();
        prop_assert_eq!(names_a, names_b);
    }
}
