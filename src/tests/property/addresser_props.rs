//! Property tests for the collection addresser.
//!
//! Invariants:
//! - sanitization is idempotent
//! - addressing an already-addressed verdict changes nothing
//! - produced names only contain [a-z0-9_.]

use proptest::prelude::*;

use crate::address::{address, sanitize_segment, Layout};
use crate::catalog::ContentKind;
use crate::pipeline::models::{Derivation, Verdict};

fn verdict(game: &str, edition: &str, book: &str) -> Verdict {
    Verdict {
        kind: ContentKind::SourceMaterial,
        game: game.to_string(),
        edition: edition.to_string(),
        book: book.to_string(),
        title: String::new(),
        publisher: None,
        isbn_10: None,
        isbn_13: None,
        confidence: 0.5,
        rationale: String::new(),
        derivation: Derivation::AiInference,
        extra: Default::default(),
    }
}

proptest! {
    #[test]
    fn sanitize_is_idempotent(input in ".{0,40}") {
        let once = sanitize_segment(&input);
        prop_assert_eq!(sanitize_segment(&once), once);
    }

    #[test]
    fn sanitize_output_alphabet(input in ".{0,40}") {
        let out = sanitize_segment(&input);
        prop_assert!(out
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn address_is_idempotent(
        game in "[a-zA-Z&' ]{1,12}",
        edition in "[a-zA-Z0-9. ]{1,8}",
        book in "[a-zA-Z' ]{1,10}",
    ) {
        for layout in [Layout::Separate, Layout::SingleWithFolder] {
            let first = address(&verdict(&game, &edition, &book), layout);
            // Re-address a verdict built from the sanitized fields.
            let again = address(
                &verdict(
                    &sanitize_segment(&game),
                    &sanitize_segment(&edition),
                    &sanitize_segment(&book),
                ),
                layout,
            );
            prop_assert_eq!(&first, &again);
        }
    }

    #[test]
    fn separate_and_single_share_the_book_name(
        game in "[a-zA-Z ]{1,12}",
        edition in "[a-zA-Z0-9]{1,8}",
        book in "[a-zA-Z]{1,10}",
    ) {
        let v = verdict(&game, &edition, &book);
        let separate = address(&v, Layout::Separate);
        let single = address(&v, Layout::SingleWithFolder);
        prop_assert_eq!(&separate.name, &single.name);
        prop_assert_eq!(single.document_collection.as_str(), "rpger");
        prop_assert!(single.folder.unwrap().ends_with(&single.name));
    }
}
