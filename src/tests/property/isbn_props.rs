//! Property tests for ISBN canonicalization.
//!
//! Invariants:
//! - canonical form is a fixed point: canonical(canonical(x)) == canonical(x)
//! - the two widths of the same book collide on one canonical form
//! - hyphenation and spacing never change the canonical form

use proptest::prelude::*;

use crate::identify::isbn::{canonicalize, is_valid_isbn13, isbn10_to_13};

/// Build a valid ISBN-10 from nine digits by computing the check digit.
fn make_isbn10(digits: [u8; 9]) -> String {
    let mut sum = 0u32;
    for (i, d) in digits.iter().enumerate() {
        sum += u32::from(*d) * (10 - i as u32);
    }
    let check = (11 - (sum % 11)) % 11;
    let mut out: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
    out.push(if check == 10 { 'X' } else { char::from(b'0' + check as u8) });
    out
}

/// Interleave separators into a compact ISBN.
fn decorate(compact: &str, pattern: u8) -> String {
    let mut out = String::new();
    for (i, c) in compact.chars().enumerate() {
        out.push(c);
        if i + 1 < compact.len() && (pattern as usize).wrapping_shr(i as u32) & 1 == 1 {
            out.push(if i % 2 == 0 { '-' } else { ' ' });
        }
    }
    out
}

proptest! {
    #[test]
    fn canonical_is_fixed_point(digits in proptest::array::uniform9(0u8..10)) {
        let isbn10 = make_isbn10(digits);
        let canonical = canonicalize(&isbn10).expect("constructed ISBN-10 is valid");
        prop_assert!(is_valid_isbn13(&canonical));
        prop_assert_eq!(canonicalize(&canonical), Some(canonical.clone()));
    }

    #[test]
    fn both_widths_collide(digits in proptest::array::uniform9(0u8..10)) {
        let isbn10 = make_isbn10(digits);
        let isbn13 = isbn10_to_13(&isbn10).expect("conversion of valid ISBN-10");
        prop_assert_eq!(canonicalize(&isbn10), canonicalize(&isbn13));
    }

    #[test]
    fn separators_do_not_matter(
        digits in proptest::array::uniform9(0u8..10),
        pattern in 0u8..=255,
    ) {
        let compact = make_isbn10(digits);
        let decorated = decorate(&compact, pattern);
        prop_assert_eq!(canonicalize(&decorated), canonicalize(&compact));
    }

    #[test]
    fn junk_never_canonicalizes(junk in "[a-z ]{0,20}") {
        prop_assert_eq!(canonicalize(&junk), None);
    }
}
