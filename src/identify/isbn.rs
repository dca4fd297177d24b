//! ISBN scanning and canonicalization.
//!
//! Canonical form is the 13-digit ISBN-13 after digit-only extraction and
//! checksum validation; ISBN-10 converts through the 978 prefix.

use regex::Regex;
use std::sync::OnceLock;

/// Candidate runs of digits with separators, optionally ending in X.
fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9][0-9Xx\- ]{8,16}[0-9Xx]").expect("static regex"))
}

/// Both canonical forms found in a text scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsbnFindings {
    /// 10-character canonical ISBN-10 (digits, possibly trailing X).
    pub isbn_10: Option<String>,
    /// 13-digit canonical ISBN-13.
    pub isbn_13: Option<String>,
}

impl IsbnFindings {
    pub fn is_empty(&self) -> bool {
        self.isbn_10.is_none() && self.isbn_13.is_none()
    }
}

/// Strip separators, keeping digits and a checksum X.
fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn is_valid_isbn10(compact: &str) -> bool {
    if compact.len() != 10 {
        return false;
    }
    let mut sum = 0u32;
    for (i, c) in compact.chars().enumerate() {
        let value = match c {
            'X' if i == 9 => 10,
            d if d.is_ascii_digit() => d as u32 - '0' as u32,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

pub fn is_valid_isbn13(compact: &str) -> bool {
    if compact.len() != 13 || !compact.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = compact
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let d = c as u32 - '0' as u32;
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    sum % 10 == 0
}

/// Convert a valid compact ISBN-10 to its ISBN-13 form.
pub fn isbn10_to_13(compact10: &str) -> Option<String> {
    if !is_valid_isbn10(compact10) {
        return None;
    }
    let body = format!("978{}", &compact10[..9]);
    let sum: u32 = body
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let d = c as u32 - '0' as u32;
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    let check = (10 - (sum % 10)) % 10;
    Some(format!("{body}{check}"))
}

/// Canonicalize any hyphenated/spaced ISBN-10 or ISBN-13 string to the
/// 13-digit form. Returns `None` for invalid checksums.
pub fn canonicalize(raw: &str) -> Option<String> {
    let compacted = compact(raw);
    match compacted.len() {
        10 if is_valid_isbn10(&compacted) => isbn10_to_13(&compacted),
        13 if is_valid_isbn13(&compacted) => Some(compacted),
        _ => None,
    }
}

/// Scan text for valid ISBNs. The first valid hit of each width wins.
pub fn scan(text: &str) -> IsbnFindings {
    let mut findings = IsbnFindings::default();
    for m in candidate_regex().find_iter(text) {
        let compacted = compact(m.as_str());
        match compacted.len() {
            10 if findings.isbn_10.is_none() && is_valid_isbn10(&compacted) => {
                if findings.isbn_13.is_none() {
                    findings.isbn_13 = isbn10_to_13(&compacted);
                }
                findings.isbn_10 = Some(compacted);
            }
            13 if findings.isbn_13.is_none() && is_valid_isbn13(&compacted) => {
                findings.isbn_13 = Some(compacted);
            }
            _ => {}
        }
        if findings.isbn_10.is_some() && findings.isbn_13.is_some() {
            break;
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isbn10_checksum() {
        assert!(is_valid_isbn10("0306406152"));
        assert!(is_valid_isbn10("080442957X"));
        assert!(!is_valid_isbn10("0306406153"));
    }

    #[test]
    fn test_isbn13_checksum() {
        assert!(is_valid_isbn13("9780306406157"));
        assert!(!is_valid_isbn13("9780306406158"));
    }

    #[test]
    fn test_isbn10_to_13() {
        assert_eq!(isbn10_to_13("0306406152"), Some("9780306406157".to_string()));
    }

    #[test]
    fn test_canonicalize_hyphenated() {
        assert_eq!(canonicalize("0-306-40615-2"), Some("9780306406157".to_string()));
        assert_eq!(canonicalize("978-0-306-40615-7"), Some("9780306406157".to_string()));
        assert_eq!(canonicalize("978 0 306 40615 7"), Some("9780306406157".to_string()));
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let canonical = canonicalize("0-306-40615-2").unwrap();
        assert_eq!(canonicalize(&canonical), Some(canonical.clone()));
    }

    #[test]
    fn test_two_forms_collide() {
        // The same book in both widths canonicalizes identically.
        assert_eq!(canonicalize("0306406152"), canonicalize("9780306406157"));
    }

    #[test]
    fn test_canonicalize_rejects_garbage() {
        assert_eq!(canonicalize("not an isbn"), None);
        assert_eq!(canonicalize("1234567890"), None);
    }

    #[test]
    fn test_scan_in_prose() {
        let text = "First published 1979.\nISBN 0-306-40615-2\nPrinted in the USA.";
        let findings = scan(text);
        assert_eq!(findings.isbn_10.as_deref(), Some("0306406152"));
        assert_eq!(findings.isbn_13.as_deref(), Some("9780306406157"));
    }

    #[test]
    fn test_scan_skips_invalid_candidates() {
        let text = "Catalog 1234567890 and ISBN 978-0-306-40615-7 here.";
        let findings = scan(text);
        assert_eq!(findings.isbn_13.as_deref(), Some("9780306406157"));
        assert!(findings.isbn_10.is_none());
    }
}
