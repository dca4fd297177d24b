//! Text quality enhancement.
//!
//! Cleans OCR artifacts out of extracted page text and scores text quality:
//! - whitespace normalization (paragraph breaks preserved)
//! - run-on splitting and missing-space insertion
//! - OCR substitutions (applied only when they produce a dictionary hit)
//! - dictionary spell correction with a bounded edit distance
//!
//! Every enhancement is idempotent on already-clean text.

mod dictionary;

pub use dictionary::Dictionary;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ============================================================================
// Modes and metrics
// ============================================================================

/// Enhancement aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceMode {
    Off,
    Normal,
    Aggressive,
}

impl EnhanceMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(Self::Off),
            "normal" => Some(Self::Normal),
            "aggressive" => Some(Self::Aggressive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Normal => "normal",
            Self::Aggressive => "aggressive",
        }
    }
}

/// Correction counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionCounts {
    pub run_on_splits: u64,
    pub missing_spaces: u64,
    pub ocr_substitutions: u64,
    pub spell_corrections: u64,
}

impl CorrectionCounts {
    pub fn total(&self) -> u64 {
        self.run_on_splits + self.missing_spaces + self.ocr_substitutions + self.spell_corrections
    }

    pub fn merge(&mut self, other: &CorrectionCounts) {
        self.run_on_splits += other.run_on_splits;
        self.missing_spaces += other.missing_spaces;
        self.ocr_substitutions += other.ocr_substitutions;
        self.spell_corrections += other.spell_corrections;
    }
}

/// Result of one enhancement call.
#[derive(Debug, Clone)]
pub struct Enhanced {
    pub text: String,
    pub corrections: CorrectionCounts,
    /// Quality score of the input, 0-100.
    pub score_before: f32,
    /// Quality score of the output, 0-100.
    pub score_after: f32,
}

/// Letter grade by the 90/80/70/60 thresholds.
pub fn grade(score: f32) -> char {
    if score >= 90.0 {
        'A'
    } else if score >= 80.0 {
        'B'
    } else if score >= 70.0 {
        'C'
    } else if score >= 60.0 {
        'D'
    } else {
        'F'
    }
}

// ============================================================================
// Enhancer
// ============================================================================

/// OCR substitution pairs tried on unknown tokens.
const OCR_SUBSTITUTIONS: &[(&str, &str)] = &[("rn", "m"), ("vv", "w"), ("1", "l"), ("0", "o")];

pub struct TextEnhancer {
    dictionary: Arc<Dictionary>,
    mode: EnhanceMode,
}

impl TextEnhancer {
    pub fn new(dictionary: Arc<Dictionary>, mode: EnhanceMode) -> Self {
        Self { dictionary, mode }
    }

    pub fn mode(&self) -> EnhanceMode {
        self.mode
    }

    /// Enhance one block of text. Infallible: the worst outcome is the
    /// input unchanged.
    pub fn enhance(&self, text: &str) -> Enhanced {
        let score_before = quality_score(text, &self.dictionary);
        if self.mode == EnhanceMode::Off {
            return Enhanced {
                text: text.to_string(),
                corrections: CorrectionCounts::default(),
                score_before,
                score_after: score_before,
            };
        }

        let mut counts = CorrectionCounts::default();
        let normalized = normalize_whitespace(text);
        let corrected = self.correct_tokens(&normalized, &mut counts);
        let score_after = quality_score(&corrected, &self.dictionary);

        Enhanced { text: corrected, corrections: counts, score_before, score_after }
    }

    fn correct_tokens(&self, text: &str, counts: &mut CorrectionCounts) -> String {
        let max_distance = match self.mode {
            EnhanceMode::Aggressive => 3,
            _ => 2,
        };
        let correct_proper_nouns = self.mode == EnhanceMode::Aggressive;

        let mut out_lines = Vec::new();
        for line in text.split('\n') {
            let mut out_tokens: Vec<String> = Vec::new();
            for token in line.split(' ') {
                if token.is_empty() {
                    continue;
                }
                self.process_token(token, max_distance, correct_proper_nouns, counts, &mut out_tokens);
            }
            out_lines.push(out_tokens.join(" "));
        }
        out_lines.join("\n")
    }

    fn process_token(
        &self,
        token: &str,
        max_distance: usize,
        correct_proper_nouns: bool,
        counts: &mut CorrectionCounts,
        out: &mut Vec<String>,
    ) {
        let (prefix, core, suffix) = strip_edges(token);

        if core.is_empty() {
            out.push(token.to_string());
            return;
        }

        // Run-on split: lowercase/uppercase boundary where both halves are
        // words and the joined form is not.
        if let Some((a, b)) = self.try_runon_split(core) {
            counts.run_on_splits += 1;
            out.push(format!("{prefix}{a}"));
            // Recurse on the tail so "attackTheOrc" fully unfolds.
            self.process_token(
                &format!("{b}{suffix}"),
                max_distance,
                correct_proper_nouns,
                counts,
                out,
            );
            return;
        }

        // Missing space at a letter->digit boundary ("Level1" -> "Level 1").
        if let Some((word, digits)) = self.try_digit_split(core) {
            counts.missing_spaces += 1;
            out.push(format!("{prefix}{word}"));
            out.push(format!("{digits}{suffix}"));
            return;
        }

        if self.dictionary.contains(core) || self.dictionary.is_protected(core) {
            out.push(token.to_string());
            return;
        }

        // OCR substitutions, accepted only when they land in the dictionary.
        for (from, to) in OCR_SUBSTITUTIONS {
            if core.contains(from) {
                let candidate = core.replace(from, to);
                if self.dictionary.contains(&candidate) {
                    counts.ocr_substitutions += 1;
                    out.push(format!("{prefix}{}{suffix}", match_case(core, &candidate)));
                    return;
                }
            }
        }

        // Spell correction. Proper-noun-looking tokens are left alone
        // unless the mode is aggressive.
        let proper_noun = core.chars().next().is_some_and(|c| c.is_uppercase());
        if (!proper_noun || correct_proper_nouns) && core.chars().all(|c| c.is_alphabetic()) {
            if let Some(replacement) = self.dictionary.correct(core, max_distance) {
                counts.spell_corrections += 1;
                out.push(format!("{prefix}{}{suffix}", match_case(core, &replacement)));
                return;
            }
        }

        out.push(token.to_string());
    }

    fn try_runon_split(&self, core: &str) -> Option<(String, String)> {
        let chars: Vec<char> = core.chars().collect();
        for i in 1..chars.len() {
            if chars[i - 1].is_lowercase() && chars[i].is_uppercase() {
                let a: String = chars[..i].iter().collect();
                let b: String = chars[i..].iter().collect();
                if a.len() >= 2
                    && b.len() >= 2
                    && self.dictionary.contains(&a)
                    && self.dictionary.contains(&b)
                    && !self.dictionary.contains(&core.to_lowercase())
                {
                    return Some((a, b));
                }
            }
        }
        None
    }

    fn try_digit_split(&self, core: &str) -> Option<(String, String)> {
        let boundary = core
            .char_indices()
            .skip(1)
            .find(|&(i, c)| {
                c.is_ascii_digit() && core[..i].chars().all(|p| p.is_alphabetic())
            })
            .map(|(i, _)| i)?;
        let (word, digits) = core.split_at(boundary);
        if word.len() >= 3 && digits.chars().all(|c| c.is_ascii_digit()) && self.dictionary.contains(word)
        {
            Some((word.to_string(), digits.to_string()))
        } else {
            None
        }
    }
}

/// Preserve the original's leading-capital shape on a replacement.
fn match_case(original: &str, replacement: &str) -> String {
    if original.chars().next().is_some_and(|c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

/// Split leading/trailing punctuation off a token.
fn strip_edges(token: &str) -> (&str, &str, &str) {
    let start = token
        .find(|c: char| c.is_alphanumeric())
        .unwrap_or(token.len());
    let end = token
        .rfind(|c: char| c.is_alphanumeric())
        .map(|i| i + token[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(start);
    (&token[..start], &token[start..end], &token[end..])
}

// ============================================================================
// Whitespace normalization
// ============================================================================

/// Collapse space runs, normalize line endings, strip trailing spaces, and
/// reduce 3+ newlines to a paragraph break. Idempotent.
pub fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.split('\n') {
        let collapsed = line.split([' ', '\t']).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(&collapsed);
    }
    out
}

// ============================================================================
// Quality scoring
// ============================================================================

/// Blend of dictionary coverage, word volume, structural markers, and the
/// inverse suspicious-pattern rate. Returns 0-100.
pub fn quality_score(text: &str, dict: &Dictionary) -> f32 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }

    let alpha_tokens: Vec<String> = tokens
        .iter()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| t.len() >= 2 && t.chars().all(|c| c.is_alphabetic()))
        .map(|t| t.to_string())
        .collect();

    let coverage = if alpha_tokens.is_empty() || dict.is_empty() {
        0.0
    } else {
        alpha_tokens.iter().filter(|t| dict.contains(t)).count() as f32 / alpha_tokens.len() as f32
    };

    let volume = (tokens.len() as f32 / 10.0).min(1.0);

    let has_paragraphs = text.contains("\n\n");
    let has_heading = text.lines().any(|l| {
        let t = l.trim();
        !t.is_empty() && t.len() < 60 && !t.ends_with('.') && t.chars().next().is_some_and(char::is_uppercase)
    });
    let structure = if has_paragraphs { 0.6 } else { 0.0 } + if has_heading { 0.4 } else { 0.0 };

    let suspicious = tokens.iter().filter(|t| is_suspicious(t)).count() as f32 / tokens.len() as f32;

    (coverage * 0.4 + volume * 0.2 + structure * 0.2 + (1.0 - suspicious) * 0.2) * 100.0
}

fn is_suspicious(token: &str) -> bool {
    if token.contains('\u{FFFD}') {
        return true;
    }
    let chars: Vec<char> = token.chars().collect();
    for w in chars.windows(2) {
        if w[0].is_lowercase() && w[1].is_uppercase() {
            return true;
        }
    }
    // A digit sandwiched between letters ("Leve1") is an OCR tell.
    for w in chars.windows(3) {
        if w[0].is_alphabetic() && w[1].is_ascii_digit() && w[2].is_alphabetic() {
            return true;
        }
    }
    // Same character four or more times in a row.
    chars.windows(4).any(|w| w.iter().all(|&c| c == w[0]))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn enhancer(mode: EnhanceMode) -> TextEnhancer {
        TextEnhancer::new(Arc::new(Dictionary::builtin()), mode)
    }

    #[test]
    fn test_off_mode_is_identity() {
        let e = enhancer(EnhanceMode::Off);
        let input = "weird   spacing andTypos";
        let out = e.enhance(input);
        assert_eq!(out.text, input);
        assert_eq!(out.corrections.total(), 0);
    }

    #[test]
    fn test_whitespace_normalization() {
        let e = enhancer(EnhanceMode::Normal);
        let out = e.enhance("the  wizard \n\n\n\ncast a   spell  ");
        assert_eq!(out.text, "the wizard\n\ncast a spell");
    }

    #[test]
    fn test_runon_split() {
        let e = enhancer(EnhanceMode::Normal);
        let out = e.enhance("the attackRoll happens");
        assert_eq!(out.text, "the attack Roll happens");
        assert_eq!(out.corrections.run_on_splits, 1);
    }

    #[test]
    fn test_missing_space_before_digit() {
        let e = enhancer(EnhanceMode::Normal);
        let out = e.enhance("reach Level1 now");
        assert_eq!(out.text, "reach Level 1 now");
        assert_eq!(out.corrections.missing_spaces, 1);
    }

    #[test]
    fn test_dice_notation_untouched() {
        let e = enhancer(EnhanceMode::Normal);
        let out = e.enhance("roll 2d6 for 1st attack");
        assert_eq!(out.text, "roll 2d6 for 1st attack");
    }

    #[test]
    fn test_ocr_substitution() {
        let e = enhancer(EnhanceMode::Normal);
        // "rnagic" -> "magic" via rn -> m.
        let out = e.enhance("the rnagic sword");
        assert_eq!(out.text, "the magic sword");
        assert_eq!(out.corrections.ocr_substitutions, 1);
    }

    #[test]
    fn test_spell_correction() {
        let e = enhancer(EnhanceMode::Normal);
        let out = e.enhance("the wizrd cast a spell");
        assert_eq!(out.text, "the wizard cast a spell");
        assert_eq!(out.corrections.spell_corrections, 1);
    }

    #[test]
    fn test_proper_nouns_protected_in_normal_mode() {
        let e = enhancer(EnhanceMode::Normal);
        let out = e.enhance("ask Waterdeep about it");
        assert_eq!(out.text, "ask Waterdeep about it");
        assert_eq!(out.corrections.spell_corrections, 0);
    }

    #[test]
    fn test_protected_jargon_untouched() {
        let mut dict = Dictionary::builtin();
        dict.add_protected(["thac0"]);
        let e = TextEnhancer::new(Arc::new(dict), EnhanceMode::Aggressive);
        let out = e.enhance("check your thac0 value");
        assert_eq!(out.text, "check your thac0 value");
    }

    #[test]
    fn test_idempotent_on_clean_text() {
        let e = enhancer(EnhanceMode::Normal);
        let clean = "The wizard cast a spell.\n\nThe dragon took damage.";
        let once = e.enhance(clean);
        assert_eq!(once.text, clean);
        let twice = e.enhance(&once.text);
        assert_eq!(twice.text, once.text);
        assert_eq!(twice.corrections.total(), 0);
    }

    #[test]
    fn test_quality_score_clean_beats_noisy() {
        let dict = Dictionary::builtin();
        let clean = "The wizard cast a spell at the dragon.\n\nCombat began in the tower.";
        let noisy = "Th3 w1zrdcastSpell aaaa drgn xx";
        assert!(quality_score(clean, &dict) > quality_score(noisy, &dict));
    }

    #[test]
    fn test_grades() {
        assert_eq!(grade(95.0), 'A');
        assert_eq!(grade(85.0), 'B');
        assert_eq!(grade(75.0), 'C');
        assert_eq!(grade(65.0), 'D');
        assert_eq!(grade(20.0), 'F');
    }

    #[test]
    fn test_normalize_whitespace_idempotent() {
        let messy = "a  b\r\nc\n\n\n\nd   ";
        let once = normalize_whitespace(messy);
        assert_eq!(normalize_whitespace(&once), once);
        assert_eq!(once, "a b\nc\n\nd");
    }

    #[test]
    fn test_enhance_scores_improve() {
        let e = enhancer(EnhanceMode::Normal);
        let out = e.enhance("the wizrd and the drgon fought");
        assert!(out.score_after >= out.score_before);
    }
}
