//! Structured provider outputs and the JSON contract helpers.

use serde::{Deserialize, Serialize};

use crate::catalog::ContentKind;

use super::AiError;

// ============================================================================
// Identification
// ============================================================================

/// Verdict partial produced by `identify`: the classification fields minus
/// the post-derivation ones (derivation, ISBNs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyOutcome {
    pub kind: ContentKind,
    /// Game system identifier ("dnd", "coc", ...).
    pub game: String,
    pub edition: String,
    /// Book code ("phb", "core", ...).
    pub book: String,
    /// Display title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub rationale: String,
}

// ============================================================================
// Categorization
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryVerdict {
    pub category: String,
    pub confidence: f32,
    #[serde(default)]
    pub rationale: String,
}

// ============================================================================
// Characters
// ============================================================================

/// Which of the two novel passes is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterPass {
    Discover,
    Enhance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterQuote {
    pub text: String,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    /// Canonical surface form.
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Distinct pages the character appears on.
    #[serde(default)]
    pub pages: Vec<u32>,
    #[serde(default)]
    pub mentions: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<CharacterQuote>,
    /// Names of related characters (resolved to ids by the novel pass).
    #[serde(default)]
    pub related: Vec<String>,
}

impl CharacterProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            pages: Vec::new(),
            mentions: 0,
            description: String::new(),
            personality: Vec::new(),
            behaviors: Vec::new(),
            quotes: Vec::new(),
            related: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterSet {
    pub characters: Vec<CharacterProfile>,
}

// ============================================================================
// JSON contract
// ============================================================================

/// Extract the JSON object from a model reply: either the whole reply or
/// the first fenced/embedded object. Anything else is `ai_malformed`.
pub fn parse_json_payload(content: &str) -> Result<serde_json::Value, AiError> {
    let trimmed = content.trim();

    // Fast path: the whole reply is JSON.
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    // Fenced block.
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.find("```") {
            if let Ok(v) = serde_json::from_str(rest[..end].trim()) {
                return Ok(v);
            }
        }
    }

    // First balanced object in the text.
    if let Some(start) = trimmed.find('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (i, c) in trimmed[start..].char_indices() {
            match c {
                '"' if !escaped => in_string = !in_string,
                '{' if !in_string => depth += 1,
                '}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &trimmed[start..start + i + 1];
                        if let Ok(v) = serde_json::from_str(candidate) {
                            return Ok(v);
                        }
                        break;
                    }
                }
                _ => {}
            }
            escaped = c == '\\' && !escaped;
        }
    }

    Err(AiError::Malformed(format!(
        "no JSON object in reply ({} chars)",
        content.len()
    )))
}

// ============================================================================
// Shared prompt builders for the HTTP providers
// ============================================================================

/// System prompt demanding strict JSON output.
pub const JSON_SYSTEM_PROMPT: &str =
    "You analyze tabletop RPG documents. Reply with a single JSON object and nothing else.";

pub fn identify_prompt(text: &str, kind: ContentKind) -> String {
    format!(
        "Identify this {kind} document from its opening pages. Reply with JSON: \
         {{\"kind\": \"source_material\"|\"novel\", \"game\": \"<system id, e.g. dnd, pathfinder, \
         coc, shadowrun, traveller, wod, savage_worlds, gurps, other>\", \"edition\": \"<edition>\", \
         \"book\": \"<short book code>\", \"title\": \"<display title>\", \
         \"publisher\": \"<publisher or null>\", \"confidence\": <0..1>, \
         \"rationale\": \"<one sentence>\"}}\n\nDocument text:\n{text}"
    )
}

pub fn categorize_prompt(section_text: &str, allowed: &[String]) -> String {
    format!(
        "Assign this passage to exactly one category from: {}. Reply with JSON: \
         {{\"category\": \"<category>\", \"confidence\": <0..1>, \"rationale\": \"<short>\"}}\n\n\
         Passage:\n{section_text}",
        allowed.join(", ")
    )
}

pub fn characters_prompt(
    novel_text: &str,
    pass: CharacterPass,
    prior: Option<&CharacterSet>,
) -> String {
    match pass {
        CharacterPass::Discover => format!(
            "List the named characters in this novel excerpt. Page boundaries are marked \
             as [Page N]. Reply with JSON: {{\"characters\": [{{\"name\": \"<name>\", \
             \"pages\": [<page numbers>], \"mentions\": <count>, \"description\": \"<short>\"}}]}}\n\n\
             Text:\n{novel_text}"
        ),
        CharacterPass::Enhance => {
            let names: Vec<&str> = prior
                .map(|p| p.characters.iter().map(|c| c.name.as_str()).collect())
                .unwrap_or_default();
            format!(
                "For these known characters — {} — collect relationships, verbatim quotes with \
                 page numbers, and personality/behavior tags from this excerpt. Page boundaries \
                 are marked as [Page N]. Reply with JSON: {{\"characters\": [{{\"name\": \"<name>\", \
                 \"pages\": [], \"quotes\": [{{\"text\": \"<quote>\", \"page\": <n>}}], \
                 \"personality\": [], \"behaviors\": [], \"related\": [\"<other name>\"]}}]}}\n\n\
                 Text:\n{novel_text}",
                names.join(", ")
            )
        }
    }
}

// ============================================================================
// Loose parsing for real-provider replies
// ============================================================================

impl IdentifyOutcome {
    /// Build from a provider JSON object, tolerating missing optional
    /// fields. A missing `kind` falls back to the caller's requested kind;
    /// missing core fields are `ai_malformed`.
    pub fn from_value(value: serde_json::Value, requested: ContentKind) -> Result<Self, AiError> {
        let obj = value
            .as_object()
            .ok_or_else(|| AiError::Malformed("identify reply is not an object".into()))?;

        let field = |name: &str| -> Result<String, AiError> {
            obj.get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| AiError::Malformed(format!("identify reply missing '{name}'")))
        };

        let kind = obj
            .get("kind")
            .and_then(|v| v.as_str())
            .and_then(ContentKind::parse)
            .unwrap_or(requested);

        let confidence = obj
            .get("confidence")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AiError::Malformed("identify reply missing 'confidence'".into()))?;

        Ok(Self {
            kind,
            game: field("game")?,
            edition: field("edition")?,
            book: field("book")?,
            title: field("title")?,
            publisher: obj.get("publisher").and_then(|v| v.as_str()).map(str::to_string),
            confidence: (confidence as f32).clamp(0.0, 1.0),
            rationale: obj
                .get("rationale")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

impl CategoryVerdict {
    /// Build from a provider JSON object, enforcing the allowed-category
    /// contract.
    pub fn from_value(
        value: serde_json::Value,
        allowed: &[String],
    ) -> Result<Self, AiError> {
        let obj = value
            .as_object()
            .ok_or_else(|| AiError::Malformed("categorize reply is not an object".into()))?;
        let category = obj
            .get("category")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AiError::Malformed("categorize reply missing 'category'".into()))?;

        if category != "Uncategorized" && !allowed.iter().any(|c| c == category) {
            return Err(AiError::Malformed(format!(
                "category '{category}' not in the allowed set"
            )));
        }

        let confidence = obj
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        Ok(Self {
            category: category.to_string(),
            confidence: (confidence as f32).clamp(0.0, 1.0),
            rationale: obj
                .get("rationale")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

impl CharacterSet {
    pub fn from_value(value: serde_json::Value) -> Result<Self, AiError> {
        // Accept either a bare array or {"characters": [...]}.
        let characters = if value.is_array() {
            value
        } else {
            value
                .get("characters")
                .cloned()
                .ok_or_else(|| AiError::Malformed("character reply missing 'characters'".into()))?
        };
        serde_json::from_value::<Vec<CharacterProfile>>(characters)
            .map(|characters| Self { characters })
            .map_err(|e| AiError::Malformed(format!("character reply: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let v = parse_json_payload(r#"{"category": "Combat", "confidence": 0.9}"#).unwrap();
        assert_eq!(v["category"], "Combat");
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "Here you go:\n```json\n{\"category\": \"Magic\", \"confidence\": 0.8}\n```";
        let v = parse_json_payload(reply).unwrap();
        assert_eq!(v["category"], "Magic");
    }

    #[test]
    fn test_parse_embedded_json() {
        let reply = "The answer is {\"game\": \"dnd\", \"nested\": {\"a\": 1}} as requested.";
        let v = parse_json_payload(reply).unwrap();
        assert_eq!(v["game"], "dnd");
        assert_eq!(v["nested"]["a"], 1);
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let err = parse_json_payload("I cannot answer that.").unwrap_err();
        assert_eq!(err.code(), "ai_malformed");
    }

    #[test]
    fn test_identify_from_value_fills_kind() {
        let v = serde_json::json!({
            "game": "coc", "edition": "7th", "book": "keeper",
            "title": "Keeper Rulebook", "confidence": 0.8
        });
        let outcome = IdentifyOutcome::from_value(v, ContentKind::SourceMaterial).unwrap();
        assert_eq!(outcome.kind, ContentKind::SourceMaterial);
        assert_eq!(outcome.game, "coc");
    }

    #[test]
    fn test_identify_from_value_missing_field() {
        let v = serde_json::json!({"game": "dnd", "confidence": 0.8});
        let err = IdentifyOutcome::from_value(v, ContentKind::Novel).unwrap_err();
        assert_eq!(err.code(), "ai_malformed");
    }

    #[test]
    fn test_category_from_value_enforces_allowed() {
        let allowed = vec!["Combat".to_string()];
        let ok = serde_json::json!({"category": "Combat", "confidence": 0.7});
        assert!(CategoryVerdict::from_value(ok, &allowed).is_ok());
        let bad = serde_json::json!({"category": "Cooking", "confidence": 0.7});
        let err = CategoryVerdict::from_value(bad, &allowed).unwrap_err();
        assert_eq!(err.code(), "ai_malformed");
        let unc = serde_json::json!({"category": "Uncategorized"});
        assert!(CategoryVerdict::from_value(unc, &allowed).is_ok());
    }

    #[test]
    fn test_character_set_from_value() {
        let v = serde_json::json!({"characters": [{"name": "Elara"}]});
        let set = CharacterSet::from_value(v).unwrap();
        assert_eq!(set.characters.len(), 1);
        assert_eq!(set.characters[0].name, "Elara");
    }

    #[test]
    fn test_identify_outcome_roundtrip() {
        let outcome = IdentifyOutcome {
            kind: ContentKind::SourceMaterial,
            game: "dnd".into(),
            edition: "5th".into(),
            book: "phb".into(),
            title: "Player's Handbook".into(),
            publisher: None,
            confidence: 0.9,
            rationale: "vocabulary".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: IdentifyOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.game, "dnd");
        assert_eq!(back.kind, ContentKind::SourceMaterial);
    }
}
