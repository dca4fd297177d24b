//! Game Catalog
//!
//! Static registry of supported game systems: editions, book codes,
//! weighted detection keywords, content-category taxonomies, and the
//! book-title synonym table used by the explicit-title shortcut.
//!
//! Read-only after startup; all lookups are over `'static` tables and
//! safe for concurrent use.

mod synonyms;
mod vocabulary;

pub use synonyms::{lookup_title, normalize_title_text, TitleSynonym};
pub use vocabulary::{
    category_hints, detect_system, DetectionResult, KeywordWeight, GAME_TABLE, NOVEL_CATEGORIES,
    SOURCE_CATEGORIES, UNCATEGORIZED,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Content kind
// ============================================================================

/// Document content class: rulebook-like source material or fiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    SourceMaterial,
    Novel,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceMaterial => "source_material",
            Self::Novel => "novel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "source_material" | "source" | "rulebook" => Some(Self::SourceMaterial),
            "novel" | "fiction" => Some(Self::Novel),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Game systems
// ============================================================================

/// Supported TTRPG game systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameSystem {
    /// Dungeons & Dragons (all editions)
    DnD,
    /// Pathfinder
    Pathfinder,
    /// Call of Cthulhu
    CallOfCthulhu,
    /// Shadowrun
    Shadowrun,
    /// Traveller
    Traveller,
    /// World of Darkness / Chronicles of Darkness
    WorldOfDarkness,
    /// Savage Worlds
    SavageWorlds,
    /// GURPS
    GURPS,
    /// Unknown or unsupported system
    Other,
}

impl GameSystem {
    /// Machine-readable identifier, used in collection addresses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DnD => "dnd",
            Self::Pathfinder => "pathfinder",
            Self::CallOfCthulhu => "coc",
            Self::Shadowrun => "shadowrun",
            Self::Traveller => "traveller",
            Self::WorldOfDarkness => "wod",
            Self::SavageWorlds => "savage_worlds",
            Self::GURPS => "gurps",
            Self::Other => "other",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DnD => "Dungeons & Dragons",
            Self::Pathfinder => "Pathfinder",
            Self::CallOfCthulhu => "Call of Cthulhu",
            Self::Shadowrun => "Shadowrun",
            Self::Traveller => "Traveller",
            Self::WorldOfDarkness => "World of Darkness",
            Self::SavageWorlds => "Savage Worlds",
            Self::GURPS => "GURPS",
            Self::Other => "Unknown System",
        }
    }

    /// Parse a game system from its string identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "dnd" | "d&d" | "dungeons_and_dragons" => Some(Self::DnD),
            "pathfinder" | "pf" => Some(Self::Pathfinder),
            "coc" | "call_of_cthulhu" | "callofcthulhu" => Some(Self::CallOfCthulhu),
            "shadowrun" | "sr" => Some(Self::Shadowrun),
            "traveller" | "traveler" => Some(Self::Traveller),
            "wod" | "world_of_darkness" => Some(Self::WorldOfDarkness),
            "savage_worlds" | "savageworlds" | "sw" => Some(Self::SavageWorlds),
            "gurps" => Some(Self::GURPS),
            "other" | "unknown" => Some(Self::Other),
            _ => None,
        }
    }
}

// ============================================================================
// Catalog tables
// ============================================================================

/// A known book within an edition.
#[derive(Debug, Clone, Copy)]
pub struct BookDef {
    /// Short code used in collection addresses ("phb", "dmg").
    pub code: &'static str,
    /// Display title.
    pub title: &'static str,
}

/// A known edition of a game system, with its book list.
#[derive(Debug, Clone, Copy)]
pub struct EditionDef {
    pub id: &'static str,
    pub books: &'static [BookDef],
}

/// Per-system catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct GameDef {
    pub system: GameSystem,
    /// Ordered oldest-first; the last entry is the current edition.
    pub editions: &'static [EditionDef],
    pub keywords: &'static [KeywordWeight],
    /// Domain jargon that spell correction must never rewrite.
    pub jargon: &'static [&'static str],
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CatalogError {
    /// An edition unknown to the catalog was asked for and no fallback
    /// could be derived.
    #[error("catalog has no edition '{edition}' for {game} and no fallback")]
    MissingEdition { game: String, edition: String },

    #[error("catalog has no game system '{0}'")]
    UnknownSystem(String),
}

impl CatalogError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingEdition { .. } | Self::UnknownSystem(_) => "catalog_missing",
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

// ============================================================================
// Catalog
// ============================================================================

/// The static game catalog. Cheap to construct; all data is `'static`.
#[derive(Debug, Clone, Default)]
pub struct GameCatalog;

impl GameCatalog {
    pub fn new() -> Self {
        Self
    }

    /// All systems known to the catalog (excluding `Other`).
    pub fn systems(&self) -> impl Iterator<Item = GameSystem> + '_ {
        GAME_TABLE.iter().map(|g| g.system)
    }

    pub fn game(&self, system: GameSystem) -> Option<&'static GameDef> {
        GAME_TABLE.iter().find(|g| g.system == system)
    }

    /// Ordered list of known editions for a system.
    pub fn editions(&self, system: GameSystem) -> &'static [EditionDef] {
        self.game(system).map(|g| g.editions).unwrap_or(&[])
    }

    /// Book codes for a (system, edition) pair.
    ///
    /// If the edition is unknown but the system has exactly one edition,
    /// that edition is used as the fallback. Otherwise `catalog_missing`.
    pub fn books(&self, system: GameSystem, edition: &str) -> CatalogResult<&'static [BookDef]> {
        let editions = self.editions(system);
        if let Some(e) = editions.iter().find(|e| e.id.eq_ignore_ascii_case(edition)) {
            return Ok(e.books);
        }
        if editions.len() == 1 {
            return Ok(editions[0].books);
        }
        Err(CatalogError::MissingEdition {
            game: system.as_str().to_string(),
            edition: edition.to_string(),
        })
    }

    /// Weighted detection keywords for a system.
    pub fn keywords(&self, system: GameSystem) -> &'static [KeywordWeight] {
        self.game(system).map(|g| g.keywords).unwrap_or(&[])
    }

    /// Domain jargon protected from spell correction.
    pub fn protected_terms(&self, system: GameSystem) -> &'static [&'static str] {
        self.game(system).map(|g| g.jargon).unwrap_or(&[])
    }

    /// Ordered content categories for a document kind.
    pub fn categories(&self, kind: ContentKind) -> &'static [&'static str] {
        match kind {
            ContentKind::SourceMaterial => vocabulary::SOURCE_CATEGORIES,
            ContentKind::Novel => vocabulary::NOVEL_CATEGORIES,
        }
    }

    /// Scan normalized text for a known book title. Explicit-title shortcut.
    pub fn find_title(&self, normalized_text: &str) -> Option<&'static TitleSynonym> {
        synonyms::lookup_title(normalized_text)
    }

    /// Keyword vote across all systems.
    pub fn detect_system(&self, text: &str) -> DetectionResult {
        vocabulary::detect_system(text)
    }

    /// Default (edition, book) fallback for a detected system: the current
    /// edition's core book.
    pub fn fallback_edition_book(
        &self,
        system: GameSystem,
    ) -> Option<(&'static str, &'static BookDef)> {
        let editions = self.editions(system);
        let edition = editions.last()?;
        let book = edition.books.first()?;
        Some((edition.id, book))
    }
}

// ============================================================================
// Tests
// ============================================================================
