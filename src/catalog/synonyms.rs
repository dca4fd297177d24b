//! Book-title synonym table.
//!
//! Maps normalized title fragments to (game, edition, book) triples for the
//! explicit-title shortcut. Matching is substring over case-folded,
//! whitespace-collapsed text, so a cover page reading "PLAYER'S  HANDBOOK"
//! still hits.

use super::GameSystem;

/// A title fragment and the catalog triple it resolves to.
#[derive(Debug, Clone, Copy)]
pub struct TitleSynonym {
    /// Normalized fragment (lowercase, single spaces).
    pub fragment: &'static str,
    pub system: GameSystem,
    pub edition: &'static str,
    pub book: &'static str,
    pub title: &'static str,
}

const fn syn(
    fragment: &'static str,
    system: GameSystem,
    edition: &'static str,
    book: &'static str,
    title: &'static str,
) -> TitleSynonym {
    TitleSynonym { fragment, system, edition, book, title }
}

/// Longer fragments first so the most specific synonym wins.
static TITLE_SYNONYMS: &[TitleSynonym] = &[
    syn(
        "advanced dungeons and dragons players handbook",
        GameSystem::DnD,
        "1st",
        "phb",
        "Player's Handbook",
    ),
    syn(
        "xanathar's guide to everything",
        GameSystem::DnD,
        "5th",
        "xgte",
        "Xanathar's Guide to Everything",
    ),
    syn(
        "dungeon master's guide",
        GameSystem::DnD,
        "1st",
        "dmg",
        "Dungeon Master's Guide",
    ),
    syn("player's handbook", GameSystem::DnD, "1st", "phb", "Player's Handbook"),
    syn("players handbook", GameSystem::DnD, "1st", "phb", "Player's Handbook"),
    syn("monster manual", GameSystem::DnD, "1st", "mm", "Monster Manual"),
    syn(
        "monstrous compendium",
        GameSystem::DnD,
        "2nd",
        "mc",
        "Monstrous Compendium",
    ),
    syn(
        "pathfinder core rulebook",
        GameSystem::Pathfinder,
        "2e",
        "crb",
        "Core Rulebook",
    ),
    syn(
        "advanced player's guide",
        GameSystem::Pathfinder,
        "2e",
        "apg",
        "Advanced Player's Guide",
    ),
    syn(
        "pathfinder bestiary",
        GameSystem::Pathfinder,
        "2e",
        "bst",
        "Bestiary",
    ),
    syn(
        "keeper rulebook",
        GameSystem::CallOfCthulhu,
        "7th",
        "keeper",
        "Keeper Rulebook",
    ),
    syn(
        "investigator handbook",
        GameSystem::CallOfCthulhu,
        "7th",
        "investigator",
        "Investigator Handbook",
    ),
    syn(
        "call of cthulhu",
        GameSystem::CallOfCthulhu,
        "7th",
        "keeper",
        "Keeper Rulebook",
    ),
    syn(
        "shadowrun sixth world",
        GameSystem::Shadowrun,
        "6th",
        "core",
        "Shadowrun Sixth World",
    ),
    syn(
        "shadowrun core rulebook",
        GameSystem::Shadowrun,
        "5th",
        "core",
        "Shadowrun Core Rulebook",
    ),
    syn(
        "the traveller book",
        GameSystem::Traveller,
        "classic",
        "core",
        "The Traveller Book",
    ),
    syn(
        "traveller core rulebook",
        GameSystem::Traveller,
        "mongoose2e",
        "core",
        "Traveller Core Rulebook",
    ),
    syn(
        "vampire the masquerade",
        GameSystem::WorldOfDarkness,
        "revised",
        "core",
        "Vampire: The Masquerade",
    ),
    syn(
        "savage worlds adventure edition",
        GameSystem::SavageWorlds,
        "swade",
        "core",
        "Savage Worlds Adventure Edition",
    ),
    syn("gurps basic set", GameSystem::GURPS, "4th", "basic", "GURPS Basic Set"),
];

/// Case-fold and collapse whitespace; apostrophe variants unified so
/// "Player's" and "Players" both normalize the same way for matching.
pub fn normalize_title_text(text: &str) -> String {
    let lowered = text.to_lowercase().replace(['\u{2019}', '`'], "'");
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find the first (most specific) synonym whose fragment occurs in the
/// given normalized text.
pub fn lookup_title(normalized_text: &str) -> Option<&'static TitleSynonym> {
    TITLE_SYNONYMS
        .iter()
        .find(|s| normalized_text.contains(s.fragment))
}
