//! Detection keywords, category taxonomies, and the keyword vote.
//!
//! Keyword tables follow the strong/weak indicator split used for system
//! detection: strong terms carry weight 1.0, supporting vocabulary 0.3.

use super::{BookDef, EditionDef, GameDef, GameSystem};

// ============================================================================
// Categories
// ============================================================================

/// Ordered content categories for source material.
pub const SOURCE_CATEGORIES: &[&str] = &[
    "Combat",
    "Magic",
    "Character",
    "Equipment",
    "Monsters",
    "Tables",
    "Rules",
    "Lore",
];

/// Ordered content categories for novels.
pub const NOVEL_CATEGORIES: &[&str] = &[
    "Chapter/Section",
    "Dialogue",
    "Description",
    "Action",
    "Internal Monologue",
    "Narrative",
];

/// Category assigned when no verdict could be produced.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Hint terms per category, used by the deterministic mock categorizer.
pub fn category_hints(category: &str) -> &'static [&'static str] {
    match category {
        "Combat" => &[
            "attack", "damage", "initiative", "armor", "hit points", "weapon", "round", "melee",
            "ranged", "critical",
        ],
        "Magic" => &[
            "spell", "caster", "magic", "ritual", "arcane", "divine", "enchantment", "wizard",
            "cleric", "mana",
        ],
        "Character" => &[
            "class", "level", "ability", "skill", "race", "background", "proficiency",
            "experience", "feat",
        ],
        "Equipment" => &[
            "gold", "cost", "gear", "armor", "item", "weight", "equipment", "supplies", "tools",
        ],
        "Monsters" => &[
            "monster", "creature", "beast", "dragon", "undead", "lair", "challenge rating",
            "stat block",
        ],
        "Tables" => &["table", "roll", "d100", "d20", "result", "column", "row"],
        "Rules" => &[
            "rule", "check", "difficulty", "modifier", "saving throw", "turn", "action",
            "procedure",
        ],
        "Lore" => &[
            "history", "kingdom", "legend", "god", "ancient", "realm", "culture", "pantheon",
        ],
        "Chapter/Section" => &["chapter", "part", "book", "prologue", "epilogue"],
        "Dialogue" => &["said", "asked", "replied", "whispered", "shouted", "\""],
        "Description" => &["stood", "loomed", "stretched", "gleamed", "smelled", "color"],
        "Action" => &["ran", "struck", "leapt", "fought", "charged", "fled", "grabbed"],
        "Internal Monologue" => &["thought", "wondered", "realized", "remembered", "felt"],
        "Narrative" => &["then", "after", "before", "meanwhile", "journey", "finally"],
        _ => &[],
    }
}

// ============================================================================
// Keyword weights
// ============================================================================

/// A detection keyword and its vote weight.
#[derive(Debug, Clone, Copy)]
pub struct KeywordWeight {
    pub term: &'static str,
    pub weight: f32,
}

const fn strong(term: &'static str) -> KeywordWeight {
    KeywordWeight { term, weight: 1.0 }
}

const fn weak(term: &'static str) -> KeywordWeight {
    KeywordWeight { term, weight: 0.3 }
}

// ============================================================================
// Game table
// ============================================================================

pub static GAME_TABLE: &[GameDef] = &[
    GameDef {
        system: GameSystem::DnD,
        editions: &[
            EditionDef {
                id: "1st",
                books: &[
                    BookDef { code: "phb", title: "Player's Handbook" },
                    BookDef { code: "dmg", title: "Dungeon Master's Guide" },
                    BookDef { code: "mm", title: "Monster Manual" },
                ],
            },
            EditionDef {
                id: "2nd",
                books: &[
                    BookDef { code: "phb", title: "Player's Handbook" },
                    BookDef { code: "dmg", title: "Dungeon Master Guide" },
                    BookDef { code: "mc", title: "Monstrous Compendium" },
                ],
            },
            EditionDef {
                id: "3.5",
                books: &[
                    BookDef { code: "phb", title: "Player's Handbook" },
                    BookDef { code: "dmg", title: "Dungeon Master's Guide" },
                    BookDef { code: "mm", title: "Monster Manual" },
                ],
            },
            EditionDef {
                id: "5th",
                books: &[
                    BookDef { code: "phb", title: "Player's Handbook" },
                    BookDef { code: "dmg", title: "Dungeon Master's Guide" },
                    BookDef { code: "mm", title: "Monster Manual" },
                    BookDef { code: "xgte", title: "Xanathar's Guide to Everything" },
                ],
            },
        ],
        keywords: &[
            strong("armor class"),
            strong("hit dice"),
            strong("saving throw"),
            strong("dungeon master"),
            strong("spell slots"),
            strong("proficiency bonus"),
            strong("thac0"),
            weak("d20"),
            weak("hit points"),
            weak("ability score"),
            weak("alignment"),
            weak("experience points"),
            weak("cantrip"),
        ],
        jargon: &[
            "thac0", "cantrip", "tiefling", "dragonborn", "drow", "lich", "beholder", "mindflayer",
            "gith", "modron", "owlbear", "vancian",
        ],
    },
    GameDef {
        system: GameSystem::Pathfinder,
        editions: &[
            EditionDef {
                id: "1e",
                books: &[
                    BookDef { code: "crb", title: "Core Rulebook" },
                    BookDef { code: "apg", title: "Advanced Player's Guide" },
                    BookDef { code: "bst", title: "Bestiary" },
                ],
            },
            EditionDef {
                id: "2e",
                books: &[
                    BookDef { code: "crb", title: "Core Rulebook" },
                    BookDef { code: "apg", title: "Advanced Player's Guide" },
                    BookDef { code: "bst", title: "Bestiary" },
                    BookDef { code: "gmg", title: "Gamemastery Guide" },
                ],
            },
        ],
        keywords: &[
            strong("pathfinder"),
            strong("golarion"),
            strong("paizo"),
            strong("three actions"),
            strong("ancestry"),
            strong("proficiency rank"),
            weak("feat"),
            weak("heritage"),
            weak("skill check"),
            weak("reaction"),
        ],
        jargon: &[
            "golarion", "paizo", "azlanti", "tian", "kyonin", "absalom", "pathfinder",
        ],
    },
    GameDef {
        system: GameSystem::CallOfCthulhu,
        editions: &[
            EditionDef {
                id: "6th",
                books: &[BookDef { code: "core", title: "Call of Cthulhu" }],
            },
            EditionDef {
                id: "7th",
                books: &[
                    BookDef { code: "keeper", title: "Keeper Rulebook" },
                    BookDef { code: "investigator", title: "Investigator Handbook" },
                ],
            },
        ],
        keywords: &[
            strong("sanity"),
            strong("mythos"),
            strong("investigator"),
            strong("keeper"),
            strong("cthulhu"),
            strong("chaosium"),
            weak("horror"),
            weak("eldritch"),
            weak("1920s"),
            weak("madness"),
        ],
        jargon: &[
            "cthulhu", "nyarlathotep", "shoggoth", "yog-sothoth", "azathoth", "rlyeh", "miskatonic",
            "necronomicon",
        ],
    },
    GameDef {
        system: GameSystem::Shadowrun,
        editions: &[
            EditionDef {
                id: "5th",
                books: &[BookDef { code: "core", title: "Shadowrun Core Rulebook" }],
            },
            EditionDef {
                id: "6th",
                books: &[BookDef { code: "core", title: "Shadowrun Sixth World" }],
            },
        ],
        keywords: &[
            strong("shadowrun"),
            strong("nuyen"),
            strong("decker"),
            strong("technomancer"),
            strong("sixth world"),
            weak("cyberware"),
            weak("megacorp"),
            weak("essence"),
            weak("matrix"),
        ],
        jargon: &[
            "nuyen", "decker", "technomancer", "rigger", "awakened", "cyberdeck", "wageslave",
        ],
    },
    GameDef {
        system: GameSystem::Traveller,
        editions: &[
            EditionDef {
                id: "classic",
                books: &[BookDef { code: "core", title: "The Traveller Book" }],
            },
            EditionDef {
                id: "mongoose2e",
                books: &[BookDef { code: "core", title: "Traveller Core Rulebook" }],
            },
        ],
        keywords: &[
            strong("traveller"),
            strong("jump drive"),
            strong("subsector"),
            strong("imperium"),
            strong("mustering out"),
            weak("starship"),
            weak("2d6"),
            weak("patron"),
        ],
        jargon: &["imperium", "vilani", "zhodani", "vargr", "aslan", "subsector"],
    },
    GameDef {
        system: GameSystem::WorldOfDarkness,
        editions: &[
            EditionDef {
                id: "revised",
                books: &[BookDef { code: "core", title: "Vampire: The Masquerade" }],
            },
            EditionDef {
                id: "5th",
                books: &[BookDef { code: "core", title: "Vampire: The Masquerade 5th Edition" }],
            },
        ],
        keywords: &[
            strong("storyteller"),
            strong("vampire"),
            strong("world of darkness"),
            strong("blood potency"),
            weak("dice pool"),
            weak("willpower"),
            weak("clan"),
            weak("humanity"),
        ],
        jargon: &["masquerade", "camarilla", "sabbat", "gehenna", "antediluvian", "kindred"],
    },
    GameDef {
        system: GameSystem::SavageWorlds,
        editions: &[EditionDef {
            id: "swade",
            books: &[BookDef { code: "core", title: "Savage Worlds Adventure Edition" }],
        }],
        keywords: &[
            strong("savage worlds"),
            strong("bennies"),
            strong("wild card"),
            strong("wild die"),
            weak("shaken"),
            weak("raise"),
            weak("edges"),
            weak("hindrances"),
        ],
        jargon: &["bennies", "swade", "pinnacle"],
    },
    GameDef {
        system: GameSystem::GURPS,
        editions: &[EditionDef {
            id: "4th",
            books: &[
                BookDef { code: "basic", title: "GURPS Basic Set" },
            ],
        }],
        keywords: &[
            strong("gurps"),
            strong("generic universal"),
            strong("steve jackson games"),
            strong("character points"),
            weak("3d6"),
            weak("advantages"),
            weak("disadvantages"),
        ],
        jargon: &["gurps"],
    },
];

// ============================================================================
// Keyword vote
// ============================================================================

/// Outcome of the keyword vote across all systems.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub system: GameSystem,
    /// Normalized confidence in [0, 1].
    pub confidence: f32,
    /// Keywords that matched, in table order.
    pub matched: Vec<&'static str>,
}

/// Weighted keyword vote over the catalog. Deterministic: ties resolve in
/// table order. Needs roughly three strong hits for full confidence.
pub fn detect_system(text: &str) -> DetectionResult {
    let text_lower = text.to_lowercase();

    let mut best: Option<(GameSystem, f32, Vec<&'static str>)> = None;
    for game in GAME_TABLE {
        let mut score = 0.0_f32;
        let mut matched = Vec::new();
        for kw in game.keywords {
            if text_lower.contains(kw.term) {
                score += kw.weight;
                matched.push(kw.term);
            }
        }
        let better = match &best {
            Some((_, best_score, _)) => score > *best_score,
            None => score > 0.0,
        };
        if better {
            best = Some((game.system, score, matched));
        }
    }

    let (system, score, matched) = best.unwrap_or((GameSystem::Other, 0.0, Vec::new()));

    // Normalize against a three-strong-hit threshold.
    let confidence = (score / 3.0).min(1.0);
    DetectionResult {
        system: if confidence >= 0.1 { system } else { GameSystem::Other },
        confidence,
        matched,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_dnd() {
        let text = "The goblin has Armor Class 15. Roll a saving throw; the \
                    Dungeon Master may allow a proficiency bonus.";
        let result = detect_system(text);
        assert_eq!(result.system, GameSystem::DnD);
        assert!(result.confidence >= 0.5);
    }

    #[test]
    fn test_detect_coc() {
        let text = "The investigator must make a sanity check after seeing the \
                    mythos creature. The keeper describes the horror.";
        let result = detect_system(text);
        assert_eq!(result.system, GameSystem::CallOfCthulhu);
        assert!(result.confidence >= 0.5);
    }

    #[test]
    fn test_detect_nothing() {
        let result = detect_system("An entirely ordinary grocery list.");
        assert_eq!(result.system, GameSystem::Other);
        assert!(result.confidence < 0.1);
    }

    #[test]
    fn test_detect_deterministic() {
        let text = "armor class and hit dice and pathfinder";
        let a = detect_system(text);
        let b = detect_system(text);
        assert_eq!(a.system, b.system);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.matched, b.matched);
    }

    #[test]
    fn test_category_hints_known() {
        assert!(category_hints("Combat").contains(&"damage"));
        assert!(category_hints("Dialogue").contains(&"said"));
        assert!(category_hints("NoSuchCategory").is_empty());
    }
}
