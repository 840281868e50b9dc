use std::collections::HashMap;

use serde::Deserialize;

/// Classes in the order the profile's level table lists them.
const CLASSES: &[&str] = &[
    "gladiator",
    "pugilist",
    "marauder",
    "lancer",
    "archer",
    "rogue",
    "conjurer",
    "thaumaturge",
    "arcanist",
    "darkknight",
    "machinist",
    "astrologian",
    "carpenter",
    "blacksmith",
    "armorer",
    "goldsmith",
    "leatherworker",
    "weaver",
    "alchemist",
    "culinarian",
    "miner",
    "botanist",
    "fisher",
];

/// Query-string parameter of the current-job icon → job name.
const JOB_IMAGES: &[(&str, &str)] = &[
    ("f92b36491a", "Gladiator"),
    ("d60063fd31", "Pugilist"),
    ("fe903ec196", "Marauder"),
    ("f7407edad1", "Lancer"),
    ("55429fa01b", "Archer"),
    ("ae412534db", "Rogue"),
    ("5d8434ad2b", "Conjurer"),
    ("7daef429c3", "Thaumaturge"),
    ("1bbf756c00", "Arcanist"),
    ("f4c17b587a", "Paladin"),
    ("844a2b0ce4", "Monk"),
    ("7ee7fa010d", "Warrior"),
    ("184d97e1a8", "Dragoon"),
    ("51a547788c", "Bard"),
    ("afb87b393d", "Ninja"),
    ("8ff6ddcf38", "White Mage"),
    ("cb0039f44e", "Black Mage"),
    ("25f6d47b24", "Scholar"),
    ("b1768159dc", "Summoner"),
    ("8b88c65b1c", "Dark Knight"),
    ("6333f935f1", "Machinist"),
    ("c702483f1a", "Astrologian"),
    ("6a7ac0ba61", "Carpenter"),
    ("fe94f88800", "Blacksmith"),
    ("8818669c6a", "Armorer"),
    ("e20702bf8e", "Goldsmith"),
    ("9b63f9b99d", "Leatherworker"),
    ("410f8051a1", "Weaver"),
    ("ac38ecf12a", "Alchemist"),
    ("2b40c188f1", "Culinarian"),
    ("7f874e656a", "Miner"),
    ("3c098b7204", "Botanist"),
    ("8601d22638", "Fisher"),
];

/// Bonus line label → item bonus field.
const BONUS_STATS: &[(&str, &str)] = &[
    ("Vitality", "vitality"),
    ("Mind", "mind"),
    ("Determination", "determination"),
    ("Spell Speed", "spell_speed"),
    ("Accuracy", "accuracy"),
    ("Critical Hit Rate", "critical_hit_rate"),
    ("Piety", "piety"),
    ("Strength", "strength"),
    ("Dexterity", "dexterity"),
    ("Intelligence", "intelligence"),
    ("Skill Speed", "skill_speed"),
    ("Parry", "parry"),
];

/// Lookup tables the extractor reads the page schema through.
///
/// Every field can be overridden from the `[extractor]` section of the
/// settings file, so a new class or job icon is a data change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub classes: Vec<String>,
    pub job_images: HashMap<String, String>,
    pub bonus_stats: HashMap<String, String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            classes: CLASSES.iter().map(|c| c.to_string()).collect(),
            job_images: JOB_IMAGES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            bonus_stats: BONUS_STATS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl ExtractorConfig {
    pub fn job_for_image(&self, param: &str) -> Option<&str> {
        self.job_images.get(param).map(String::as_str)
    }

    // Labels are compared case-insensitively; config sources may fold case.
    pub fn bonus_field(&self, label: &str) -> Option<&str> {
        self.bonus_stats
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }
}
