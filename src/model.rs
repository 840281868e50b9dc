use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Item,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Character => f.write_str("character"),
            EntityKind::Item => f.write_str("item"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    pub fn from_db(s: &str) -> Option<Gender> {
        match s {
            "Male" => Some(Gender::Male),
            "Female" => Some(Gender::Female),
            _ => None,
        }
    }
}

// ── Extracted field bags ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub name: String,
    pub free_company_name: String,
    pub free_company_id: String,
    pub server: String,
    pub city_state: String,
    pub grand_company_name: String,
    pub grand_company_rank: String,
    pub species: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassLevel {
    pub class: String,
    /// 0 means not leveled.
    pub level: u32,
}

/// Stats shown for the job the character currently has equipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub hp: i64,
    pub mp: i64,
    pub tp: i64,

    pub strength: i64,
    pub dexterity: i64,
    pub vitality: i64,
    pub intelligence: i64,
    pub mind: i64,
    pub piety: i64,

    pub fire: i64,
    pub ice: i64,
    pub wind: i64,
    pub earth: i64,
    pub lightning: i64,
    pub water: i64,

    pub accuracy: i64,
    pub crit_rate: i64,
    pub determination: i64,
    pub defense: i64,
    pub parry: i64,
    pub magic_defense: i64,
    pub attack_power: i64,
    pub skill_speed: i64,
    pub attack_magic_potency: i64,
    pub healing_magic_potency: i64,
    pub spell_speed: i64,
    pub slow_resist: i64,
    pub silence_resist: i64,
    pub blind_resist: i64,
    pub poison_resist: i64,
    pub stun_resist: i64,
    pub sleep_resist: i64,
    pub bind_resist: i64,
    pub heavy_resist: i64,
    pub slashing_resist: i64,
    pub piercing_resist: i64,
    pub blunt_resist: i64,
}

pub const JOB_STAT_COUNT: usize = 37;

impl JobStats {
    /// Column names, in the same order as `to_row`.
    pub const COLUMNS: [&'static str; JOB_STAT_COUNT] = [
        "hp",
        "mp",
        "tp",
        "strength",
        "dexterity",
        "vitality",
        "intelligence",
        "mind",
        "piety",
        "fire",
        "ice",
        "wind",
        "earth",
        "lightning",
        "water",
        "accuracy",
        "crit_rate",
        "determination",
        "defense",
        "parry",
        "magic_defense",
        "attack_power",
        "skill_speed",
        "attack_magic_potency",
        "healing_magic_potency",
        "spell_speed",
        "slow_resist",
        "silence_resist",
        "blind_resist",
        "poison_resist",
        "stun_resist",
        "sleep_resist",
        "bind_resist",
        "heavy_resist",
        "slashing_resist",
        "piercing_resist",
        "blunt_resist",
    ];

    pub fn to_row(&self) -> [i64; JOB_STAT_COUNT] {
        [
            self.hp,
            self.mp,
            self.tp,
            self.strength,
            self.dexterity,
            self.vitality,
            self.intelligence,
            self.mind,
            self.piety,
            self.fire,
            self.ice,
            self.wind,
            self.earth,
            self.lightning,
            self.water,
            self.accuracy,
            self.crit_rate,
            self.determination,
            self.defense,
            self.parry,
            self.magic_defense,
            self.attack_power,
            self.skill_speed,
            self.attack_magic_potency,
            self.healing_magic_potency,
            self.spell_speed,
            self.slow_resist,
            self.silence_resist,
            self.blind_resist,
            self.poison_resist,
            self.stun_resist,
            self.sleep_resist,
            self.bind_resist,
            self.heavy_resist,
            self.slashing_resist,
            self.piercing_resist,
            self.blunt_resist,
        ]
    }

    pub fn from_row(row: [i64; JOB_STAT_COUNT]) -> Self {
        let [hp, mp, tp, strength, dexterity, vitality, intelligence, mind, piety, fire, ice, wind, earth, lightning, water, accuracy, crit_rate, determination, defense, parry, magic_defense, attack_power, skill_speed, attack_magic_potency, healing_magic_potency, spell_speed, slow_resist, silence_resist, blind_resist, poison_resist, stun_resist, sleep_resist, bind_resist, heavy_resist, slashing_resist, piercing_resist, blunt_resist] =
            row;
        JobStats {
            hp,
            mp,
            tp,
            strength,
            dexterity,
            vitality,
            intelligence,
            mind,
            piety,
            fire,
            ice,
            wind,
            earth,
            lightning,
            water,
            accuracy,
            crit_rate,
            determination,
            defense,
            parry,
            magic_defense,
            attack_power,
            skill_speed,
            attack_magic_potency,
            healing_magic_potency,
            spell_speed,
            slow_resist,
            silence_resist,
            blind_resist,
            poison_resist,
            stun_resist,
            sleep_resist,
            bind_resist,
            heavy_resist,
            slashing_resist,
            piercing_resist,
            blunt_resist,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFields {
    pub job: String,
    pub stats: JobStats,
}

/// Everything read from one character page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterFields {
    pub profile: Profile,
    pub levels: Vec<ClassLevel>,
    pub job: JobFields,
    pub item_ids: Vec<String>,
}

/// Type-dependent combat block of an item. The variants are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MainStats {
    None,
    Block { strength: i64, rate: i64 },
    Defense { defense: i64, magic_defense: i64 },
    Weapon { damage: i64, auto_attack: f64, delay: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFields {
    pub name: String,
    pub item_type: String,
    pub item_level: u32,
    pub main: MainStats,
    /// Keyed by bonus field name (`vitality`, `spell_speed`, ...).
    pub bonuses: BTreeMap<String, i64>,
}

// ── Persisted records ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Character {
    pub id: i64,
    pub lodestone_id: String,
    #[serde(flatten)]
    pub profile: Profile,
    pub levels: Vec<ClassLevel>,
}

impl Character {
    pub fn level(&self, class: &str) -> Option<u32> {
        self.levels.iter().find(|l| l.class == class).map(|l| l.level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub character_id: i64,
    pub job: String,
    #[serde(flatten)]
    pub stats: JobStats,
    /// External ids of the attached items, sorted.
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: i64,
    pub lodestone_id: String,
    #[serde(flatten)]
    pub fields: ItemFields,
}

impl Item {
    pub fn bonus(&self, stat: &str) -> Option<i64> {
        self.fields.bonuses.get(stat).copied()
    }
}
