use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::warn;

use super::tables::ExtractorConfig;
use super::{first_text, parse_num, selector, texts, title_head};
use crate::error::ExtractError;
use crate::model::{ItemFields, MainStats};

type Result<T> = std::result::Result<T, ExtractError>;

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static HEADER: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"div[class="clearfix item_name_area"] > div[class="box left"]"#)
});
static ITEM_LEVEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class="eorzeadb_tooltip_pt3 eorzeadb_tooltip_pb3"]"#));
static MAIN_STATS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class="clearfix sys_nq_element"] > div > strong"#));
static BONUSES: LazyLock<Selector> = LazyLock::new(|| selector(r#"ul[class="basic_bonus"] > li"#));

const DB_PREFIX: &str = "Eorzea Database:";
const ITEM_LEVEL_PREFIX: &str = "Item Level ";
const SHIELD: &str = "Shield";

pub fn extract(markup: &str, config: &ExtractorConfig) -> Result<ItemFields> {
    let doc = Html::parse_document(markup);

    let name = title_head(&doc, &TITLE)?.replace(DB_PREFIX, "").trim().to_string();

    let header = texts(&doc, &HEADER);
    let item_type = header.get(2).cloned().ok_or(ExtractError::Shape {
        what: "item header",
        expected: 3,
        found: header.len(),
    })?;

    let ilvl = first_text(&doc, &ITEM_LEVEL, "item level")?;
    let item_level = parse_num("item level", &ilvl.replace(ITEM_LEVEL_PREFIX, ""))?;

    let main = main_stats(&item_type, &texts(&doc, &MAIN_STATS))?;
    let bonuses = bonuses(&texts(&doc, &BONUSES), config)?;

    Ok(ItemFields {
        name,
        item_type,
        item_level,
        main,
        bonuses,
    })
}

/// | entries | item type | result                        |
/// |---------|-----------|-------------------------------|
/// | 0       | any       | none                          |
/// | 2       | Shield    | block strength, block rate    |
/// | 2       | other     | defense, magic defense        |
/// | 3       | any       | damage, auto-attack, delay    |
/// | other   | any       | error                         |
///
/// A triple cannot be read from 1 or 4+ entries, so those are shape errors.
fn main_stats(item_type: &str, values: &[String]) -> Result<MainStats> {
    match (values, item_type == SHIELD) {
        ([], _) => Ok(MainStats::None),
        ([strength, rate], true) => Ok(MainStats::Block {
            strength: parse_num("block strength", strength)?,
            rate: parse_num("block rate", rate)?,
        }),
        ([defense, magic_defense], false) => Ok(MainStats::Defense {
            defense: parse_num("defense", defense)?,
            magic_defense: parse_num("magic defense", magic_defense)?,
        }),
        ([damage, auto_attack, delay], _) => Ok(MainStats::Weapon {
            damage: parse_num("damage", damage)?,
            auto_attack: parse_num("auto-attack", auto_attack)?,
            delay: parse_num("delay", delay)?,
        }),
        (other, _) => Err(ExtractError::Shape {
            what: "main stats",
            expected: 3,
            found: other.len(),
        }),
    }
}

/// Lines look like "Spell Speed +12". Labels missing from the table are skipped.
fn bonuses(lines: &[String], config: &ExtractorConfig) -> Result<BTreeMap<String, i64>> {
    let mut out = BTreeMap::new();
    for line in lines {
        let (label, value) = line
            .split_once('+')
            .ok_or(ExtractError::Missing("bonus value"))?;
        let label = label.trim();
        let value: i64 = parse_num("bonus value", value)?;
        match config.bonus_field(label) {
            Some(field) => {
                out.insert(field.to_string(), value);
            }
            None => warn!("Unable to match bonus stat {:?}", label),
        }
    }
    Ok(out)
}
