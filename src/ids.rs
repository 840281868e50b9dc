use std::sync::LazyLock;

use regex::Regex;

static CHARACTER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").unwrap());
static ITEM_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Character ids are the numeric segment of the character page URL.
pub fn parse_character_id(s: &str) -> Result<String, String> {
    if CHARACTER_ID.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(format!("{s:?} is not a numeric character id"))
    }
}

/// Item ids are the alphanumeric segment of the item database URL.
pub fn parse_item_id(s: &str) -> Result<String, String> {
    if ITEM_ID.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(format!("{s:?} is not an alphanumeric item id"))
    }
}
