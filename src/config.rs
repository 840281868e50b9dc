use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::ExtractorConfig;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; lodestone-scraper/0.1; +https://github.com/lodestone-scraper)";
const CHARACTER_URL: &str = "http://na.finalfantasyxiv.com/lodestone/character/{id}/";
const ITEM_URL: &str = "http://na.finalfantasyxiv.com/lodestone/playguide/db/item/{id}/";
const DB_PATH: &str = "data/lodestone.sqlite";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub user_agent: String,
    /// URL templates; `{id}` is replaced with the external id.
    pub character_url: String,
    pub item_url: String,
    /// Max concurrent item fetches per character. Unbounded when unset.
    #[serde(default)]
    pub item_concurrency: Option<usize>,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from(DB_PATH),
            user_agent: USER_AGENT.to_string(),
            character_url: CHARACTER_URL.to_string(),
            item_url: ITEM_URL.to_string(),
            item_concurrency: None,
            extractor: ExtractorConfig::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `lodestone.toml` if present, then `LODESTONE_*` env vars.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("db_path", DB_PATH)?
            .set_default("user_agent", USER_AGENT)?
            .set_default("character_url", CHARACTER_URL)?
            .set_default("item_url", ITEM_URL)?
            .add_source(File::with_name("lodestone").required(false))
            .add_source(Environment::with_prefix("LODESTONE"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert!(s.character_url.contains("{id}"));
        assert!(s.item_url.contains("/playguide/db/item/{id}/"));
        assert_eq!(s.item_concurrency, None);
        assert_eq!(s.extractor.classes.len(), 23);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let s = Settings::load().unwrap();
        assert_eq!(s.character_url, CHARACTER_URL);
        assert_eq!(s.extractor.job_images.len(), 33);
    }
}
