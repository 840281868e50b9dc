pub mod character;
pub mod item;
pub mod tables;

use std::str::FromStr;

use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;
use crate::model::{CharacterFields, ItemFields};
pub use character::CharacterPage;
pub use tables::ExtractorConfig;

type Result<T> = std::result::Result<T, ExtractError>;

/// Turns fetched markup into plain field bags. Never touches the store.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Parse a character page once; field groups are read from it on demand.
    pub fn character_page(&self, markup: &str) -> CharacterPage<'_> {
        CharacterPage::parse(markup, &self.config)
    }

    pub fn extract_character(&self, markup: &str) -> Result<CharacterFields> {
        self.character_page(markup).fields()
    }

    pub fn extract_item(&self, markup: &str) -> Result<ItemFields> {
        item::extract(markup, &self.config)
    }
}

// ── Query helpers shared by both page kinds ──

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Direct text children of an element, trimmed, blank nodes skipped.
fn own_text<'a>(el: ElementRef<'a>) -> impl Iterator<Item = &'a str> + 'a {
    el.children()
        .filter_map(|n| n.value().as_text())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
}

/// Own text of every element matching `sel`, flattened in document order.
pub(crate) fn texts(doc: &Html, sel: &Selector) -> Vec<String> {
    doc.select(sel)
        .flat_map(own_text)
        .map(str::to_string)
        .collect()
}

pub(crate) fn first_text(doc: &Html, sel: &Selector, what: &'static str) -> Result<String> {
    doc.select(sel)
        .flat_map(own_text)
        .next()
        .map(str::to_string)
        .ok_or(ExtractError::Missing(what))
}

pub(crate) fn first_attr(
    doc: &Html,
    sel: &Selector,
    attr: &str,
    what: &'static str,
) -> Result<String> {
    doc.select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
        .ok_or(ExtractError::Missing(what))
}

/// Page title up to the first `|`.
pub(crate) fn title_head(doc: &Html, sel: &Selector) -> Result<String> {
    let title = first_text(doc, sel, "page title")?;
    Ok(title.split('|').next().unwrap_or_default().trim().to_string())
}

/// `index`-th `/`-separated segment of a link target.
pub(crate) fn path_segment(href: &str, index: usize, what: &'static str) -> Result<String> {
    href.split('/')
        .nth(index)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ExtractError::Missing(what))
}

pub(crate) fn parse_num<T: FromStr>(what: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| ExtractError::Number {
        what,
        value: value.to_string(),
    })
}

/// Check a positional group has exactly `N` entries, then coerce each one.
pub(crate) fn fixed_group<const N: usize>(
    values: &[String],
    what: &'static str,
) -> Result<[i64; N]> {
    if values.len() != N {
        return Err(ExtractError::StatShape {
            group: what,
            expected: N,
            found: values.len(),
        });
    }
    let parsed = values
        .iter()
        .map(|v| parse_num::<i64>(what, v))
        .collect::<Result<Vec<_>>>()?;
    parsed.try_into().map_err(|v: Vec<i64>| ExtractError::StatShape {
        group: what,
        expected: N,
        found: v.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_text_skips_children_and_blanks() {
        let doc = Html::parse_document(
            r#"<div class="box"> <span>skip</span> Equipment <br> Arms <br>  </div>"#,
        );
        assert_eq!(texts(&doc, &selector("div.box")), vec!["Equipment", "Arms"]);
    }

    #[test]
    fn path_segments() {
        let href = "/lodestone/playguide/db/item/d19447e548d/";
        assert_eq!(path_segment(href, 5, "id").unwrap(), "d19447e548d");
        assert!(matches!(
            path_segment(href, 6, "id"),
            Err(ExtractError::Missing("id"))
        ));
    }

    #[test]
    fn fixed_group_rejects_wrong_count() {
        let values: Vec<String> = vec!["1".into(), "2".into(), "3".into()];
        let err = fixed_group::<6>(&values, "attributes").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::StatShape { group: "attributes", expected: 6, found: 3 }
        ));
        assert_eq!(fixed_group::<3>(&values, "resource").unwrap(), [1, 2, 3]);
    }

    #[test]
    fn fixed_group_rejects_non_numbers() {
        let values: Vec<String> = vec!["1".into(), "lots".into()];
        assert!(matches!(
            fixed_group::<2>(&values, "resource"),
            Err(ExtractError::Number { .. })
        ));
    }
}
