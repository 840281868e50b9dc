use reqwest::StatusCode;

use crate::model::EntityKind;

/// Why a page could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum FetchFailure {
    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Structural failures while reading fields out of a page.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no match for {0}")]
    Missing(&'static str),

    #[error("{what}: expected {expected} entries, found {found}")]
    Shape {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{what}: cannot read {value:?} as a number")]
    Number { what: &'static str, value: String },

    #[error("unrecognized gender symbol {0:?}")]
    UnknownGender(String),

    #[error("unrecognized job image parameter {0:?}")]
    UnknownJobImage(String),

    #[error("stat group {group}: expected {expected} values, found {found}")]
    StatShape {
        group: &'static str,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("failed to fetch {kind} {id}: {source}")]
    Fetch {
        kind: EntityKind,
        id: String,
        #[source]
        source: FetchFailure,
    },

    #[error("unable to parse {kind} {id}: {source}")]
    Parsing {
        kind: EntityKind,
        id: String,
        #[source]
        source: ExtractError,
    },

    #[error("character {character}: {source}")]
    ItemResolution {
        character: String,
        #[source]
        source: Box<ScrapeError>,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("item task did not complete: {0}")]
    ItemTask(#[from] tokio::task::JoinError),
}

impl ScrapeError {
    pub fn parsing(kind: EntityKind, id: &str, source: ExtractError) -> Self {
        ScrapeError::Parsing {
            kind,
            id: id.to_string(),
            source,
        }
    }

    /// The extraction failure behind a `Parsing` error, if that is what this is.
    pub fn extract_error(&self) -> Option<&ExtractError> {
        match self {
            ScrapeError::Parsing { source, .. } => Some(source),
            ScrapeError::ItemResolution { source, .. } => source.extract_error(),
            _ => None,
        }
    }
}
