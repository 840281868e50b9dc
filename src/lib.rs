//! Scrapes character and item pages from the Lodestone and keeps a local
//! SQLite copy of them.

pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod ids;
pub mod model;
pub mod parser;
pub mod reconcile;

pub use error::{ExtractError, FetchFailure, ScrapeError};
pub use reconcile::Reconciler;
