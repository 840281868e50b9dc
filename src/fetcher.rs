use std::sync::Arc;

use reqwest::StatusCode;
use tracing::debug;

use crate::config::Settings;
use crate::error::{FetchFailure, ScrapeError};
use crate::model::EntityKind;

/// Single-attempt page fetcher. Anything but a 200 is an error; there are no retries.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    character_url: Arc<str>,
    item_url: Arc<str>,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            character_url: settings.character_url.as_str().into(),
            item_url: settings.item_url.as_str().into(),
        })
    }

    pub fn url(&self, kind: EntityKind, id: &str) -> String {
        let template = match kind {
            EntityKind::Character => &self.character_url,
            EntityKind::Item => &self.item_url,
        };
        template.replace("{id}", id)
    }

    pub async fn fetch(&self, kind: EntityKind, id: &str) -> Result<String, ScrapeError> {
        let url = self.url(kind, id);
        debug!("Fetching {} {} from {}", kind, id, url);

        let fail = |source: FetchFailure| ScrapeError::Fetch {
            kind,
            id: id.to_string(),
            source,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fail(e.into()))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(fail(FetchFailure::Status(status)));
        }
        response.text().await.map_err(|e| fail(e.into()))
    }
}
