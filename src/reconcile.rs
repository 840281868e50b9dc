use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::Settings;
use crate::db::Store;
use crate::error::ScrapeError;
use crate::fetcher::Fetcher;
use crate::model::{Character, EntityKind, Item, ItemFields};
use crate::parser::Extractor;

/// Fetch → extract → upsert pipelines for characters and items.
pub struct Reconciler {
    fetcher: Fetcher,
    extractor: Arc<Extractor>,
    store: Store,
    item_limit: Arc<Semaphore>,
}

impl Reconciler {
    /// `item_concurrency` bounds how many item fetches one character may run at once.
    /// Zero or `None` leaves them unbounded; larger values are capped at the
    /// semaphore's maximum.
    pub fn new(
        fetcher: Fetcher,
        extractor: Extractor,
        store: Store,
        item_concurrency: Option<usize>,
    ) -> Self {
        let permits = item_concurrency
            .filter(|n| *n > 0)
            .map_or(Semaphore::MAX_PERMITS, |n| n.min(Semaphore::MAX_PERMITS));
        Self {
            fetcher,
            extractor: Arc::new(extractor),
            store,
            item_limit: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn from_settings(settings: &Settings, store: Store) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            Fetcher::new(settings)?,
            Extractor::new(settings.extractor.clone()),
            store,
            settings.item_concurrency,
        ))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Scrape a character page and persist it.
    ///
    /// Saves happen in phases: profile, class levels, job stats, then the job's
    /// item set. A failure in a later phase leaves the earlier ones persisted.
    /// Any item that fails to resolve fails the whole call, with the items
    /// attached so far left in place.
    pub async fn reconcile_character(&self, id: &str) -> Result<Character, ScrapeError> {
        debug!("Attempting to parse character id {}", id);
        let markup = self.fetcher.fetch(EntityKind::Character, id).await?;
        let parse_err = |e| ScrapeError::parsing(EntityKind::Character, id, e);

        // The parsed document is not Send; keep it out of the await below.
        let (character, job_id, item_ids) = {
            let page = self.extractor.character_page(&markup);

            let profile = page.profile().map_err(parse_err)?;
            let character_id = self.store.save_character(id, &profile)?;

            let levels = page.levels().map_err(parse_err)?;
            self.store.save_levels(character_id, &levels)?;

            let job = page.job().map_err(parse_err)?;
            let job_id = self.store.save_job(character_id, &job)?;
            debug!("Character {} has {} equipped", id, job.job);

            let item_ids = page.item_ids().map_err(parse_err)?;
            let character = Character {
                id: character_id,
                lodestone_id: id.to_string(),
                profile,
                levels,
            };
            (character, job_id, item_ids)
        };

        self.store.clear_job_items(job_id)?;
        let items = self
            .resolve_items(job_id, &item_ids)
            .await
            .map_err(|e| ScrapeError::ItemResolution {
                character: id.to_string(),
                source: Box::new(e),
            })?;

        info!(
            "Reconciled character {} ({}) with {} items",
            id,
            character.profile.name,
            items.len()
        );
        Ok(character)
    }

    /// Scrape an item page and persist it.
    pub async fn reconcile_item(&self, id: &str) -> Result<Item, ScrapeError> {
        let fields = scrape_item(&self.fetcher, &self.extractor, id).await?;
        let item = self.store.save_item(id, &fields)?;
        info!("Reconciled item {} ({})", id, item.fields.name);
        Ok(item)
    }

    /// Attach `ids` to the job, scraping the items the store does not know yet.
    ///
    /// Known items are attached as they are looked up. Each distinct unknown id
    /// gets its own task, and its item is saved and attached as soon as that
    /// task finishes. Tasks only fetch and extract; every write happens here.
    /// The first failure is returned and the remaining tasks are aborted when
    /// the set is dropped.
    ///
    /// The returned order is unspecified.
    pub async fn resolve_items(
        &self,
        job_id: i64,
        ids: &[String],
    ) -> Result<Vec<Item>, ScrapeError> {
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(ids.len());
        let mut tasks = JoinSet::new();

        for id in ids.iter().filter(|id| seen.insert(id.as_str())) {
            match self.store.find_item(id)? {
                Some(item) => {
                    self.store.attach_job_item(job_id, item.id)?;
                    items.push(item);
                }
                None => {
                    let fetcher = self.fetcher.clone();
                    let extractor = Arc::clone(&self.extractor);
                    let limit = Arc::clone(&self.item_limit);
                    let id = id.clone();
                    tasks.spawn(async move {
                        // Held until the task ends; the semaphore is never closed.
                        let _permit = limit.acquire().await;
                        let fields = scrape_item(&fetcher, &extractor, &id).await?;
                        Ok::<_, ScrapeError>((id, fields))
                    });
                }
            }
        }

        debug!(
            "Resolving items: {} known, {} to fetch",
            items.len(),
            tasks.len()
        );

        while let Some(joined) = tasks.join_next().await {
            let (id, fields) = joined??;
            let item = self.store.save_item(&id, &fields)?;
            info!("Reconciled item {} ({})", id, item.fields.name);
            self.store.attach_job_item(job_id, item.id)?;
            items.push(item);
        }
        Ok(items)
    }
}

async fn scrape_item(
    fetcher: &Fetcher,
    extractor: &Extractor,
    id: &str,
) -> Result<ItemFields, ScrapeError> {
    debug!("Attempting to parse item id {}", id);
    let markup = fetcher.fetch(EntityKind::Item, id).await?;
    extractor
        .extract_item(&markup)
        .map_err(|e| ScrapeError::parsing(EntityKind::Item, id, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractError, FetchFailure};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MINA: &str = "8774791";
    const ITEMS: [&str; 3] = ["d19447e548d", "a7e5c4f1b92", "3b2cc9df7a1"];

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{name}.html")).unwrap()
    }

    fn character_path(id: &str) -> String {
        format!("/lodestone/character/{id}/")
    }

    fn item_path(id: &str) -> String {
        format!("/lodestone/playguide/db/item/{id}/")
    }

    async fn setup(item_concurrency: Option<usize>) -> (MockServer, Reconciler) {
        let server = MockServer::start().await;
        let settings = Settings {
            character_url: format!("{}/lodestone/character/{{id}}/", server.uri()),
            item_url: format!("{}/lodestone/playguide/db/item/{{id}}/", server.uri()),
            item_concurrency,
            ..Settings::default()
        };
        let store = Store::open_in_memory().unwrap();
        let reconciler = Reconciler::from_settings(&settings, store).unwrap();
        (server, reconciler)
    }

    async fn mount_page(server: &MockServer, at: String, body: String, times: u64) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(times)
            .mount(server)
            .await;
    }

    fn stored_ring() -> ItemFields {
        Extractor::default()
            .extract_item(&fixture("item_3b2cc9df7a1"))
            .unwrap()
    }

    fn stored_job(store: &Store) -> (i64, i64) {
        let markup = fixture("character_8774791");
        let extractor = Extractor::default();
        let page = extractor.character_page(&markup);
        let character_id = store.save_character(MINA, &page.profile().unwrap()).unwrap();
        let job_id = store.save_job(character_id, &page.job().unwrap()).unwrap();
        (character_id, job_id)
    }

    async fn mount_items(server: &MockServer, ids: &[&str], times: u64) {
        for id in ids {
            mount_page(server, item_path(id), fixture(&format!("item_{id}")), times).await;
        }
    }

    #[tokio::test]
    async fn character_end_to_end() {
        let (server, r) = setup(None).await;
        mount_page(&server, character_path(MINA), fixture("character_8774791"), 1).await;
        mount_items(&server, &ITEMS, 1).await;

        let c = r.reconcile_character(MINA).await.unwrap();
        assert_eq!(c.profile.free_company_name, "Zanarkand");
        assert_eq!(c.level("fisher"), Some(0));

        let stored = r.store().load_character(MINA).unwrap().unwrap();
        assert_eq!(stored, c);

        let jobs = r.store().load_jobs(c.id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job, "White Mage");
        assert_eq!(jobs[0].stats.hp, 3825);
        let mut expected: Vec<String> = ITEMS.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(jobs[0].items, expected);

        let thyrus = r.store().find_item("d19447e548d").unwrap().unwrap();
        assert_eq!(thyrus.fields.name, "Thyrus Zenith");
        assert_eq!(thyrus.fields.item_level, 90);
    }

    #[tokio::test]
    async fn repeat_scrape_converges() {
        let (server, r) = setup(None).await;
        mount_page(&server, character_path(MINA), fixture("character_8774791"), 2).await;
        // Second pass finds every item in the store.
        mount_items(&server, &ITEMS, 1).await;

        let first = r.reconcile_character(MINA).await.unwrap();
        let second = r.reconcile_character(MINA).await.unwrap();
        assert_eq!(first, second);

        let stats = r.store().get_stats().unwrap();
        assert_eq!(stats.characters, 1);
        assert_eq!(stats.jobs, 1);
        assert_eq!(stats.items, 3);
        assert_eq!(stats.job_items, 3);
    }

    #[tokio::test]
    async fn only_unknown_items_are_fetched() {
        let (server, r) = setup(None).await;
        mount_page(&server, character_path(MINA), fixture("character_8774791"), 1).await;
        mount_items(&server, &ITEMS[..1], 1).await;
        mount_items(&server, &ITEMS[1..], 0).await;

        let extractor = Extractor::default();
        for id in &ITEMS[1..] {
            let fields = extractor
                .extract_item(&fixture(&format!("item_{id}")))
                .unwrap();
            r.store().save_item(id, &fields).unwrap();
        }

        let c = r.reconcile_character(MINA).await.unwrap();
        let jobs = r.store().load_jobs(c.id).unwrap();
        assert_eq!(jobs[0].items.len(), 3);
    }

    #[tokio::test]
    async fn bounded_fan_out_resolves_everything() {
        let (server, r) = setup(Some(1)).await;
        mount_page(&server, character_path(MINA), fixture("character_8774791"), 1).await;
        mount_items(&server, &ITEMS, 1).await;

        let c = r.reconcile_character(MINA).await.unwrap();
        assert_eq!(r.store().load_jobs(c.id).unwrap()[0].items.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_item_ids_fetch_once() {
        let (server, r) = setup(None).await;
        mount_items(&server, &ITEMS[..1], 1).await;
        let (character_id, job_id) = stored_job(r.store());

        let ids = vec!["d19447e548d".to_string(), "d19447e548d".to_string()];
        let items = r.resolve_items(job_id, &ids).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            r.store().load_jobs(character_id).unwrap()[0].items,
            vec!["d19447e548d"]
        );
    }

    #[tokio::test]
    async fn rescrape_drops_unequipped_items() {
        let (server, r) = setup(None).await;
        mount_page(&server, character_path(MINA), fixture("character_8774791"), 2).await;
        mount_items(&server, &ITEMS, 1).await;

        let c = r.reconcile_character(MINA).await.unwrap();
        let job_id = r.store().load_jobs(c.id).unwrap()[0].id;
        let extra = r.store().save_item("ffffffffff", &stored_ring()).unwrap();
        r.store().attach_job_item(job_id, extra.id).unwrap();
        assert_eq!(r.store().load_jobs(c.id).unwrap()[0].items.len(), 4);

        r.reconcile_character(MINA).await.unwrap();
        let items = &r.store().load_jobs(c.id).unwrap()[0].items;
        assert_eq!(items.len(), 3);
        assert!(!items.contains(&"ffffffffff".to_string()));
    }

    #[tokio::test]
    async fn oversized_item_concurrency_is_capped() {
        let (server, r) = setup(Some(usize::MAX)).await;
        assert_eq!(r.item_limit.available_permits(), Semaphore::MAX_PERMITS);

        mount_page(&server, character_path(MINA), fixture("character_8774791"), 1).await;
        mount_items(&server, &ITEMS, 1).await;
        let c = r.reconcile_character(MINA).await.unwrap();
        assert_eq!(r.store().load_jobs(c.id).unwrap()[0].items.len(), 3);
    }

    #[tokio::test]
    async fn failed_item_fails_character() {
        let (server, r) = setup(None).await;
        mount_page(&server, character_path(MINA), fixture("character_8774791"), 1).await;
        mount_items(&server, &ITEMS[..2], 0).await;
        Mock::given(method("GET"))
            .and(path(item_path(ITEMS[2])))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let extractor = Extractor::default();
        for id in &ITEMS[..2] {
            let fields = extractor
                .extract_item(&fixture(&format!("item_{id}")))
                .unwrap();
            r.store().save_item(id, &fields).unwrap();
        }

        let err = r.reconcile_character(MINA).await.unwrap_err();
        assert!(err.to_string().contains(MINA));
        match err {
            ScrapeError::ItemResolution { character, source } => {
                assert_eq!(character, MINA);
                match *source {
                    ScrapeError::Fetch { kind, id, source: FetchFailure::Status(_) } => {
                        assert_eq!(kind, EntityKind::Item);
                        assert_eq!(id, ITEMS[2]);
                    }
                    other => panic!("unexpected item error: {other}"),
                }
            }
            other => panic!("unexpected error: {other}"),
        }

        // Earlier phases stay saved and the known items are already attached.
        let c = r.store().load_character(MINA).unwrap().unwrap();
        let jobs = r.store().load_jobs(c.id).unwrap();
        assert_eq!(jobs.len(), 1);
        let mut expected: Vec<String> = ITEMS[..2].iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(jobs[0].items, expected);
    }

    #[tokio::test]
    async fn stat_shape_error_keeps_old_job_stats() {
        let (server, r) = setup(None).await;
        let good = fixture("character_8774791");
        let bad = good.replace("<li><span>341</span></li>", "");

        Mock::given(method("GET"))
            .and(path(character_path(MINA)))
            .respond_with(ResponseTemplate::new(200).set_body_string(good))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_items(&server, &ITEMS, 1).await;
        let c = r.reconcile_character(MINA).await.unwrap();

        server.reset().await;
        mount_page(&server, character_path(MINA), bad.replace("Zanarkand", "Besaid"), 1).await;

        let err = r.reconcile_character(MINA).await.unwrap_err();
        assert!(matches!(
            err.extract_error(),
            Some(ExtractError::StatShape { group: "attributes", expected: 6, found: 5 })
        ));

        // Profile phase ran; job stats were left as they were.
        let stored = r.store().load_character(MINA).unwrap().unwrap();
        assert_eq!(stored.profile.free_company_name, "Besaid");
        let jobs = r.store().load_jobs(c.id).unwrap();
        assert_eq!(jobs[0].stats.vitality, 341);
        assert_eq!(jobs[0].stats.hp, 3825);
        assert_eq!(jobs[0].items.len(), 3);
    }

    #[tokio::test]
    async fn unknown_job_icon_is_parsing_error() {
        let (server, r) = setup(None).await;
        let html = fixture("character_8774791").replace("?8ff6ddcf38", "?0000000000");
        mount_page(&server, character_path(MINA), html, 1).await;

        let err = r.reconcile_character(MINA).await.unwrap_err();
        match &err {
            ScrapeError::Parsing { kind, id, source } => {
                assert_eq!(*kind, EntityKind::Character);
                assert_eq!(id, MINA);
                assert!(matches!(source, ExtractError::UnknownJobImage(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(r.store().get_stats().unwrap().jobs, 0);
    }

    #[tokio::test]
    async fn missing_character_stores_nothing() {
        let (server, r) = setup(None).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = r.reconcile_character("1").await.unwrap_err();
        assert!(matches!(err, ScrapeError::Fetch { kind: EntityKind::Character, .. }));
        assert_eq!(r.store().get_stats().unwrap().characters, 0);
    }

    #[tokio::test]
    async fn item_end_to_end() {
        let (server, r) = setup(None).await;
        mount_items(&server, &ITEMS[..1], 1).await;

        let item = r.reconcile_item("d19447e548d").await.unwrap();
        assert_eq!(item.fields.name, "Thyrus Zenith");
        assert_eq!(item.fields.item_level, 90);
        assert_eq!(r.store().find_item("d19447e548d").unwrap(), Some(item));
    }

    #[tokio::test]
    async fn garbage_item_page_is_parsing_error() {
        let (server, r) = setup(None).await;
        mount_page(&server, item_path("zzz"), "<html><body>maintenance</body></html>".into(), 1).await;

        let err = r.reconcile_item("zzz").await.unwrap_err();
        assert!(matches!(err, ScrapeError::Parsing { kind: EntityKind::Item, .. }));
        assert!(r.store().find_item("zzz").unwrap().is_none());
    }
}
