use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::api;
use crate::auth;
use crate::config;
use crate::controller;
use crate::data::{self, PersonService};
use crate::enrich;
use crate::session;
use crate::storage;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);

    let client = Arc::new(
        api::Client::new(api::ClientConfig {
            user_agent: cfg.api.user_agent.clone(),
            base_url: Some(cfg.api.base_url.clone()),
            http_client: None,
            rate_limit_backoff: None,
        })
        .context("create api client")?,
    );

    let flow = Arc::new(auth::Flow::new(
        client.clone(),
        store.clone(),
        cfg.auth.refresh_skew,
    ));
    let manager = Arc::new(session::Manager::new(store.clone(), flow));
    if let Err(err) = manager.load_existing() {
        warn!("failed to restore session: {err:#}");
    }

    let catalog = Arc::new(data::ApiCatalogService::new(client.clone()));
    let details = Arc::new(data::ApiDetailService::new(client.clone()));
    let people: Arc<dyn PersonService> =
        Arc::new(data::ApiPersonService::new(client.clone(), manager.clone()));

    let enricher = Arc::new(enrich::Enricher::new(
        details,
        cfg.enrich.workers,
        cfg.enrich.retries,
        cfg.enrich.retry_delay,
    ));

    let ctrl = controller::Controller::new(
        catalog,
        enricher,
        controller::Options {
            page_size: cfg.feed.page_size,
            debounce: cfg.feed.debounce,
            scroll_threshold: cfg.feed.scroll_threshold,
        },
    );

    let mut model = ui::Model::new(ctrl, manager.clone(), people);
    model.run()?;

    manager.close();

    Ok(())
}
