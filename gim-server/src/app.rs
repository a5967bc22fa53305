use anyhow::Result;
use sqlx::MySqlPool;
use tracing::info;

use gim_storage::MariadbStore;
use gim_watch::WatcherHub;

use crate::{
    services::{access::JsonSchemaValidator, notify::Event},
    AppConfig,
};

#[derive(Debug)]
pub struct App {
    pub config: AppConfig,
    pub store: MariadbStore,
    pub hub: WatcherHub<Event>,
    pub validator: JsonSchemaValidator,
}

impl App {
    pub fn new(pool: MySqlPool, config: AppConfig) -> Result<Self> {
        info!("initializing membership services...");
        let store = MariadbStore::new(pool);
        let hub = WatcherHub::new(config.history_size);
        info!(history = config.history_size, "event hub ready");
        Ok(Self {
            config,
            store,
            hub,
            validator: JsonSchemaValidator,
        })
    }
}
