//! # Postgres
//!
//! Profiles, links, orders and the visit/click logs live in one Postgres
//! database. The schema is applied idempotently on startup.
//!
//! `BOARD_MEMORY_STORE=true` swaps in the in-process store for local runs
//! without a database. Nothing survives a restart in that mode.
use std::sync::Arc;

use store::{MemoryStore, PgStore, Store, StoreError};
use tracing::{info, warn};

use crate::config::Config;

pub async fn init_store(config: &Config) -> Result<Arc<dyn Store>, StoreError> {
    if config.memory_store {
        warn!("Using in-memory store, data will be lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let Some(database_url) = config.database_url.as_deref() else {
        return Err(StoreError::Invalid("DATABASE_URL is not set".to_string()));
    };

    let store = PgStore::connect(database_url).await?;
    info!("Connected to Postgres");

    Ok(Arc::new(store))
}
