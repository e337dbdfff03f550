//! Process-lifetime context: the store and the shared upstream client.
//!
//! Built once in `main` and handed to everything that needs it; there are
//! no module-level singletons, and teardown is dropping the context.

use std::sync::Arc;

use crate::app::config::Config;
use crate::core::db;
use crate::core::exchange::UpstreamClient;
use crate::core::store::Store;
use crate::error::Result;

/// Shared handles owned for the lifetime of the process.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Store,
    pub client: Arc<UpstreamClient>,
}

impl AppContext {
    /// Build the pool (running pending migrations) and the shared client.
    pub fn initialize(config: Config) -> Result<Self> {
        let pool = db::create_pool(&config.database_url, config.db_pool_size)?;
        {
            let mut conn = pool
                .get()
                .map_err(|e| crate::error::Error::Connection(e.to_string()))?;
            db::run_migrations(&mut conn)?;
        }

        let client = Arc::new(UpstreamClient::new(
            config.gamma_api_url.clone(),
            config.clob_api_url.clone(),
            config.retry,
            config.orderbook_concurrency,
            config.auth.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            store: Store::new(pool),
            client,
        })
    }
}
