use std::sync::Arc;

use store::Store;

use super::{auth::Sessions, config::Config, database::init_store, error::StartupError, pixel::Pixel};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub sessions: Sessions,
    pub pixel: Option<Arc<Pixel>>,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>, StartupError> {
        let store = init_store(&config).await?;

        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Result<Arc<Self>, StartupError> {
        let pixel = match &config.facebook {
            Some(facebook) => Some(Arc::new(Pixel::new(facebook.clone())?)),
            None => None,
        };

        Ok(Arc::new(Self {
            sessions: Sessions::new(&config.session_secret),
            config,
            store,
            pixel,
        }))
    }
}
