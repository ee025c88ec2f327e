use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::registry::{RegistryBuilder, RegistryService};
use crate::sms::SmsClient;
use crate::store::ImageStore;

/// Shared application state.
pub struct AppState {
    /// Uploaded photos, one directory per label
    pub store: ImageStore,
    /// Lazily built labeled descriptor cache
    pub registry: RegistryService,
    /// Extraction worker pool
    pub engine: EngineHandle,
    /// Twilio relay
    pub sms: SmsClient,
    /// Root for HTML pages and static assets
    pub static_dir: PathBuf,
    pub match_threshold: f32,
    pub refresh_on_upload: bool,
}

impl AppState {
    pub fn new(config: &Config, engine: EngineHandle) -> anyhow::Result<Arc<Self>> {
        let store = ImageStore::new(&config.upload_dir);
        let registry = RegistryService::new(RegistryBuilder::new(store.clone(), engine.clone()));
        Ok(Arc::new(AppState {
            store,
            registry,
            engine,
            sms: SmsClient::new(config.sms.clone())?,
            static_dir: config.static_dir.clone(),
            match_threshold: config.match_threshold,
            refresh_on_upload: config.refresh_on_upload,
        }))
    }
}
