use std::sync::Arc;

use super::{config::Config, store::Store};

/// Process-scoped resources, acquired once at startup and handed to every
/// handler through axum state.
pub struct AppState {
    pub config: Config,
    pub store: Store,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();
        let store = Store::new();

        Arc::new(Self { config, store })
    }
}
