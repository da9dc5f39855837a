use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{
    configs::Config,
    protocol::EngineEvent,
    server::{dispatcher::CommandDispatcher, registry::SessionRegistry},
};

/// Top-level application state.
pub struct AppState {
    pub dispatcher: CommandDispatcher,
    pub registry: Arc<SessionRegistry>,
    pub events: broadcast::Sender<EngineEvent>,
    pub config: Config,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, config: Config) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(registry.clone()),
            events: registry.deps().events.clone(),
            registry,
            config,
        }
    }
}
