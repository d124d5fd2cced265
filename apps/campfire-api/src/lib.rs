pub mod config;
pub mod gateway;
pub mod rooms;
pub mod routes;

use std::sync::Arc;

use config::Config;
use gateway::registry::ConnectionRegistry;
use rooms::service::RoomService;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomService>,
}

impl AppState {
    /// Wire the registry and room service together from a config.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomService::new(config.clone(), registry.clone());
        Self {
            config,
            registry,
            rooms,
        }
    }
}
