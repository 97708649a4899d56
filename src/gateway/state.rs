use std::sync::Arc;

use crate::service::WalletService;

/// Shared gateway state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WalletService>,
}

impl AppState {
    pub fn new(service: Arc<WalletService>) -> Self {
        Self { service }
    }
}
