use std::sync::Arc;

use crate::config::AppConfig;
use crate::service::OrderService;

#[derive(Clone)]
pub struct AppState {
    pub service: OrderService,
    pub config: Arc<AppConfig>,
}
