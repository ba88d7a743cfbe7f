use common::Order;
use serde::{Deserialize, Serialize};

/// Query parameters for listing orders.
///
/// Values are parsed leniently: anything that is not a positive integer falls
/// back to the default.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct OrderListQuery {
    /// Page number (1-indexed). Default 1.
    #[param(value_type = Option<u64>, example = 1)]
    pub page: Option<String>,
    /// Orders per page. Defaults to the configured page size and is capped at
    /// the configured maximum.
    #[param(value_type = Option<u64>, example = 50)]
    pub limit: Option<String>,
}

impl OrderListQuery {
    /// Resolve `(page, limit)`.
    pub fn resolve(&self, default_limit: u64, max_limit: u64) -> (u64, u64) {
        let page = parse_positive(self.page.as_deref()).unwrap_or(1);
        let limit = parse_positive(self.limit.as_deref())
            .unwrap_or(default_limit)
            .min(max_limit);
        (page, limit)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|v| *v >= 1)
}

/// A page of orders, newest first.
#[derive(Serialize, utoipa::ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    /// Total number of orders across all pages.
    #[schema(example = 47)]
    pub total: u64,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 50)]
    pub limit: u64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
}
