use axum::Json;
use axum::extract::{Path, Query, State};
use common::Order;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::models::order::{OrderListQuery, OrderListResponse};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/{order_uid}",
    tag = "Orders",
    operation_id = "getOrder",
    summary = "Get an order by its UID",
    description = "Served from the cache when possible, otherwise from the database.",
    params(("order_uid" = String, Path, description = "Order UID")),
    responses(
        (status = 200, description = "Order found", body = Order),
        (status = 400, description = "Blank order UID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Order not found (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Internal error (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>, AppError> {
    if order_uid.trim().is_empty() {
        return Err(AppError::Validation(
            "order_uid path parameter is required".into(),
        ));
    }

    let order = state.service.get_by_uid(&order_uid).await?;
    Ok(Json(order))
}

#[utoipa::path(
    get,
    path = "",
    tag = "Orders",
    operation_id = "listOrders",
    summary = "List orders",
    description = "Returns a page of orders, most recently created first. Always read from the database.",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Page of orders", body = OrderListResponse),
        (status = 500, description = "Internal error (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let api = &state.config.api;
    let (page, limit) = query.resolve(api.default_page_limit, api.max_page_limit);

    let result = state.service.list_orders(page, limit).await?;

    Ok(Json(OrderListResponse {
        orders: result.orders,
        total: result.total,
        page,
        limit,
    }))
}
