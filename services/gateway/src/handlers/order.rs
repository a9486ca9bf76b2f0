use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{CreateOrderRequest, EditOrderRequest, OrderResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use matching_engine::OrderCancelledEvent;
use types::ids::OrderId;

fn parse_order_id(raw: &str) -> Result<OrderId, AppError> {
    raw.parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid order id: {}", e)))
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let order = state.desk.place(user.user_id, payload.into_place()?).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

pub async fn edit_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
    Json(payload): Json<EditOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = parse_order_id(&order_id)?;
    let order = state
        .desk
        .edit(user.user_id, order_id, payload.into_edit()?)
        .await?;
    Ok(Json(order.into()))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderCancelledEvent>, AppError> {
    let order_id = parse_order_id(&order_id)?;
    let event = state.desk.cancel(user.user_id, order_id).await?;
    Ok(Json(event))
}

pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.desk.list(user.user_id).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}
