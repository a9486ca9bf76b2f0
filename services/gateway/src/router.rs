use crate::handlers::{account, health, order, ws};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/orders", get(order::list_orders).post(order::create_order))
        .route(
            "/orders/{id}",
            patch(order::edit_order).delete(order::cancel_order),
        )
        .route("/funds", get(account::get_funds))
        .route("/health", get(health::health))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
