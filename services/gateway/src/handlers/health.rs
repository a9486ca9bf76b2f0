use crate::models::{HealthResponse, counters};
use crate::state::AppState;
use axum::{Json, extract::State};
use market_data::FeedStatus;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let feed = *state.feed_status.borrow();
    let status = match feed {
        FeedStatus::Connected => "ok",
        _ => "degraded",
    };
    Json(HealthResponse {
        status,
        feed,
        sessions: state.broadcaster.session_count(),
        pending_orders: state.engine.book().len(),
        counters: counters(
            state.engine.stats(),
            state.ledger.stats(),
            state.broadcaster.stats(),
        ),
    })
}
