use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State};
use types::funds::FundsRecord;

pub async fn get_funds(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<FundsRecord>, AppError> {
    let funds = state.ledger.funds(user.user_id).await?;
    Ok(Json(funds))
}
