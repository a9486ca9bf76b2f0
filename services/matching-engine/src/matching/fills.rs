//! Holding/position book-keeping after an execution
//!
//! Delivery fills land in holdings, Intraday fills in positions. A BUY adds
//! shares at the fill price and re-weights the average cost; a SELL removes
//! shares and deletes the record once it reaches zero.

use chrono::{DateTime, Utc};
use persistence::{RecordStore, StoreError};
use types::numeric::Price;
use types::order::{Order, Side};
use types::position::Position;

/// Apply an executed order to the user's holding or position.
///
/// Returns the record as it stands afterwards, `None` if it was closed or
/// never existed (a SELL against nothing is left alone).
pub async fn apply_fill(
    store: &dyn RecordStore,
    order: &Order,
    price: Price,
    at: DateTime<Utc>,
) -> Result<Option<Position>, StoreError> {
    let existing = store
        .load_position(order.user_id, &order.symbol, order.product)
        .await?;

    match order.side {
        Side::BUY => {
            let position = match existing {
                Some(mut position) => {
                    position.add(order.quantity, price, at);
                    position
                }
                None => Position::new(
                    order.user_id,
                    order.symbol.clone(),
                    order.product,
                    order.quantity,
                    price,
                    at,
                ),
            };
            store.save_position(&position).await?;
            Ok(Some(position))
        }
        Side::SELL => {
            let Some(mut position) = existing else {
                return Ok(None);
            };
            if position.reduce(order.quantity, at) == 0 {
                store
                    .delete_position(order.user_id, &order.symbol, order.product)
                    .await?;
                Ok(None)
            } else {
                store.save_position(&position).await?;
                Ok(Some(position))
            }
        }
    }
}
