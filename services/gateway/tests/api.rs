//! HTTP surface against the in-memory store

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use gateway::{AppState, GatewayConfig, create_router};
use persistence::MemoryStore;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;
use types::ids::UserId;
use types::symbol::Symbol;
use types::tick::Tick;

struct Api {
    router: Router,
    state: AppState,
}

async fn api(funded: &[(UserId, i64)]) -> Api {
    let config = GatewayConfig {
        seed_funds: funded
            .iter()
            .map(|(user, cash)| (*user, Decimal::from(*cash)))
            .collect(),
        ..GatewayConfig::default()
    };
    let (state, _background) = AppState::build(&config, Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    Api {
        router: create_router(state.clone()),
        state,
    }
}

impl Api {
    async fn call(&self, method: Method, uri: &str, user: Option<UserId>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header("X-User-Id", user.to_string());
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn cash(&self, user: UserId) -> f64 {
        let (status, body) = self.call(Method::GET, "/v1/funds", Some(user), None).await;
        assert_eq!(status, StatusCode::OK);
        body["available_cash"].as_f64().unwrap()
    }
}

fn buy(symbol: &str, quantity: u64, price: i64) -> Value {
    json!({
        "symbol": symbol,
        "side": "BUY",
        "product": "DELIVERY",
        "quantity": quantity,
        "price": price,
    })
}

#[tokio::test]
async fn requests_without_user_are_rejected() {
    let api = api(&[]).await;
    let (status, body) = api
        .call(Method::POST, "/v1/orders", None, Some(buy("AAPL", 1, 10)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn place_edit_cancel_round_trip() {
    let user = UserId::new();
    let api = api(&[(user, 10_000)]).await;

    let (status, order) = api
        .call(Method::POST, "/v1/orders", Some(user), Some(buy("aapl", 10, 100)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["symbol"], "AAPL");
    assert_eq!(order["status"], "PENDING");
    assert_eq!(api.cash(user).await, 9_000.0);

    let id = order["order_id"].as_str().unwrap().to_string();
    let (status, edited) = api
        .call(
            Method::PATCH,
            &format!("/v1/orders/{id}"),
            Some(user),
            Some(json!({ "price": 150 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["order_id"], id.as_str());
    assert_eq!(api.cash(user).await, 8_500.0);

    let (status, cancelled) = api
        .call(Method::DELETE, &format!("/v1/orders/{id}"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["cancelled_by"], "USER");
    assert_eq!(api.cash(user).await, 10_000.0);

    let (status, body) = api
        .call(Method::DELETE, &format!("/v1/orders/{id}"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");

    let (_, listed) = api.call(Method::GET, "/v1/orders", Some(user), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["status"], "CANCELLED");
}

#[tokio::test]
async fn error_statuses() {
    let owner = UserId::new();
    let other = UserId::new();
    let api = api(&[(owner, 1_000), (other, 1_000)]).await;

    let (status, _) = api
        .call(Method::POST, "/v1/orders", Some(owner), Some(buy("TCS", 0, 10)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .call(Method::POST, "/v1/orders", Some(owner), Some(buy("TCS", 100, 100)))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = api
        .call(Method::POST, "/v1/orders", Some(UserId::new()), Some(buy("TCS", 1, 1)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, order) = api
        .call(Method::POST, "/v1/orders", Some(owner), Some(buy("TCS", 1, 10)))
        .await;
    let id = order["order_id"].as_str().unwrap();
    let (status, _) = api
        .call(Method::DELETE, &format!("/v1/orders/{id}"), Some(other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = api
        .call(Method::DELETE, "/v1/orders/not-a-uuid", Some(owner), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tick_executes_order_placed_over_http() {
    let user = UserId::new();
    let api = api(&[(user, 5_000)]).await;

    let (_, order) = api
        .call(Method::POST, "/v1/orders", Some(user), Some(buy("INFY", 10, 100)))
        .await;
    assert_eq!(api.state.engine.book().len(), 1);

    let outcome = api
        .state
        .engine
        .on_tick(&Tick::new(Symbol::parse("INFY").unwrap(), Decimal::from(99)))
        .await;
    assert_eq!(outcome.executed.len(), 1);

    let (_, listed) = api.call(Method::GET, "/v1/orders", Some(user), None).await;
    assert_eq!(listed[0]["order_id"], order["order_id"]);
    assert_eq!(listed[0]["status"], "EXECUTED");
    assert_eq!(api.cash(user).await, 4_000.0);

    let (status, health) = api.call(Method::GET, "/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["feed"], "connecting");
    assert_eq!(health["pending_orders"], 0);
    assert_eq!(health["counters"]["engine_executions"], 1);
}

#[tokio::test]
async fn edit_switches_product_and_reports_numbers() {
    let user = UserId::new();
    let api = api(&[(user, 10_000)]).await;

    let (_, order) = api
        .call(Method::POST, "/v1/orders", Some(user), Some(buy("WIPRO", 4, 250)))
        .await;
    assert_eq!(order["product"], "DELIVERY");
    assert_eq!(order["price"].as_f64(), Some(250.0));

    let id = order["order_id"].as_str().unwrap().to_string();
    let (status, edited) = api
        .call(
            Method::PATCH,
            &format!("/v1/orders/{id}"),
            Some(user),
            Some(json!({ "product": "INTRADAY" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["product"], "INTRADAY");
    assert_eq!(edited["quantity"], 4);
    assert_eq!(api.cash(user).await, 9_000.0);

    let (status, _) = api
        .call(Method::PATCH, &format!("/v1/orders/{id}"), Some(user), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
