use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use dipbot::exchange::MockExchange;
use dipbot::execution::{EngineSettings, EngineState, TradingEngine};
use dipbot::strategy::{BaselineTracker, SignalConfig};
use dipbot::web::create_router;
use dipbot::{BotController, TradingPair};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn btc() -> TradingPair {
    TradingPair::new("BTC", "USDT")
}

fn app(exchange: Arc<MockExchange>) -> (Router, Arc<BotController>) {
    let settings = EngineSettings {
        pairs: vec![btc()],
        total_investment: 100.0,
        signals: SignalConfig::default(),
        cycle_interval: Duration::from_secs(60),
    };
    let tracker = BaselineTracker::new(exchange.clone(), "1m", 20);
    let engine = TradingEngine::new(settings, exchange, tracker, Arc::new(EngineState::new()))
        .expect("engine should build");
    let bot = Arc::new(BotController::new(Arc::new(engine), Duration::from_secs(300)));
    (create_router(bot.clone()), bot)
}

fn quiet_exchange() -> Arc<MockExchange> {
    let exchange = Arc::new(MockExchange::new());
    exchange.set_closes(&btc(), vec![100.0]);
    exchange.set_price(&btc(), 100.0);
    exchange
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_home_and_favicon() {
    let (app, _) = app(quiet_exchange());

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Welcome to the trading bot API!" }));

    let (status, body) = get(&app, "/favicon.ico").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_returns_already_running() {
    let exchange = quiet_exchange();
    let (app, _) = app(exchange.clone());

    let (status, body) = get(&app, "/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "Bot started" }));

    let (status, body) = get(&app, "/start").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "status": "Bot is already running" }));

    // Only one loop ran its initial baseline fetch
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(exchange.closes_requests(), 1);

    let (status, _) = get(&app, "/stop").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stop_when_idle_returns_not_running() {
    let (app, _) = app(quiet_exchange());

    let (status, body) = get(&app, "/stop").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "status": "Bot is not running" }));
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_cycle() {
    let exchange = Arc::new(MockExchange::new().with_order_latency(Duration::from_secs(30)));
    exchange.set_closes(&btc(), vec![100.0]);
    exchange.set_price(&btc(), 90.0);
    let (app, bot) = app(exchange.clone());

    let (status, _) = get(&app, "/start").await;
    assert_eq!(status, StatusCode::OK);

    // Let the first cycle reach the slow buy order
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(bot.state().position(&btc()).is_none());

    let started = tokio::time::Instant::now();
    let (status, body) = get(&app, "/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "Bot stopped" }));
    assert!(started.elapsed() >= Duration::from_secs(29));

    // The buy that was in flight finished before the loop exited
    assert_eq!(bot.state().position(&btc()).map(|p| p.entry_price), Some(90.0));
    assert_eq!(exchange.orders().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_reports_activity_and_bought_prices() {
    let exchange = quiet_exchange();
    exchange.set_price(&btc(), 90.0);
    let (app, _) = app(exchange);

    let (status, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "bot_active": false, "bought_prices": {} }));

    get(&app, "/start").await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (_, body) = get(&app, "/status").await;
    assert_eq!(
        body,
        json!({ "bot_active": true, "bought_prices": { "BTC/USDT": 90.0 } })
    );

    get(&app, "/stop").await;
    let (_, body) = get(&app, "/status").await;
    // Positions survive a stop; only the activity flag changes
    assert_eq!(
        body,
        json!({ "bot_active": false, "bought_prices": { "BTC/USDT": 90.0 } })
    );
}
