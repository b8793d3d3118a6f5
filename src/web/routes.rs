use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::control::BotController;
use crate::error::ControlError;
use crate::execution::StatusSnapshot;

const WELCOME_MESSAGE: &str = "Welcome to the trading bot API!";

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct WelcomeMessage {
    pub message: &'static str,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let code = match self {
            ControlError::AlreadyRunning | ControlError::NotRunning => StatusCode::BAD_REQUEST,
            ControlError::StopTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (
            code,
            Json(StatusMessage {
                status: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn ok_status(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(StatusMessage {
            status: message.to_string(),
        }),
    )
        .into_response()
}

/// GET / - welcome payload
async fn home() -> Json<WelcomeMessage> {
    Json(WelcomeMessage {
        message: WELCOME_MESSAGE,
    })
}

/// GET /favicon.ico - nothing to serve
async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /start - Idle -> Running
async fn start_bot(State(bot): State<Arc<BotController>>) -> Response {
    match bot.start().await {
        Ok(()) => ok_status("Bot started"),
        Err(e) => e.into_response(),
    }
}

/// GET /stop - Running -> Idle, answered once the loop has exited
async fn stop_bot(State(bot): State<Arc<BotController>>) -> Response {
    match bot.stop().await {
        Ok(()) => ok_status("Bot stopped"),
        Err(e) => e.into_response(),
    }
}

/// GET /status - activity flag and open entry prices, read together
async fn status(State(bot): State<Arc<BotController>>) -> Json<StatusSnapshot> {
    Json(bot.status())
}

pub fn create_router(bot: Arc<BotController>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/favicon.ico", get(favicon))
        .route("/start", get(start_bot))
        .route("/stop", get(stop_bot))
        .route("/status", get(status))
        .with_state(bot)
}
