//! Assistant Route

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::assistant::UNAVAILABLE_REPLY;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

pub async fn chat(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ChatReply>) {
    match state.assistant.reply(state.repo(), &req.message).await {
        Ok(reply) => (StatusCode::OK, Json(ChatReply { reply })),
        Err(e) => {
            error!("Assistant request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatReply {
                    reply: UNAVAILABLE_REPLY.to_string(),
                }),
            )
        }
    }
}
