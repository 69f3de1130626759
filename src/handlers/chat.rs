use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};

use crate::middleware::error_handling::Result;
use crate::services::gemini_chat_service::ChatRequest;
use crate::AppState;

/// POST /api/chat
///
/// Streams the assistant's answer as SSE `data:` events; the final event is
/// the literal `[DONE]` sentinel.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let chunks = state.chat.stream_chat(request).await?;

    let events = chunks.map(|payload| Ok(Event::default().data(payload)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
