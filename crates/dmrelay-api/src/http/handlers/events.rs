//! GET /api/v1/events - live update stream for dashboard viewers.
//!
//! Each connection subscribes one viewer. Events arrive as SSE frames named
//! `connected`, `ping`, or `newMessage` with a JSON `data` body. The
//! subscription is dropped with the response stream, which deregisters the
//! viewer.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::{Stream, StreamExt};

use dmrelay_types::event::LiveEvent;

use crate::http::extractors::auth::Operator;
use crate::state::AppState;

pub async fn stream_events(
    State(state): State<AppState>,
    _operator: Operator,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.sync.broadcaster().subscribe();
    tracing::debug!(viewer_id = %subscription.id(), "viewer connected");

    Sse::new(subscription.map(|event| Ok(to_sse(&event))))
}

fn to_sse(event: &LiveEvent) -> Event {
    Event::default().event(event.name()).data(event.data().to_string())
}

