use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::routes::AppState;
use crate::routes::auth::AuthUser;

/// Realtime channel for the dashboard: each normalized write is pushed as a
/// named SSE event. Opening the stream subscribes, dropping it unsubscribes.
/// Lagged receivers silently skip lost notifications.
pub async fn stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(email = %user.email, "dashboard event stream opened");

    let stream = BroadcastStream::new(state.notifier.subscribe()).filter_map(|item| async move {
        let notification = item.ok()?;
        let event = Event::default()
            .event(notification.event_name())
            .json_data(notification.payload())
            .ok()?;
        Some(Ok(event))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
