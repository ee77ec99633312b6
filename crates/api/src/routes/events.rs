//! Live staff feed over server-sent events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use futures_util::stream;
use notify::StaffTopic;
use store::CanteenStore;
use tokio::sync::broadcast::error::RecvError;

use super::AppState;
use crate::error::ApiError;

/// GET /staff/events/{topic}, streams one staff topic until the client leaves.
#[tracing::instrument(skip(state))]
pub async fn subscribe<S: CanteenStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(topic): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let topic: StaffTopic = topic.parse().map_err(ApiError::BadRequest)?;
    let receiver = state.notifier.subscribe(topic);

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event.topic.as_str())
                        .data(event.payload.to_string());
                    return Some((Ok(sse), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "staff feed subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
