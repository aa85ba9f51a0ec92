//! SSE route: stream a request's events to the client.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use meshgen_core::error::CoreError;
use meshgen_core::types::DbId;
use meshgen_db::repositories::GenerationRequestRepo;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::error::AppResult;
use crate::state::AppState;

use super::registry::{ConnectionRegistry, OutboundFrame};

/// Deregisters the connection when the client goes away and the stream is
/// dropped.
struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    task_id: DbId,
    conn_id: Uuid,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.task_id, self.conn_id);
        tracing::debug!(task_id = self.task_id, conn_id = %self.conn_id, "SSE connection closed");
    }
}

/// `GET /api/v1/requests/{id}/events`
pub async fn task_events(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    GenerationRequestRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "generation request",
            id,
        })?;

    let (conn_id, rx) = state.registry.add(id);
    tracing::debug!(task_id = id, %conn_id, "SSE connection opened");
    let guard = ConnectionGuard {
        registry: state.registry.clone(),
        task_id: id,
        conn_id,
    };

    // The guard lives inside the stream closure; dropping the stream (client
    // disconnect or shutdown) deregisters the connection.
    let stream = UnboundedReceiverStream::new(rx).map(move |frame| {
        let _held = &guard;
        Ok(match frame {
            OutboundFrame::Event(event) => Event::default()
                .event(event.event_type.as_str())
                .data(event.payload.to_string()),
            OutboundFrame::Ping => Event::default().comment("keep-alive"),
        })
    });
    Ok(Sse::new(stream))
}
