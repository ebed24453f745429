use std::{convert::Infallible, time::Duration};

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::events::{EventsQuery, StreamRole},
    state::{
        SharedState,
        rooms::{RoomEvent, RoomSubscription, admin_room, quiz_room},
    },
};

/// Configure the per-quiz event stream endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/quizzes/{id}/events", get(quiz_events))
}

/// Stream a quiz room's events to a connected client.
#[utoipa::path(
    get,
    path = "/quizzes/{id}/events",
    tag = "events",
    params(
        ("id" = Uuid, Path, description = "Identifier of the quiz"),
        EventsQuery
    ),
    responses((status = 200, description = "Quiz event stream", content_type = "text/event-stream", body = String))
)]
pub async fn quiz_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let role = query.role.unwrap_or_default();
    let room = match role {
        StreamRole::Viewer => quiz_room(id),
        StreamRole::Admin => admin_room(id),
    };

    let subscription = state.rooms().subscribe(&room);
    info!(quiz_id = %id, role = ?role, "new event stream connection");
    state.fanout().mark_viewer_count_dirty(id);

    to_sse_stream(subscription, state, id)
}

/// Convert a room subscription into an SSE response, forwarding events and
/// cleaning up once the client disconnects or the room is torn down.
fn to_sse_stream(
    mut subscription: RoomSubscription,
    state: SharedState,
    quiz_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from the room and pushes into the mpsc
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                received = subscription.recv() => {
                    match received {
                        Ok(RoomEvent::Message(payload)) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Ok(RoomEvent::Disconnect) => break,
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        // Dropping the subscription here leaves the room, so the count push
        // after this mark reflects the departure.
        drop(subscription);
        state.fanout().mark_viewer_count_dirty(quiz_id);
        info!(quiz_id = %quiz_id, "event stream disconnected");
    });

    // response stream reads from mpsc; when the client disconnects axum
    // drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
