//! One server-sent event connection bridged onto the event bus.
//!
//! Each connection owns a bounded channel. The bus callback pushes into it
//! with `try_send`, so a slow client loses events instead of stalling the
//! publisher, and the HTTP body drains it. Dropping the stream (client gone,
//! server shutting down) unregisters the callback; the keep-alive timer
//! belongs to the `Sse` response and goes away with it.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::Event as SseEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use triage_core::{Event, EventBus, SubscriberError, Subscription};

/// Lifecycle of a stream connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Opening,
    Open,
    Closed,
}

pub struct ConnectionStream {
    id: String,
    rx: mpsc::Receiver<Event>,
    subscription: Subscription,
    state: ConnectionState,
}

impl ConnectionStream {
    /// Open a connection: queue the `connected` frame, then subscribe.
    ///
    /// The frame is queued before the callback is registered, so it is always
    /// the first thing the client reads and no earlier event is replayed.
    pub fn open(bus: &EventBus, buffer_size: usize) -> Self {
        let id = format!("conn_{}", Uuid::new_v4().simple());
        let mut state = ConnectionState::Opening;
        debug!(connection_id = %id, state = ?state, "Event stream connection opening");

        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        // Capacity is at least one and the channel is fresh.
        let _ = tx.try_send(Event::connected(id.clone()));

        let conn_id = id.clone();
        let subscription = bus.subscribe(move |event| match tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %conn_id, event_id = %event.id, "Event stream buffer full, dropping event");
                Err(SubscriberError::Lagged)
            }
            Err(TrySendError::Closed(_)) => Err(SubscriberError::Closed),
        });

        state = ConnectionState::Open;
        info!(
            connection_id = %id,
            state = ?state,
            subscribers = bus.subscriber_count(),
            "Event stream connection open"
        );

        Self {
            id,
            rx,
            subscription,
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.subscription.unsubscribe();
        self.rx.close();
        info!(connection_id = %self.id, state = ?self.state, "Event stream connection closed");
    }
}

/// Serialize a bus event into one `data: <json>` frame.
fn to_frame(event: &Event) -> Option<SseEvent> {
    match serde_json::to_string(event) {
        Ok(json) => Some(SseEvent::default().data(json)),
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "Failed to serialize stream event");
            None
        }
    }
}

impl Stream for ConnectionStream {
    type Item = Result<SseEvent, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(event)) => {
                    if let Some(frame) = to_frame(&event) {
                        return Poll::Ready(Some(Ok(frame)));
                    }
                }
                Poll::Ready(None) => {
                    // Every sender is gone: the bus was closed.
                    this.close();
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ConnectionStream {
    fn drop(&mut self) {
        self.close();
    }
}
