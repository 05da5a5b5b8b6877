use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    events::{DashboardNotifier, EventPayload},
    server::AppState,
};

/// Dashboard event name, kept from the browser client's socket protocol.
pub const STATUS_UPDATE_EVENT: &str = "status update";

/// Fans dashboard events out to every connected SSE client
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<EventPayload>>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel::<EventPayload>(512);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn broadcast(&self, event: EventPayload) {
        // Fails only when nobody is listening
        if let Err(e) = self.sender.send(event) {
            debug!("Dashboard broadcast skipped: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventPayload> {
        self.sender.subscribe()
    }
}

impl DashboardNotifier for EventBroadcaster {
    fn notify(&self, event: EventPayload) {
        self.broadcast(event);
    }
}

/// SSE endpoint streaming dashboard events to the browser
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let init_event = EventPayload::system_init(state.config.mode.as_str());
    let mut receiver = state.event_broadcaster.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event(STATUS_UPDATE_EVENT)
            .data(init_event.to_json().to_string()));

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    yield Ok(Event::default()
                        .event(STATUS_UPDATE_EVENT)
                        .data(event.to_json().to_string()));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("SSE client lagged, skipped {} events", skipped);
                }
                Err(_) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
