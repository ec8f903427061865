//! Bounded event channels from workers to the aggregator.
//!
//! Senders block when a channel is full; events are never dropped.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::request::ResponseRecord;

/// The aggregator is gone; the sending worker should stop.
#[derive(Debug, Clone, Copy, Error)]
#[error("event channel closed")]
pub struct ChannelClosed;

/// Producer half, cloned into every sender task.
#[derive(Debug, Clone)]
pub struct EventSender {
    responses: mpsc::Sender<Arc<ResponseRecord>>,
    errors: mpsc::Sender<TransportError>,
}

impl EventSender {
    pub async fn response(&self, record: Arc<ResponseRecord>) -> Result<(), ChannelClosed> {
        self.responses.send(record).await.map_err(|_| ChannelClosed)
    }

    pub async fn error(&self, error: TransportError) -> Result<(), ChannelClosed> {
        self.errors.send(error).await.map_err(|_| ChannelClosed)
    }
}

/// Consumer half, owned by the run controller.
#[derive(Debug)]
pub struct EventReceiver {
    pub responses: mpsc::Receiver<Arc<ResponseRecord>>,
    pub errors: mpsc::Receiver<TransportError>,
}

/// Create the response and error channels, each holding up to `capacity` events.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (response_tx, response_rx) = mpsc::channel(capacity.max(1));
    let (error_tx, error_rx) = mpsc::channel(capacity.max(1));
    (
        EventSender {
            responses: response_tx,
            errors: error_tx,
        },
        EventReceiver {
            responses: response_rx,
            errors: error_rx,
        },
    )
}
