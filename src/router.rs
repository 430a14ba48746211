//! Engine event routing.
//!
//! Subscribes to the completion and chip-progress channels of an
//! [`EventSource`], decodes each raw payload on receipt, and hands typed
//! events to an [`EventSink`] (normally the session driver's queue). Both
//! channels fan into the one sink so events are consumed in arrival order.

use std::sync::Arc;

use crate::engine::{EventChannel, EventSource, RawListener, SubscriptionId};
use crate::events::{self, ChipProgressEvent, CompletionEvent};

/// A decoded engine event.
#[derive(Debug, Clone)]
pub enum RoutedEvent {
    Completion(CompletionEvent),
    ChipProgress(ChipProgressEvent),
}

/// Receiver of routed events. Must not block.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: RoutedEvent);
}

/// A live subscription on one channel. Released exactly once, on
/// [`Subscription::release`] or on drop.
pub struct Subscription {
    source: Arc<dyn EventSource>,
    channel: EventChannel,
    id: Option<SubscriptionId>,
}

impl Subscription {
    pub fn new(source: Arc<dyn EventSource>, channel: EventChannel, listener: RawListener) -> Self {
        let id = source.subscribe(channel, listener);
        Self {
            source,
            channel,
            id: Some(id),
        }
    }

    pub fn channel(&self) -> EventChannel {
        self.channel
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Unsubscribe now. Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        match self.id.take() {
            Some(id) => {
                if !self.source.unsubscribe(id) {
                    tracing::warn!("Subscription on {} was already gone", self.channel);
                }
                true
            }
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// The pair of subscriptions held for the lifetime of a mounted surface.
pub struct EventRouter {
    completion: Subscription,
    chip_progress: Subscription,
}

impl EventRouter {
    /// Subscribe to both channels and start forwarding to `sink`.
    pub fn mount(source: Arc<dyn EventSource>, sink: Arc<dyn EventSink>) -> Self {
        let completion_sink = Arc::clone(&sink);
        let completion = Subscription::new(
            Arc::clone(&source),
            EventChannel::Completion,
            Arc::new(move |msg: &str| route_completion(msg, completion_sink.as_ref())),
        );

        let chip_progress = Subscription::new(
            source,
            EventChannel::ChipProgress,
            Arc::new(move |msg: &str| route_chip_progress(msg, sink.as_ref())),
        );

        tracing::debug!("Event router mounted");
        Self {
            completion,
            chip_progress,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.completion.is_active() && self.chip_progress.is_active()
    }

    /// Release both subscriptions.
    pub fn unmount(mut self) {
        self.completion.release();
        self.chip_progress.release();
        tracing::debug!("Event router unmounted");
    }
}

fn route_completion(msg: &str, sink: &dyn EventSink) {
    match events::decode_completion(msg) {
        Ok(Some(event)) => {
            tracing::debug!("Routing {:?} completion", event.outcome());
            sink.deliver(RoutedEvent::Completion(event));
        }
        Ok(None) => {
            tracing::trace!("Dropping intermediate completion notification");
        }
        Err(e) => {
            // Undecodable completions still end the operation
            tracing::warn!("{}", e);
            sink.deliver(RoutedEvent::Completion(CompletionEvent::error(Some(e.to_string()))));
        }
    }
}

fn route_chip_progress(msg: &str, sink: &dyn EventSink) {
    match events::decode_chip_progress(msg) {
        Ok(event) => sink.deliver(RoutedEvent::ChipProgress(event)),
        Err(e) => tracing::warn!("{}", e),
    }
}
