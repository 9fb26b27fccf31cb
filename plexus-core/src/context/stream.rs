//! Fire-and-forget publish/subscribe subject.
//!
//! Every subscriber owns an unbounded channel, so publishing never waits on a
//! slow consumer. Callback subscribers are driven by a spawned task that
//! drains their channel in order.

use futures::Stream;
use std::{
    fmt,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError, Weak},
    task::{Context as TaskContext, Poll},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::{error::PlexusError, types::IntermediateStep};

/// A message delivered to one subscriber.
#[derive(Debug, Clone)]
pub enum Notification<T> {
    /// A published item
    Next(T),
    /// The stream failed; no further items follow
    Error(Arc<PlexusError>),
    /// The stream completed; no further items follow
    Complete,
}

/// Receives items published on a [`Subject`].
///
/// Callbacks run on the subscriber's own task and never block the publisher.
pub trait Observer<T>: Send + Sync + 'static {
    /// Called for every published item.
    fn on_next(&self, item: T);

    /// Called once if the stream fails.
    fn on_error(&self, error: Arc<PlexusError>) {
        debug!("Unhandled stream error: {}", error);
    }

    /// Called once when the stream completes.
    fn on_complete(&self) {}
}

type OnNext<T> = Box<dyn Fn(T) + Send + Sync>;
type OnError = Box<dyn Fn(Arc<PlexusError>) + Send + Sync>;
type OnComplete = Box<dyn Fn() + Send + Sync>;

struct FnObserver<T> {
    on_next: OnNext<T>,
    on_error: Option<OnError>,
    on_complete: Option<OnComplete>,
}

impl<T: Send + 'static> Observer<T> for FnObserver<T> {
    fn on_next(&self, item: T) {
        (self.on_next)(item);
    }

    fn on_error(&self, error: Arc<PlexusError>) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }

    fn on_complete(&self) {
        if let Some(on_complete) = &self.on_complete {
            on_complete();
        }
    }
}

struct SubjectState<T> {
    subscribers: Vec<(u64, mpsc::UnboundedSender<Notification<T>>)>,
    next_id: u64,
    terminal: Option<Notification<T>>,
}

/// Multicast subject with non-blocking delivery.
pub struct Subject<T> {
    state: Arc<Mutex<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Subject")
            .field("subscribers", &state.subscribers.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// Create a subject with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                subscribers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }

    /// Publish an item to every current subscriber.
    ///
    /// Items published after completion are dropped.
    pub fn on_next(&self, item: T) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.terminal.is_some() {
            debug!("Dropping item published on a terminated subject");
            return;
        }
        state
            .subscribers
            .retain(|(_, sender)| sender.send(Notification::Next(item.clone())).is_ok());
    }

    /// Terminate the stream with an error.
    pub fn on_error(&self, error: PlexusError) {
        self.terminate(Notification::Error(Arc::new(error)));
    }

    /// Terminate the stream successfully.
    pub fn on_complete(&self) {
        self.terminate(Notification::Complete);
    }

    fn terminate(&self, notification: Notification<T>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.terminal.is_some() {
            return;
        }
        for (_, sender) in state.subscribers.drain(..) {
            let _ = sender.send(notification.clone());
        }
        state.terminal = Some(notification);
    }

    /// Whether the stream completed or failed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminal
            .is_some()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }

    /// Subscribe with a channel-backed stream of notifications.
    ///
    /// Subscribing to a terminated subject yields its terminal notification
    /// immediately.
    #[must_use]
    pub fn subscribe_stream(&self) -> NotificationStream<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_id;
        state.next_id += 1;
        if let Some(terminal) = &state.terminal {
            let _ = sender.send(terminal.clone());
        } else {
            state.subscribers.push((id, sender));
        }
        drop(state);

        NotificationStream {
            receiver,
            subscription: Subscription::new(self.remover(id), None),
        }
    }

    /// Subscribe an observer. Must be called within a Tokio runtime.
    pub fn subscribe<O: Observer<T>>(&self, observer: O) -> Subscription {
        let NotificationStream {
            mut receiver,
            mut subscription,
        } = self.subscribe_stream();

        let task = tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                match notification {
                    Notification::Next(item) => observer.on_next(item),
                    Notification::Error(error) => {
                        observer.on_error(error);
                        break;
                    }
                    Notification::Complete => {
                        observer.on_complete();
                        break;
                    }
                }
            }
        });
        subscription.task = Some(task);
        subscription
    }

    /// Subscribe with plain callbacks.
    pub fn subscribe_fn<N>(
        &self,
        on_next: N,
        on_error: Option<OnError>,
        on_complete: Option<OnComplete>,
    ) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(FnObserver {
            on_next: Box::new(on_next),
            on_error,
            on_complete,
        })
    }

    fn remover(&self, id: u64) -> Arc<dyn Fn() + Send + Sync> {
        let state: Weak<Mutex<SubjectState<T>>> = Arc::downgrade(&self.state);
        Arc::new(move || {
            if let Some(state) = state.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }
}

/// Handle to one subscription.
pub struct Subscription {
    remove: Arc<dyn Fn() + Send + Sync>,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Subscription {
    fn new(remove: Arc<dyn Fn() + Send + Sync>, task: Option<JoinHandle<()>>) -> Self {
        Self { remove, task }
    }

    /// Stop receiving notifications. Idempotent.
    pub fn unsubscribe(&self) {
        (self.remove)();
    }

    /// Wait until the observer has seen the terminal notification (or the
    /// subscription was cancelled).
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Subscriber task ended abnormally: {}", e);
            }
        }
    }
}

/// Channel-backed subscription yielding notifications as a [`Stream`].
pub struct NotificationStream<T> {
    receiver: mpsc::UnboundedReceiver<Notification<T>>,
    subscription: Subscription,
}

impl<T> NotificationStream<T> {
    /// Stop receiving notifications.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    /// Drain every item until the stream terminates, returning the items and
    /// the error that terminated the stream, if any.
    pub async fn collect_items(mut self) -> (Vec<T>, Option<Arc<PlexusError>>) {
        let mut items = Vec::new();
        while let Some(notification) = self.receiver.recv().await {
            match notification {
                Notification::Next(item) => items.push(item),
                Notification::Error(error) => return (items, Some(error)),
                Notification::Complete => break,
            }
        }
        (items, None)
    }
}

impl<T> Stream for NotificationStream<T> {
    type Item = Notification<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// The per-run stream of intermediate steps.
pub type EventStream = Subject<IntermediateStep>;
