//! Single-shot, push-based result delivery.
//!
//! An [`Observable`] is lazy: nothing runs until [`Observable::subscribe`]
//! spawns the request. The subscriber receives at most one value and then at
//! most one terminal signal. An aborted request ends with no signal at all.

use parking_lot::ReentrantMutex;
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ErrorCode, LinkError, LinkResult};
use crate::fetch::{AbortController, AbortSignal};
use crate::response::{FetchResult, ResponseOutcome};

/// Something delivered to a subscriber.
#[derive(Debug, Clone)]
pub enum Notification {
    Next(FetchResult),
    Error(LinkError),
    Complete,
}

/// Receives a subscription's notifications.
pub trait Observer: Send + 'static {
    fn next(&mut self, value: FetchResult);
    fn error(&mut self, error: LinkError);
    fn complete(&mut self);
}

impl Observer for mpsc::UnboundedSender<Notification> {
    fn next(&mut self, value: FetchResult) {
        let _ = self.send(Notification::Next(value));
    }

    fn error(&mut self, error: LinkError) {
        let _ = self.send(Notification::Error(error));
    }

    fn complete(&mut self) {
        let _ = self.send(Notification::Complete);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitState {
    Pending,
    Emitted,
    Done,
}

/// Closed flag shared by an [`Emitter`] and its [`Subscription`].
///
/// Delivery happens while the lock is held, so once `close` returns no
/// observer call is in progress or can start. The lock is reentrant so an
/// observer may unsubscribe from inside its own callback.
#[derive(Default)]
pub(crate) struct Gate {
    closed: ReentrantMutex<Cell<bool>>,
}

impl Gate {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.lock().get()
    }

    /// Closes the gate. Returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        let closed = self.closed.lock();
        !closed.replace(true)
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Wraps an observer and enforces the delivery order: one value at most,
/// then one terminal signal at most, nothing after close.
pub(crate) struct Emitter<O> {
    observer: O,
    state: EmitState,
    gate: Arc<Gate>,
}

impl<O: Observer> Emitter<O> {
    pub(crate) fn new(observer: O, gate: Arc<Gate>) -> Self {
        Self {
            observer,
            state: EmitState::Pending,
            gate,
        }
    }

    pub(crate) fn next(&mut self, value: FetchResult) -> bool {
        if self.state != EmitState::Pending {
            return false;
        }
        let closed = self.gate.closed.lock();
        if closed.get() {
            return false;
        }
        self.state = EmitState::Emitted;
        self.observer.next(value);
        true
    }

    pub(crate) fn error(&mut self, error: LinkError) -> bool {
        if self.state == EmitState::Done {
            return false;
        }
        let closed = self.gate.closed.lock();
        if closed.replace(true) {
            return false;
        }
        self.state = EmitState::Done;
        self.observer.error(error);
        true
    }

    pub(crate) fn complete(&mut self) -> bool {
        if self.state == EmitState::Done {
            return false;
        }
        let closed = self.gate.closed.lock();
        if closed.replace(true) {
            return false;
        }
        self.state = EmitState::Done;
        self.observer.complete();
        true
    }

    /// Delivers a classified outcome.
    pub(crate) fn deliver(&mut self, outcome: ResponseOutcome) {
        match outcome {
            ResponseOutcome::Success(result) => {
                self.next(result);
                self.complete();
            }
            ResponseOutcome::PartialFailure { result, error } => {
                self.next(result);
                self.error(error);
            }
            ResponseOutcome::Failure(error) => {
                self.error(error);
            }
            ResponseOutcome::Aborted => {}
        }
    }
}

/// Handle returned by [`Observable::subscribe`].
///
/// Dropping the handle does not cancel the request.
#[derive(Debug, Clone)]
pub struct Subscription {
    gate: Arc<Gate>,
    controller: AbortController,
}

impl Subscription {
    /// Stops delivery and aborts the in-flight request. Only the first call
    /// has an effect, and none once a terminal signal was sent.
    ///
    /// When this returns, the observer is not running and will not be called
    /// again.
    pub fn unsubscribe(&self) {
        if !self.gate.close() {
            return;
        }
        debug!("unsubscribed, aborting request");
        self.controller.abort();
    }

    /// Returns true after unsubscribe or once a terminal signal was sent.
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }
}

/// Unsubscribes when dropped.
struct UnsubscribeOnDrop(Subscription);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

type RequestFuture = Pin<Box<dyn Future<Output = LinkResult<FetchResult>> + Send>>;
type Producer = Box<dyn FnOnce(AbortSignal) -> RequestFuture + Send>;

/// A lazily started request whose result is pushed to one subscriber.
pub struct Observable {
    producer: Producer,
}

impl Observable {
    /// Creates an observable from a request factory. The factory runs on
    /// subscribe and receives the signal tied to the subscription.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(AbortSignal) -> Fut + Send + 'static,
        Fut: Future<Output = LinkResult<FetchResult>> + Send + 'static,
    {
        Self {
            producer: Box::new(move |signal: AbortSignal| -> RequestFuture {
                Box::pin(producer(signal))
            }),
        }
    }

    /// Starts the request on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn subscribe<O: Observer>(self, observer: O) -> Subscription {
        let controller = AbortController::new();
        let gate = Arc::new(Gate::default());
        let mut emitter = Emitter::new(observer, Arc::clone(&gate));
        let request = (self.producer)(controller.signal());

        tokio::spawn(async move {
            let outcome = ResponseOutcome::classify(request.await);
            emitter.deliver(outcome);
        });

        Subscription { gate, controller }
    }

    /// Subscribes and returns the notifications as a channel.
    pub fn into_channel(self) -> (mpsc::UnboundedReceiver<Notification>, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(tx);
        (rx, subscription)
    }

    /// Subscribes and waits for the outcome.
    ///
    /// A partial failure returns the error; its `result` holds the partial
    /// data. Dropping the future before it resolves unsubscribes, which
    /// aborts the request.
    pub async fn result(self) -> LinkResult<FetchResult> {
        let (mut rx, subscription) = self.into_channel();
        let _guard = UnsubscribeOnDrop(subscription);
        let mut value = None;
        while let Some(notification) = rx.recv().await {
            match notification {
                Notification::Next(result) => value = Some(result),
                Notification::Error(error) => return Err(error),
                Notification::Complete => {
                    return value.ok_or_else(|| {
                        LinkError::new(ErrorCode::ServerError, "completed without a result")
                    });
                }
            }
        }
        Err(LinkError::aborted())
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder(Vec<&'static str>);

    impl Observer for Recorder {
        fn next(&mut self, _value: FetchResult) {
            self.0.push("next");
        }

        fn error(&mut self, _error: LinkError) {
            self.0.push("error");
        }

        fn complete(&mut self) {
            self.0.push("complete");
        }
    }

    fn emitter() -> Emitter<Recorder> {
        Emitter::new(Recorder::default(), Arc::new(Gate::default()))
    }

    fn subscription(gate: &Arc<Gate>) -> Subscription {
        Subscription {
            gate: Arc::clone(gate),
            controller: AbortController::new(),
        }
    }

    #[test]
    fn test_emitter_allows_one_value_then_one_terminal() {
        let mut e = emitter();
        assert!(e.next(FetchResult::default()));
        assert!(!e.next(FetchResult::default()));
        assert!(e.complete());
        assert!(!e.error(LinkError::network("late")));
        assert!(!e.complete());
        assert_eq!(e.observer.0, vec!["next", "complete"]);
    }

    #[test]
    fn test_emitter_nothing_after_error() {
        let mut e = emitter();
        assert!(e.error(LinkError::network("down")));
        assert!(!e.next(FetchResult::default()));
        assert_eq!(e.observer.0, vec!["error"]);
    }

    #[test]
    fn test_emitter_respects_unsubscribe() {
        let gate = Arc::new(Gate::default());
        let mut e = Emitter::new(Recorder::default(), Arc::clone(&gate));
        let subscription = subscription(&gate);
        let signal = subscription.controller.signal();

        subscription.unsubscribe();
        assert!(signal.is_aborted());
        assert!(!e.next(FetchResult::default()));
        assert!(!e.complete());
        assert!(e.observer.0.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_terminal_does_not_abort() {
        let gate = Arc::new(Gate::default());
        let mut e = Emitter::new(Recorder::default(), Arc::clone(&gate));
        let subscription = subscription(&gate);
        let signal = subscription.controller.signal();

        e.deliver(ResponseOutcome::Success(FetchResult::default()));
        assert!(subscription.is_closed());
        subscription.unsubscribe();
        assert!(!signal.is_aborted());
    }

    #[test]
    fn test_deliver_outcomes() {
        let mut e = emitter();
        e.deliver(ResponseOutcome::PartialFailure {
            result: FetchResult::default(),
            error: LinkError::server(StatusCode::BAD_REQUEST, "bad"),
        });
        assert_eq!(e.observer.0, vec!["next", "error"]);

        let mut e = emitter();
        e.deliver(ResponseOutcome::Failure(LinkError::network("down")));
        assert_eq!(e.observer.0, vec!["error"]);

        let mut e = emitter();
        e.deliver(ResponseOutcome::Aborted);
        assert!(e.observer.0.is_empty());
        assert!(!e.gate.is_closed());
    }

    struct SlowObserver {
        entered: std::sync::mpsc::Sender<()>,
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl Observer for SlowObserver {
        fn next(&mut self, _value: FetchResult) {
            let _ = self.entered.send(());
            std::thread::sleep(Duration::from_millis(50));
            self.log.lock().push("next");
        }

        fn error(&mut self, _error: LinkError) {
            self.log.lock().push("error");
        }

        fn complete(&mut self) {
            self.log.lock().push("complete");
        }
    }

    #[test]
    fn test_unsubscribe_waits_for_running_callback() {
        let gate = Arc::new(Gate::default());
        let subscription = subscription(&gate);
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (entered, wait_entered) = std::sync::mpsc::channel();
        let mut e = Emitter::new(
            SlowObserver {
                entered,
                log: Arc::clone(&log),
            },
            gate,
        );

        let worker = std::thread::spawn(move || {
            e.next(FetchResult::default());
            e
        });
        wait_entered.recv().unwrap();
        subscription.unsubscribe();
        let seen_at_return = log.lock().clone();
        let mut e = worker.join().unwrap();

        assert_eq!(seen_at_return, vec!["next"]);
        assert!(!e.complete());
        assert!(!e.error(LinkError::network("late")));
        assert_eq!(*log.lock(), vec!["next"]);
    }

    struct UnsubscribingObserver {
        subscription: Subscription,
        log: Vec<&'static str>,
    }

    impl Observer for UnsubscribingObserver {
        fn next(&mut self, _value: FetchResult) {
            self.log.push("next");
            self.subscription.unsubscribe();
        }

        fn error(&mut self, _error: LinkError) {
            self.log.push("error");
        }

        fn complete(&mut self) {
            self.log.push("complete");
        }
    }

    #[test]
    fn test_observer_may_unsubscribe_from_callback() {
        let gate = Arc::new(Gate::default());
        let subscription = subscription(&gate);
        let signal = subscription.controller.signal();
        let mut e = Emitter::new(
            UnsubscribingObserver {
                subscription,
                log: Vec::new(),
            },
            gate,
        );

        e.deliver(ResponseOutcome::Success(FetchResult::default()));
        assert_eq!(e.observer.log, vec!["next"]);
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn test_observable_is_lazy() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let observable = Observable::new(move |_signal| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, LinkError>(FetchResult::default())
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        let result = observable.result().await;
        assert!(result.is_ok());
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_aborts_once() {
        let aborts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&aborts);
        let observable = Observable::new(move |signal: AbortSignal| async move {
            signal.aborted().await;
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<FetchResult, _>(LinkError::aborted())
        });

        let (mut rx, subscription) = observable.into_channel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(subscription.is_closed());

        assert!(rx.recv().await.is_none());
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropping_result_future_aborts() {
        let aborts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&aborts);
        let observable = Observable::new(move |signal: AbortSignal| async move {
            signal.aborted().await;
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<FetchResult, _>(LinkError::aborted())
        });

        let outcome = tokio::time::timeout(Duration::from_millis(20), observable.result()).await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }
}
