//! Debounce with cancel and force.
//!
//! A [`RequestCoalescer`] turns a burst of calls into a single invocation of
//! the wrapped operation: each call to [`RequestCoalescer::debounced`]
//! supersedes the previous pending one, and the operation only runs once no
//! new call has arrived for `wait`. Superseded and cancelled calls resolve to
//! `None`, which is distinct from a successful empty result.
//!
//! The pending call is an explicit state machine:
//!
//! ```text
//! Idle --debounced--> Pending --fire/force--> Idle (invocation running)
//!                     Pending --cancel/debounced/drop--> Idle (caller gets None)
//! ```
//!
//! An invocation that has already started is never aborted.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::metrics;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, trace};

type CoalescedFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, T> + Send + Sync>;

struct Pending<A, T> {
    timer: JoinHandle<()>,
    args: A,
    reply: oneshot::Sender<Option<T>>,
    generation: u64,
}

enum State<A, T> {
    Idle,
    Pending(Pending<A, T>),
}

struct Inner<A, T> {
    state: State<A, T>,
    next_generation: u64,
}

impl<A, T> Inner<A, T> {
    fn take_pending(&mut self) -> Option<Pending<A, T>> {
        match mem::replace(&mut self.state, State::Idle) {
            State::Pending(pending) => Some(pending),
            State::Idle => None,
        }
    }
}

/// Collapses bursts of calls into one invocation of the most recent intent.
pub struct RequestCoalescer<A, T> {
    wait: Duration,
    func: CoalescedFn<A, T>,
    inner: Arc<Mutex<Inner<A, T>>>,
}

impl<A, T> RequestCoalescer<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    pub fn new<F, Fut>(wait: Duration, func: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let func: CoalescedFn<A, T> = Arc::new(move |args| func(args).boxed());
        Self {
            wait,
            func,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Idle,
                next_generation: 0,
            })),
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Schedules `args` to run after `wait` of quiescence, superseding any
    /// pending call.
    ///
    /// The call is scheduled immediately, not when the returned future is
    /// first polled. The future resolves to `Some` with the operation's
    /// output, or `None` if this call was superseded or cancelled.
    /// Must be called within a tokio runtime.
    pub fn debounced(&self, args: A) -> impl Future<Output = Option<T>> + Send + 'static {
        let (reply, rx) = oneshot::channel();

        {
            let mut inner = self.inner.lock();
            if let Some(previous) = inner.take_pending() {
                trace!(generation = previous.generation, "Superseding pending call");
                previous.timer.abort();
                let _ = previous.reply.send(None);
                metrics::record_coalescer_event("superseded");
            }

            inner.next_generation += 1;
            let generation = inner.next_generation;
            let timer = tokio::spawn(fire_after(
                Arc::downgrade(&self.inner),
                self.func.clone(),
                self.wait,
                generation,
            ));

            inner.state = State::Pending(Pending {
                timer,
                args,
                reply,
                generation,
            });
        }

        async move { rx.await.ok().flatten() }
    }

    /// Cancels the pending call, if any. Its caller receives `None`.
    pub fn cancel(&self) {
        let pending = self.inner.lock().take_pending();
        if let Some(pending) = pending {
            trace!(generation = pending.generation, "Cancelling pending call");
            pending.timer.abort();
            let _ = pending.reply.send(None);
            metrics::record_coalescer_event("cancelled");
        }
    }

    /// Runs the pending call now instead of waiting for the timer.
    ///
    /// The result is delivered to the pending caller. Returns `false` when
    /// nothing was pending.
    pub fn force(&self) -> bool {
        let pending = self.inner.lock().take_pending();
        let Some(pending) = pending else {
            return false;
        };

        trace!(generation = pending.generation, "Forcing pending call");
        pending.timer.abort();
        metrics::record_coalescer_event("forced");
        tokio::spawn(invoke(self.func.clone(), pending.args, pending.reply));
        true
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock().state, State::Pending(_))
    }
}

impl<A, T> Drop for RequestCoalescer<A, T> {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.lock().take_pending() {
            pending.timer.abort();
            let _ = pending.reply.send(None);
        }
    }
}

async fn fire_after<A, T>(
    inner: Weak<Mutex<Inner<A, T>>>,
    func: CoalescedFn<A, T>,
    wait: Duration,
    generation: u64,
) {
    tokio::time::sleep(wait).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };

    let pending = {
        let mut inner = inner.lock();
        let current = matches!(&inner.state, State::Pending(p) if p.generation == generation);
        if current {
            inner.take_pending()
        } else {
            None
        }
    };

    if let Some(pending) = pending {
        trace!(generation, "Timer fired");
        metrics::record_coalescer_event("fired");
        invoke(func, pending.args, pending.reply).await;
    }
}

async fn invoke<A, T>(func: CoalescedFn<A, T>, args: A, reply: oneshot::Sender<Option<T>>) {
    let outcome = AssertUnwindSafe(async move { func(args).await })
        .catch_unwind()
        .await;

    match outcome {
        // The caller may have gone away; the invocation still ran to completion.
        Ok(output) => {
            let _ = reply.send(Some(output));
        }
        Err(_) => {
            // Dropping `reply` resolves the caller to `None`.
            error!("Coalesced call panicked; its caller receives no result");
            metrics::record_coalescer_event("panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Instant};
    use tokio_test::{assert_pending, assert_ready_eq, task};

    type Calls = Arc<Mutex<Vec<(u32, Instant)>>>;

    fn doubler(wait_ms: u64) -> (RequestCoalescer<u32, u32>, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let coalescer = RequestCoalescer::new(Duration::from_millis(wait_ms), move |x: u32| {
            let log = log.clone();
            async move {
                log.lock().push((x, Instant::now()));
                x * 2
            }
        });
        (coalescer, calls)
    }

    fn invoked_with(calls: &Calls) -> Vec<u32> {
        calls.lock().iter().map(|(x, _)| *x).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_only_the_last_call() {
        let (coalescer, calls) = doubler(100);

        let first = coalescer.debounced(1);
        let second = coalescer.debounced(2);
        let third = coalescer.debounced(3);

        assert_eq!(first.await, None);
        assert_eq!(second.await, None);
        assert_eq!(third.await, Some(6));
        assert_eq!(invoked_with(&calls), vec![3]);
        assert!(!coalescer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_call_restarts_the_wait() {
        let (coalescer, calls) = doubler(100);
        let start = Instant::now();

        let _first = coalescer.debounced(1);
        sleep(Duration::from_millis(60)).await;
        let second = coalescer.debounced(2);

        assert_eq!(second.await, Some(4));
        let (_, ran_at) = calls.lock()[0];
        let elapsed = ran_at - start;
        assert!(elapsed >= Duration::from_millis(160));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_invocation() {
        let (coalescer, calls) = doubler(100);

        let pending = coalescer.debounced(1);
        assert!(coalescer.is_pending());
        coalescer.cancel();
        coalescer.cancel();

        assert_eq!(pending.await, None);
        sleep(Duration::from_millis(500)).await;
        assert!(calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_runs_immediately_once() {
        let (coalescer, calls) = doubler(100);
        let start = Instant::now();

        let pending = coalescer.debounced(5);
        assert!(coalescer.force());
        assert_eq!(pending.await, Some(10));
        assert!(calls.lock()[0].1 - start < Duration::from_millis(100));

        sleep(Duration::from_millis(500)).await;
        assert_eq!(invoked_with(&calls), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_when_idle_is_noop() {
        let (coalescer, calls) = doubler(100);
        assert!(!coalescer.force());

        let done = coalescer.debounced(1);
        assert_eq!(done.await, Some(2));
        assert!(!coalescer.force());
        assert_eq!(invoked_with(&calls), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_invocation_is_not_aborted() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let coalescer = RequestCoalescer::new(Duration::from_millis(100), move |x: u32| {
            let log = log.clone();
            async move {
                sleep(Duration::from_secs(1)).await;
                log.lock().push(x);
                x
            }
        });

        let first = coalescer.debounced(1);
        sleep(Duration::from_millis(150)).await;
        // The first call is running now; superseding only affects pending calls.
        let second = coalescer.debounced(2);
        coalescer.cancel();

        assert_eq!(first.await, Some(1));
        assert_eq!(second.await, None);
        assert_eq!(*calls.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiting_caller() {
        let (coalescer, _calls) = doubler(10_000);

        let mut pending = task::spawn(coalescer.debounced(1));
        assert_pending!(pending.poll());

        coalescer.cancel();
        assert!(pending.is_woken());
        assert_ready_eq!(pending.poll(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_call_is_logged_and_coalescer_keeps_working() {
        let coalescer = RequestCoalescer::new(Duration::from_millis(100), |x: u32| async move {
            if x == 0 {
                panic!("refusing zero");
            }
            x * 2
        });
        let panicked_before = metrics::COALESCER_EVENTS.with_label_values(&["panicked"]).get();

        let failed = coalescer.debounced(0);
        assert!(coalescer.force());
        assert_eq!(failed.await, None);
        assert!(metrics::COALESCER_EVENTS.with_label_values(&["panicked"]).get() > panicked_before);

        assert_eq!(coalescer.debounced(4).await, Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_call() {
        let (coalescer, calls) = doubler(100);

        let pending = coalescer.debounced(1);
        drop(coalescer);

        assert_eq!(pending.await, None);
        sleep(Duration::from_millis(500)).await;
        assert!(calls.lock().is_empty());
    }
}
