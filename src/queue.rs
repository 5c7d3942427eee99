//! Serialized executor for every state-mutating operation.
//!
//! A [`TaskQueue`] owns a piece of state and a single worker task. Work is
//! submitted as closures receiving `&mut S`; the worker runs them one at a
//! time in submission order, so the state needs no locks:
//!
//! ```text
//! watchers ─┐
//!           ├─► normal lane ─┐
//! UI calls ─┘                ├─► worker (owns S) ─► one unit at a time
//!            idle lane ──────┘   (idle only when normal is empty)
//! ```
//!
//! Submission never blocks and never awaits: the unit is enqueued before
//! `submit` returns, and the returned [`TaskHandle`] resolves once the unit
//! has run. Errors and panics inside a unit are delivered to that handle
//! only.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::BridgeError;

/// Type-erased unit of work as stored in a lane.
type Job<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

/// Pins the closure's signature to the higher-ranked job shape.
fn job<S, F>(f: F) -> Job<S>
where
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// Wraps a user closure so its result (or panic) lands in a oneshot.
fn wrap<S, T, F>(f: F) -> (Job<S>, TaskHandle<T>)
where
    S: Send + 'static,
    T: Send + 'static,
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T, BridgeError>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job = job(move |state: &mut S| {
        Box::pin(async move {
            let outcome = match std::panic::catch_unwind(AssertUnwindSafe(move || f(state))) {
                Ok(unit) => AssertUnwindSafe(unit).catch_unwind().await,
                Err(payload) => Err(payload),
            };
            let result = outcome.unwrap_or_else(|payload| {
                let message = panic_message(&*payload);
                tracing::error!(%message, "unit of work panicked");
                Err(BridgeError::TaskPanicked { message })
            });
            // The submitter may have dropped its handle; that is fine.
            let _ = tx.send(result);
        })
    });
    (job, TaskHandle { rx })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Future resolving to the result of a submitted unit of work.
///
/// Dropping the handle does not cancel the unit; it still runs, and its
/// result is discarded.
#[must_use = "the unit runs regardless, but its result is only visible through the handle"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, BridgeError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, BridgeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::QueueClosed)))
    }
}

/// Handle for scheduling work in the idle lane.
///
/// Idle units run only when no normal unit is waiting. The state owned by
/// the queue may keep one of these to defer follow-up work (see
/// [`TaskQueue::spawn_with`]) without keeping the worker alive.
pub struct IdleScheduler<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
    delay: Duration,
}

impl<S> Clone for IdleScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            delay: self.delay,
        }
    }
}

impl<S: Send + 'static> IdleScheduler<S> {
    /// Returns a scheduler that waits `delay` before enqueuing each unit.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Submits a unit of work to the idle lane.
    pub fn submit<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T, BridgeError>> + Send + 'static,
    {
        let (job, handle) = wrap(f);
        if self.delay.is_zero() {
            let _ = self.tx.send(job);
        } else {
            let tx = self.tx.clone();
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(job);
            });
        }
        handle
    }
}

/// Single-consumer, first-in-first-out executor owning a state value.
///
/// Cloning the queue is cheap; every clone submits to the same worker. The
/// worker stops once every clone has been dropped and the normal lane has
/// been drained.
pub struct TaskQueue<S> {
    normal: mpsc::UnboundedSender<Job<S>>,
    idle: IdleScheduler<S>,
}

impl<S> Clone for TaskQueue<S> {
    fn clone(&self) -> Self {
        Self {
            normal: self.normal.clone(),
            idle: self.idle.clone(),
        }
    }
}

impl<S: Send + 'static> TaskQueue<S> {
    /// Spawns a worker owning `state`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(state: S) -> (Self, JoinHandle<()>) {
        Self::spawn_with(|_| state)
    }

    /// Spawns a worker owning the state built by `init`.
    ///
    /// `init` receives an [`IdleScheduler`] the state can keep in order to
    /// defer work from inside a running unit.
    pub fn spawn_with<F>(init: F) -> (Self, JoinHandle<()>)
    where
        F: FnOnce(IdleScheduler<S>) -> S,
    {
        let (normal_tx, normal_rx) = mpsc::unbounded_channel();
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        let idle = IdleScheduler {
            tx: idle_tx,
            delay: Duration::ZERO,
        };

        let state = init(idle.clone());
        let worker = tokio::spawn(run_worker(state, normal_rx, idle_rx));

        (
            Self {
                normal: normal_tx,
                idle,
            },
            worker,
        )
    }

    /// Submits a unit of work to the normal lane.
    ///
    /// The unit is enqueued before this returns; units submitted from one
    /// thread run in the order they were submitted.
    ///
    /// # Example
    ///
    /// ```
    /// use bridge_audio::TaskQueue;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let (queue, _worker) = TaskQueue::spawn(Vec::<u32>::new());
    ///
    /// let first = queue.submit(|v| Box::pin(async move { v.push(1); Ok(()) }));
    /// let len = queue.submit(|v| Box::pin(async move { Ok(v.len()) }));
    ///
    /// first.await.unwrap();
    /// assert_eq!(len.await.unwrap(), 1);
    /// # }
    /// ```
    pub fn submit<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T, BridgeError>> + Send + 'static,
    {
        let (job, handle) = wrap(f);
        // On a closed lane the job (and its sender) is dropped, so the
        // handle resolves to QueueClosed.
        let _ = self.normal.send(job);
        handle
    }

    /// Submits a unit of work to the idle lane.
    pub fn submit_idle<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T, BridgeError>> + Send + 'static,
    {
        self.idle.submit(f)
    }

    /// Returns `true` if the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.normal.is_closed()
    }
}

async fn run_worker<S>(
    mut state: S,
    mut normal: mpsc::UnboundedReceiver<Job<S>>,
    mut idle: mpsc::UnboundedReceiver<Job<S>>,
) {
    loop {
        let job = tokio::select! {
            biased;
            job = normal.recv() => match job {
                Some(job) => job,
                None => break,
            },
            Some(job) = idle.recv() => job,
        };
        job(&mut state).await;
    }
    tracing::debug!("task queue worker stopped");
}
