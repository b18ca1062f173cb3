//! In-process event bus.
//!
//! Each logical execution context owns one FIFO queue. Inside a future
//! wrapped with [`EventBus::scope`] the bus of that scope is current. An
//! unscoped tokio task lazily gets a bus keyed by its task id, so it keeps
//! its queue when the runtime moves it between worker threads. Outside of
//! any task every thread lazily gets its own bus. Queues are never shared
//! implicitly between contexts: handing a bus to another context means
//! cloning the handle explicitly.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Condvar, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{self, Id as TaskId};
use tracing::{debug, error};

use crate::error::BusError;
use crate::event::EventRef;

tokio::task_local! {
    static TASK_BUS: EventBus;
}

thread_local! {
    static THREAD_BUS: RefCell<Option<EventBus>> = const { RefCell::new(None) };
}

static UNSCOPED_TASK_BUSES: LazyLock<Mutex<HashMap<TaskId, EventBus>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

struct Inner {
    queue: Mutex<VecDeque<EventRef>>,
    ready: Condvar,
    notify: Notify,
    capacity: Option<usize>,
}

/// Cloneable handle to one event queue.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A bus that refuses events beyond `capacity` queued ones.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(Some(capacity))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// The bus of the current execution context.
    pub fn current() -> Self {
        if let Ok(bus) = TASK_BUS.try_with(Clone::clone) {
            return bus;
        }
        match task::try_id() {
            Some(id) => Self::task_bus(id),
            None => THREAD_BUS.with(|cell| cell.borrow_mut().get_or_insert_with(EventBus::new).clone()),
        }
    }

    fn task_bus(id: TaskId) -> Self {
        let mut buses = UNSCOPED_TASK_BUSES.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bus) = buses.get(&id) {
            return bus.clone();
        }
        // Empty buses nobody holds are indistinguishable from fresh ones.
        buses.retain(|_, bus| Arc::strong_count(&bus.inner) > 1 || !bus.is_empty());
        debug!(task = %id, "event bus created for unscoped task");
        buses.entry(id).or_default().clone()
    }

    /// Run `fut` with `self` as the current bus.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        TASK_BUS.scope(self, fut).await
    }

    /// Run `f` with `self` as the current bus, outside of any async task.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        TASK_BUS.sync_scope(self, f)
    }

    /// Drop the bus of the current unscoped task, or of this thread outside
    /// of tasks; the next [`current`](Self::current) call starts from an
    /// empty queue. Tasks should call it once done with their events.
    pub fn reset_current() {
        match task::try_id() {
            Some(id) => {
                let mut buses = UNSCOPED_TASK_BUSES.lock().unwrap_or_else(PoisonError::into_inner);
                buses.remove(&id);
            }
            None => {
                THREAD_BUS.with(|cell| cell.borrow_mut().take());
            }
        }
    }

    pub fn same_queue(&self, other: &EventBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn queue(&self) -> Result<MutexGuard<'_, VecDeque<EventRef>>, BusError> {
        self.inner.queue.lock().map_err(|_| BusError::Poisoned)
    }

    fn push(&self, event: EventRef) -> Result<(), BusError> {
        let mut queue = self.queue()?;
        if let Some(capacity) = self.inner.capacity {
            if queue.len() >= capacity {
                return Err(BusError::Full { capacity });
            }
        }
        queue.push_back(event);
        drop(queue);
        self.inner.ready.notify_one();
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Enqueue `events` in order.
    ///
    /// A failure on one event is logged and publishing continues with the
    /// next one. Returns the number of events enqueued.
    pub fn publish<I>(&self, events: I) -> usize
    where
        I: IntoIterator<Item = EventRef>,
    {
        let mut published = 0;
        for event in events {
            let name = event.name();
            match self.push(event) {
                Ok(()) => {
                    debug!(event = name, "event published");
                    published += 1;
                }
                Err(err) => error!(event = name, error = %err, "Error while publishing event"),
            }
        }
        published
    }

    /// Dequeue the oldest event, if any.
    pub fn try_take_event(&self) -> Option<EventRef> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Dequeue the oldest event, blocking the calling thread until one is
    /// published.
    pub fn take_event_blocking(&self) -> EventRef {
        let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(event) = queue.pop_front() {
                return event;
            }
            queue = self.inner.ready.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`take_event_blocking`](Self::take_event_blocking) but gives up
    /// after `timeout`.
    pub fn take_event_timeout(&self, timeout: Duration) -> Option<EventRef> {
        let queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut queue, _) = self
            .inner
            .ready
            .wait_timeout_while(queue, timeout, |q| q.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        queue.pop_front()
    }

    /// Dequeue the oldest event, waiting asynchronously until one is
    /// published.
    pub async fn take_event(&self) -> EventRef {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(event) = self.try_take_event() {
                return event;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}
