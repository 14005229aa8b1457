use std::{
    collections::{HashSet, VecDeque},
    fmt,
    future::Future,
    ops::Deref,
    pin::Pin,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

type Init<T, E> = Box<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>
        + Send
        + Sync
        + 'static,
>;

/// Identity of a pooled connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GateKind {
    Creating,
    WaitingForRelease,
}

/// Admission token; the holder owns the matching [`watch::Sender`] and
/// closes it once done
struct Gate {
    kind: GateKind,
    opened: watch::Receiver<()>,
}

struct State<T> {
    all: HashSet<ConnectionId>,
    idle: VecDeque<(ConnectionId, Arc<T>)>,
    gate: Option<Gate>,
    waiter: Option<oneshot::Sender<()>>,
}

impl<T> State<T> {
    fn attach(&mut self, id: ConnectionId, object: Arc<T>) -> Result<(), ConnectionId> {
        if !self.all.contains(&id) {
            return Err(id);
        }

        self.idle.push_back((id, object));

        if let Some(waiter) = self.waiter.take() {
            // the waiter re-scans idle objects instead of taking this one
            let _ = waiter.send(());
        }

        Ok(())
    }
}

/// Clears the gate it was created for once dropped, waking every caller
/// suspended on it
struct GateGuard<T> {
    state: Arc<Mutex<State<T>>>,
    _opened: watch::Sender<()>,
}

impl<T> GateGuard<T> {
    fn install(state: &Arc<Mutex<State<T>>>, locked: &mut State<T>, kind: GateKind) -> Self {
        let (opened, receiver) = watch::channel(());
        locked.gate = Some(Gate {
            kind,
            opened: receiver,
        });
        Self {
            state: state.clone(),
            _opened: opened,
        }
    }
}

impl<T> Drop for GateGuard<T> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.gate = None;
        state.waiter = None;
    }
}

enum Step<T> {
    Ready(Reusable<T>),
    Wait(GateKind, watch::Receiver<()>),
    Create(GateGuard<T>),
    AwaitRelease(GateGuard<T>, oneshot::Receiver<()>),
}

/// Bounded pool of lazily created objects with single-flight creation
pub(crate) struct ObjectPool<T, E> {
    state: Arc<Mutex<State<T>>>,
    init: Init<T, E>,
    max_size: usize,
}

impl<T, E> ObjectPool<T, E> {
    pub(crate) fn new(
        max_size: usize,
        init: impl Fn() -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                all: HashSet::new(),
                idle: VecDeque::new(),
                gate: None,
                waiter: None,
            })),
            init: Box::new(init),
            max_size,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().all.len()
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub(crate) fn max_size(&self) -> usize {
        self.max_size
    }

    /// Leases an object, creating one if none is idle and the pool is not full
    ///
    /// Suspends while another caller creates an object or while the pool is
    /// exhausted. Only the caller that triggered a failed creation sees the
    /// error.
    pub(crate) async fn pull(&self) -> Result<Reusable<T>, E> {
        loop {
            let step = {
                let mut state = self.state.lock();
                self.next_step(&mut state)
            };

            match step {
                Step::Ready(object) => {
                    tracing::trace!(connection_id = %object.id, "leased idle connection");
                    return Ok(object);
                }
                Step::Wait(kind, mut opened) => {
                    tracing::trace!(?kind, "waiting on admission gate");
                    // the gate only ever closes; its outcome belongs to its holder
                    let _ = opened.changed().await;
                }
                Step::Create(gate) => {
                    let object = (self.init)().await?;
                    let id = ConnectionId::new();
                    let total = {
                        let mut state = self.state.lock();
                        state.all.insert(id);
                        state.all.len()
                    };
                    drop(gate);
                    tracing::debug!(connection_id = %id, total, "opened connection");
                    return Ok(Reusable::new(&self.state, id, Arc::new(object)));
                }
                Step::AwaitRelease(gate, released) => {
                    tracing::trace!(max_size = self.max_size, "pool exhausted, waiting for release");
                    let _ = released.await;
                    drop(gate);
                }
            }
        }
    }

    fn next_step(&self, state: &mut State<T>) -> Step<T> {
        if let Some(gate) = &state.gate {
            return Step::Wait(gate.kind, gate.opened.clone());
        }

        if let Some((id, object)) = state.idle.pop_front() {
            return Step::Ready(Reusable::new(&self.state, id, object));
        }

        if state.all.len() < self.max_size {
            Step::Create(GateGuard::install(&self.state, state, GateKind::Creating))
        } else {
            let gate = GateGuard::install(&self.state, state, GateKind::WaitingForRelease);
            let (waiter, released) = oneshot::channel();
            state.waiter = Some(waiter);
            Step::AwaitRelease(gate, released)
        }
    }

    /// Returns a leased object to the idle queue
    ///
    /// Fails if the object was not created by this pool. The rejected lease
    /// is then dropped and goes back to the pool that created it.
    pub(crate) fn release(&self, mut object: Reusable<T>) -> Result<(), ConnectionId> {
        let id = object.id;
        if !self.state.lock().all.contains(&id) {
            tracing::warn!(connection_id = %id, "rejected release of a foreign connection");
            return Err(id);
        }

        let Some(data) = object.data.take() else {
            return Ok(());
        };
        tracing::trace!(connection_id = %id, "released connection");
        self.state.lock().attach(id, data)
    }
}

/// Leased object, returned to the pool that created it when dropped
pub struct Reusable<T> {
    pool: Weak<Mutex<State<T>>>,
    id: ConnectionId,
    data: Option<Arc<T>>,
}

impl<T> Reusable<T> {
    fn new(pool: &Arc<Mutex<State<T>>>, id: ConnectionId, data: Arc<T>) -> Self {
        Self {
            pool: Arc::downgrade(pool),
            id,
            data: Some(data),
        }
    }

    /// Identity of the leased connection
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn shared(&self) -> Arc<T> {
        Arc::clone(self.data.as_ref().expect(DATA_MUST_CONTAIN_SOME))
    }
}

const DATA_MUST_CONTAIN_SOME: &str = "data must always contain a [Some] value";

impl<T> Deref for Reusable<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data.as_deref().expect(DATA_MUST_CONTAIN_SOME)
    }
}

impl<T> fmt::Debug for Reusable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reusable").field("id", &self.id).finish()
    }
}

impl<T> Drop for Reusable<T> {
    fn drop(&mut self) {
        let (Some(data), Some(pool)) = (self.data.take(), self.pool.upgrade()) else {
            return;
        };
        tracing::trace!(connection_id = %self.id, "released connection");
        // a lease always belongs to the pool it points to
        let _ = pool.lock().attach(self.id, data);
    }
}
