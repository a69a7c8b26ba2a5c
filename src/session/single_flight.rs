//! In-flight request register.
//!
//! At most one operation per key runs at a time. A caller that arrives while
//! an operation for its key is pending attaches to the pending operation's
//! shared handle and receives the same outcome instead of starting another.
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SharedOp<V> = Shared<BoxFuture<'static, V>>;

struct Slot<V> {
    /// Distinguishes this operation from a later one under the same key.
    id: u64,
    op: SharedOp<V>,
}

struct Register<K, V> {
    next_id: u64,
    slots: HashMap<K, Slot<V>>,
}

pub struct SingleFlight<K, V> {
    register: Arc<Mutex<Register<K, V>>>,
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            register: Arc::clone(&self.register),
        }
    }
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            register: Arc::new(Mutex::new(Register {
                next_id: 0,
                slots: HashMap::new(),
            })),
        }
    }
}

fn lock<K, V>(register: &Mutex<Register<K, V>>) -> MutexGuard<'_, Register<K, V>> {
    register.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release<K: Eq + Hash, V>(register: &Mutex<Register<K, V>>, key: &K, id: u64) {
    let mut register = lock(register);
    if register.slots.get(key).is_some_and(|slot| slot.id == id) {
        register.slots.remove(key);
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` under `key`, or join the operation already running there.
    ///
    /// `start` is only invoked when no operation for `key` is pending. It must
    /// not call back into this register. The slot is released as soon as the
    /// operation resolves or panics, before any caller observes the outcome,
    /// so the next call after completion always starts fresh.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let op = {
            let mut register = lock(&self.register);
            if let Some(slot) = register.slots.get(&key) {
                tracing::trace!(key = ?key, id = slot.id, "Joining in-flight operation");
                slot.op.clone()
            } else {
                let id = register.next_id;
                register.next_id = register.next_id.wrapping_add(1);

                let owner = Arc::clone(&self.register);
                let release_key = key.clone();
                let work = start();
                let op = async move {
                    // The slot holds this future, so it must be freed here
                    // on panic too; nothing else would ever drop it.
                    let outcome = AssertUnwindSafe(work).catch_unwind().await;
                    release(&owner, &release_key, id);
                    match outcome {
                        Ok(value) => value,
                        Err(panic) => std::panic::resume_unwind(panic),
                    }
                }
                .boxed()
                .shared();

                tracing::trace!(key = ?key, id, "Starting operation");
                register.slots.insert(
                    key,
                    Slot {
                        id,
                        op: op.clone(),
                    },
                );
                op
            }
        };
        op.await
    }

    /// Whether an operation for `key` is currently pending.
    pub fn in_flight(&self, key: &K) -> bool {
        lock(&self.register).slots.contains_key(key)
    }

    /// Number of pending operations across all keys.
    pub fn pending(&self) -> usize {
        lock(&self.register).slots.len()
    }
}
