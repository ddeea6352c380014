// Resource manager: centralizes connection lifetime so a disposal
// callback running in another task (cooperative switch mid-dispose)
// never reaches through a dangling pointer. Generalizes the ad hoc
// `HashMap<u64, ...>` + `Mutex` registries the teacher builds per
// concern (server/status.rs's `RtmpChannelStatus::players`, server/
// ip_count.rs) into one reusable, generic store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::runtime::{CondVar, Interrupt};

/// Number of direct-mapped fast-id slots. A collision degrades that slot
/// to the hash-map fallback permanently; it is not worth reclaiming.
const FAST_ID_SLOTS: usize = 4096;

/// Observes removals from a `ResourceManager`. Both methods default to
/// doing nothing, so a subscriber only implements the hook it needs.
pub trait ResourceObserver<T>: Send + Sync {
    /// Called synchronously from `remove`, before the resource becomes
    /// unreachable through `find_by_*`. May still safely call back into
    /// the manager (e.g. to look up sibling resources).
    fn on_before_dispose(&self, _resource: &Arc<T>) {}

    /// Called by the sweep task, once per zombie, just before it is
    /// dropped.
    fn on_disposing(&self, _resource: &Arc<T>) {}
}

struct Entry<T> {
    id: u64,
    fast_id: Option<u64>,
    name: Option<String>,
    resource: Arc<T>,
}

#[derive(Clone, Copy)]
enum FastSlot {
    Empty,
    Occupied(u64, u64),
    Unavailable,
}

struct Inner<T> {
    next_auto_id: u64,
    by_id: HashMap<u64, Entry<T>>,
    by_name: HashMap<String, u64>,
    fast_slots: Vec<FastSlot>,
    fast_fallback: HashMap<u64, u64>,
    zombies: Vec<Entry<T>>,
    dispose_depth: u32,
    pending_unsubscribes: HashSet<u64>,
    observers: Vec<(u64, Arc<dyn ResourceObserver<T>>)>,
    next_observer_id: u64,
}

impl<T> Inner<T> {
    fn new() -> Inner<T> {
        Inner {
            next_auto_id: 1,
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            fast_slots: vec![FastSlot::Empty; FAST_ID_SLOTS],
            fast_fallback: HashMap::new(),
            zombies: Vec::new(),
            dispose_depth: 0,
            pending_unsubscribes: HashSet::new(),
            observers: Vec::new(),
            next_observer_id: 1,
        }
    }

    fn slot_index(fast_id: u64) -> usize {
        ((fast_id ^ (fast_id >> 32)) as usize) % FAST_ID_SLOTS
    }

    fn place_fast_slot(&mut self, fast_id: u64, id: u64) {
        let idx = Self::slot_index(fast_id);
        match self.fast_slots[idx] {
            FastSlot::Empty => {
                self.fast_slots[idx] = FastSlot::Occupied(fast_id, id);
            }
            FastSlot::Occupied(existing_fast_id, existing_id) => {
                if existing_fast_id == fast_id {
                    self.fast_fallback.insert(fast_id, id);
                } else {
                    self.fast_fallback.insert(existing_fast_id, existing_id);
                    self.fast_fallback.insert(fast_id, id);
                    self.fast_slots[idx] = FastSlot::Unavailable;
                }
            }
            FastSlot::Unavailable => {
                self.fast_fallback.insert(fast_id, id);
            }
        }
    }

    fn clear_fast_slot(&mut self, fast_id: u64, id: u64) {
        let idx = Self::slot_index(fast_id);
        if let FastSlot::Occupied(existing_fast_id, existing_id) = self.fast_slots[idx] {
            if existing_fast_id == fast_id && existing_id == id {
                self.fast_slots[idx] = FastSlot::Empty;
            }
        }
        self.fast_fallback.remove(&fast_id);
    }

    fn find_by_fast_id(&self, fast_id: u64) -> Option<&Entry<T>> {
        let idx = Self::slot_index(fast_id);
        match self.fast_slots[idx] {
            FastSlot::Occupied(existing_fast_id, id) if existing_fast_id == fast_id => {
                self.by_id.get(&id)
            }
            FastSlot::Unavailable => self
                .fast_fallback
                .get(&fast_id)
                .and_then(|id| self.by_id.get(id)),
            _ => None,
        }
    }
}

/// Generic connection registry: one producer inserts, many callers look
/// up by id/fast-id/name/index, and `remove` defers the actual drop to a
/// sweep task so an in-flight disposal callback never outlives the
/// object it references.
pub struct ResourceManager<T> {
    inner: Mutex<Inner<T>>,
    sweep_cond: CondVar,
}

impl<T> ResourceManager<T> {
    pub fn new() -> Arc<ResourceManager<T>> {
        Arc::new(ResourceManager {
            inner: Mutex::new(Inner::new()),
            sweep_cond: CondVar::new(),
        })
    }

    /// Registers `resource` under an auto-assigned id.
    pub async fn add(&self, resource: Arc<T>) -> u64 {
        let mut inner = self.inner.lock().await;
        let id = inner.next_auto_id;
        inner.next_auto_id += 1;
        inner.by_id.insert(
            id,
            Entry {
                id,
                fast_id: None,
                name: None,
                resource,
            },
        );
        id
    }

    pub async fn add_with_id(&self, id: u64, resource: Arc<T>) {
        let mut inner = self.inner.lock().await;
        inner.next_auto_id = inner.next_auto_id.max(id + 1);
        inner.by_id.insert(
            id,
            Entry {
                id,
                fast_id: None,
                name: None,
                resource,
            },
        );
    }

    pub async fn add_with_fast_id(&self, fast_id: u64, resource: Arc<T>) -> u64 {
        let mut inner = self.inner.lock().await;
        let id = inner.next_auto_id;
        inner.next_auto_id += 1;
        inner.place_fast_slot(fast_id, id);
        inner.by_id.insert(
            id,
            Entry {
                id,
                fast_id: Some(fast_id),
                name: None,
                resource,
            },
        );
        id
    }

    pub async fn add_with_name(&self, name: String, resource: Arc<T>) -> u64 {
        let mut inner = self.inner.lock().await;
        let id = inner.next_auto_id;
        inner.next_auto_id += 1;
        inner.by_name.insert(name.clone(), id);
        inner.by_id.insert(
            id,
            Entry {
                id,
                fast_id: None,
                name: Some(name),
                resource,
            },
        );
        id
    }

    pub async fn find_by_id(&self, id: u64) -> Option<Arc<T>> {
        self.inner.lock().await.by_id.get(&id).map(|e| e.resource.clone())
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Arc<T>> {
        let inner = self.inner.lock().await;
        let id = inner.by_name.get(name)?;
        inner.by_id.get(id).map(|e| e.resource.clone())
    }

    pub async fn find_by_fast_id(&self, fast_id: u64) -> Option<Arc<T>> {
        self.inner
            .lock()
            .await
            .find_by_fast_id(fast_id)
            .map(|e| e.resource.clone())
    }

    /// Returns the resource at the given position in iteration order.
    /// Linear in `index`; intended for small admin/status listings, not
    /// hot-path lookups.
    pub async fn at(&self, index: usize) -> Option<Arc<T>> {
        self.inner
            .lock()
            .await
            .by_id
            .values()
            .nth(index)
            .map(|e| e.resource.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_id.len()
    }

    /// Moves `id` to the zombie queue, runs every subscribed
    /// `on_before_dispose` callback, and wakes the sweep task. The
    /// resource stops being reachable through `find_by_*`/`at` the
    /// moment this returns, but is not dropped until the sweep runs.
    pub async fn remove(&self, id: u64) -> Result<()> {
        let (entry, observers) = {
            let mut inner = self.inner.lock().await;

            if inner.zombies.iter().any(|z| z.id == id) {
                return Ok(());
            }

            let entry = inner
                .by_id
                .remove(&id)
                .ok_or_else(|| Error::not_found(format!("no resource with id {id}")))?;

            if let Some(name) = &entry.name {
                inner.by_name.remove(name);
            }
            if let Some(fast_id) = entry.fast_id {
                inner.clear_fast_slot(fast_id, id);
            }

            inner.dispose_depth += 1;
            let observers: Vec<_> = inner.observers.iter().map(|(_, o)| o.clone()).collect();
            (entry, observers)
        };

        for observer in &observers {
            observer.on_before_dispose(&entry.resource);
        }

        {
            let mut inner = self.inner.lock().await;
            inner.zombies.push(entry);
            inner.dispose_depth -= 1;
            if inner.dispose_depth == 0 {
                let pending = std::mem::take(&mut inner.pending_unsubscribes);
                inner.observers.retain(|(oid, _)| !pending.contains(oid));
            }
        }

        self.sweep_cond.signal();
        Ok(())
    }

    pub async fn subscribe(&self, observer: Arc<dyn ResourceObserver<T>>) -> u64 {
        let mut inner = self.inner.lock().await;
        let id = inner.next_observer_id;
        inner.next_observer_id += 1;
        inner.observers.push((id, observer));
        id
    }

    pub async fn unsubscribe(&self, subscription_id: u64) {
        let mut inner = self.inner.lock().await;
        if inner.dispose_depth > 0 {
            inner.pending_unsubscribes.insert(subscription_id);
        } else {
            inner.observers.retain(|(oid, _)| *oid != subscription_id);
        }
    }

    /// Runs the sweep loop until interrupted: wait for a signal, drain
    /// the zombie queue, call `on_disposing` for each subscriber against
    /// every zombie, then let them drop. Meant to be driven by a single
    /// long-lived task per manager (see `spawn_sweeper`).
    pub async fn sweep_once(&self, interrupt: &Interrupt) -> Result<()> {
        self.sweep_cond.wait(interrupt).await?;

        let (zombies, observers) = {
            let mut inner = self.inner.lock().await;
            let zombies = std::mem::take(&mut inner.zombies);
            let observers: Vec<_> = inner.observers.iter().map(|(_, o)| o.clone()).collect();
            (zombies, observers)
        };

        for entry in &zombies {
            for observer in &observers {
                observer.on_disposing(&entry.resource);
            }
        }

        drop(zombies);
        Ok(())
    }
}

impl<T: Send + Sync + 'static> ResourceManager<T> {
    /// Spawns the sweep coroutine as its own task, looping `sweep_once`
    /// until interrupted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> crate::runtime::Task<()> {
        let manager = self.clone();
        crate::runtime::spawn(move |interrupt| async move {
            loop {
                match manager.sweep_once(&interrupt).await {
                    Ok(()) => {}
                    Err(e) if e.kind == crate::error::ErrorKind::Interrupted => return,
                    Err(_) => return,
                }
            }
        })
    }
}

/// Monotonic id generator for callers that want a fast-id namespace
/// distinct from the manager's own auto-assigned ids (e.g. per-process
/// session ids handed out before the session is registered).
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> IdGenerator {
        IdGenerator { next: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> IdGenerator {
        IdGenerator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Probe {
        value: u32,
    }

    struct Flag(Arc<AtomicBool>);

    impl ResourceObserver<Probe> for Flag {
        fn on_before_dispose(&self, _resource: &Arc<Probe>) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_add_and_find_by_id() {
        let mgr: Arc<ResourceManager<Probe>> = ResourceManager::new();
        let id = mgr.add(Arc::new(Probe { value: 7 })).await;

        let found = mgr.find_by_id(id).await.unwrap();
        assert_eq!(found.value, 7);
    }

    #[tokio::test]
    async fn test_find_by_name_and_fast_id() {
        let mgr: Arc<ResourceManager<Probe>> = ResourceManager::new();
        mgr.add_with_name("alice".to_string(), Arc::new(Probe { value: 1 })).await;
        mgr.add_with_fast_id(42, Arc::new(Probe { value: 2 })).await;

        assert_eq!(mgr.find_by_name("alice").await.unwrap().value, 1);
        assert_eq!(mgr.find_by_fast_id(42).await.unwrap().value, 2);
        assert!(mgr.find_by_name("bob").await.is_none());
    }

    #[tokio::test]
    async fn test_fast_id_collision_falls_back_to_hash_map() {
        let mgr: Arc<ResourceManager<Probe>> = ResourceManager::new();
        // two fast ids that collide on the same slot index
        let a = 5u64;
        let b = a + FAST_ID_SLOTS as u64;

        mgr.add_with_fast_id(a, Arc::new(Probe { value: 10 })).await;
        mgr.add_with_fast_id(b, Arc::new(Probe { value: 20 })).await;

        assert_eq!(mgr.find_by_fast_id(a).await.unwrap().value, 10);
        assert_eq!(mgr.find_by_fast_id(b).await.unwrap().value, 20);
    }

    #[tokio::test]
    async fn test_remove_runs_observer_and_hides_resource() {
        let mgr: Arc<ResourceManager<Probe>> = ResourceManager::new();
        let id = mgr.add(Arc::new(Probe { value: 3 })).await;

        let called = Arc::new(AtomicBool::new(false));
        mgr.subscribe(Arc::new(Flag(called.clone()))).await;

        mgr.remove(id).await.unwrap();

        assert!(called.load(Ordering::SeqCst));
        assert!(mgr.find_by_id(id).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_not_found() {
        let mgr: Arc<ResourceManager<Probe>> = ResourceManager::new();
        let err = mgr.remove(999).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_sweep_once_drains_zombies_and_notifies() {
        let mgr: Arc<ResourceManager<Probe>> = ResourceManager::new();
        let id = mgr.add(Arc::new(Probe { value: 9 })).await;

        let seen = Arc::new(AtomicBool::new(false));
        mgr.subscribe(Arc::new(Flag(seen.clone()))).await;

        let sweeper = mgr.clone();
        let interrupt = crate::runtime::spawn(|i| async move { i }).join().await.unwrap();
        let sweep_task = crate::runtime::spawn(move |i| async move { sweeper.sweep_once(&i).await });

        mgr.remove(id).await.unwrap();
        sweep_task.join().await.unwrap().unwrap();

        assert!(seen.load(Ordering::SeqCst));
        let _ = interrupt;
    }
}
