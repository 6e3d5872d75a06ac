use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Which pool a handle's index belongs to
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ColorBuffer,
    DepthBuffer,
    GpuBuffer,
    RootSignature,
    /// Graphics, meshlet or compute pipeline
    Pipeline,
    DescriptorSet,
}

/// Anything that hands out handles and takes their slots back
pub trait HandleOwner: Send + Sync {
    fn destroy_handle(&self, index: u32, kind: ResourceKind);
}

pub struct HandleInner {
    index: u32,
    kind: ResourceKind,
    owner: Weak<dyn HandleOwner>,
}

/// Shared, reference counted handle. The slot is released when the last clone drops.
pub type ResourceHandle = Arc<HandleInner>;

impl HandleInner {
    pub fn new(index: u32, kind: ResourceKind, owner: Weak<dyn HandleOwner>) -> ResourceHandle {
        Arc::new(Self { index, kind, owner })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl fmt::Debug for HandleInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.destroy_handle(self.index, self.kind);
        }
    }
}

/// Creation parameters and native state of one live slot
pub struct Slot<C, H> {
    pub cold: C,
    pub hot: H,
}

struct SlotPoolInner<C, H> {
    free_list: VecDeque<u32>,
    slots: Vec<Option<Slot<C, H>>>,
}

/// Fixed capacity pool of slots with a FIFO free list
pub struct SlotPool<C, H> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<SlotPoolInner<C, H>>,
}

impl<C, H> SlotPool<C, H> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let free_list = (0..capacity as u32).collect();
        let slots = (0..capacity).map(|_| None).collect();

        Self {
            name,
            capacity,
            inner: Mutex::new(SlotPoolInner { free_list, slots }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotPoolInner<C, H>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Panics when the pool is full, pools never grow
    pub fn insert(&self, cold: C, hot: H) -> u32 {
        let mut inner = self.lock();
        let Some(index) = inner.free_list.pop_front() else {
            panic!("{} pool exhausted, all {} slots are live", self.name, self.capacity);
        };
        inner.slots[index as usize] = Some(Slot { cold, hot });
        index
    }

    /// The slot is dropped after the lock is released
    pub fn remove(&self, index: u32) -> Option<Slot<C, H>> {
        let mut inner = self.lock();
        let slot = inner.slots.get_mut(index as usize)?.take();
        if slot.is_some() {
            inner.free_list.push_back(index);
        }
        drop(inner);
        slot
    }

    pub fn with<R>(&self, index: u32, f: impl FnOnce(&Slot<C, H>) -> R) -> Option<R> {
        let inner = self.lock();
        inner.slots.get(index as usize)?.as_ref().map(f)
    }

    pub fn with_mut<R>(&self, index: u32, f: impl FnOnce(&mut Slot<C, H>) -> R) -> Option<R> {
        let mut inner = self.lock();
        inner.slots.get_mut(index as usize)?.as_mut().map(f)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn live_count(&self) -> usize {
        self.capacity - self.lock().free_list.len()
    }

    pub fn is_live(&self, index: u32) -> bool {
        self.with(index, |_| ()).is_some()
    }

    pub fn free_indices(&self) -> Vec<u32> {
        self.lock().free_list.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct PoolOwner {
        pool: SlotPool<String, u64>,
    }

    impl HandleOwner for PoolOwner {
        fn destroy_handle(&self, index: u32, kind: ResourceKind) {
            assert_eq!(kind, ResourceKind::GpuBuffer);
            self.pool.remove(index);
        }
    }

    fn create(owner: &Arc<PoolOwner>, name: &str) -> ResourceHandle {
        let index = owner.pool.insert(name.to_string(), 0);
        let weak: Weak<dyn HandleOwner> = Arc::downgrade(owner) as Weak<dyn HandleOwner>;
        HandleInner::new(index, ResourceKind::GpuBuffer, weak)
    }

    fn assert_partition(owner: &PoolOwner, live: &[ResourceHandle]) {
        let live_indices: HashSet<u32> = live.iter().map(|h| h.index()).collect();
        assert_eq!(live_indices.len(), live.len(), "two live handles share an index");

        let free: HashSet<u32> = owner.pool.free_indices().into_iter().collect();
        assert!(live_indices.is_disjoint(&free));
        assert_eq!(live_indices.len() + free.len(), owner.pool.capacity());
    }

    #[test]
    fn live_indices_are_the_complement_of_the_free_list() {
        let owner = Arc::new(PoolOwner { pool: SlotPool::new("test", 8) });
        let mut live = Vec::new();

        for round in 0..5 {
            for i in 0..3 {
                live.push(create(&owner, &format!("buffer{round}_{i}")));
                assert_partition(&owner, &live);
            }
            live.remove(round % live.len());
            assert_partition(&owner, &live);
            if live.len() > 4 {
                live.truncate(2);
                assert_partition(&owner, &live);
            }
        }

        live.clear();
        assert_eq!(owner.pool.live_count(), 0);
    }

    #[test]
    fn released_index_goes_to_the_back_of_the_queue() {
        let owner = Arc::new(PoolOwner { pool: SlotPool::new("test", 4) });
        let first = create(&owner, "a");
        assert_eq!(first.index(), 0);
        drop(first);

        let next = create(&owner, "b");
        assert_eq!(next.index(), 1);
        assert!(!owner.pool.is_live(0));
    }

    #[test]
    fn clones_keep_the_slot_alive() {
        let owner = Arc::new(PoolOwner { pool: SlotPool::new("test", 2) });
        let handle = create(&owner, "shared");
        let clone = handle.clone();
        drop(handle);
        assert!(owner.pool.is_live(clone.index()));
        drop(clone);
        assert_eq!(owner.pool.live_count(), 0);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhaustion_is_fatal() {
        let pool: SlotPool<(), ()> = SlotPool::new("tiny", 1);
        pool.insert((), ());
        pool.insert((), ());
    }
}
