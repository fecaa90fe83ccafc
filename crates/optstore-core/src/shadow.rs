//! The shadow store: the canonical copy of every option value.
//!
//! All writes go through [`ConfigShadow::write`], which compares, copies,
//! bumps the group version and wakes up every listener covering the group,
//! all while holding the store's single mutex. Caches (see
//! [`ConfigCache`](crate::ConfigCache)) copy from here on demand.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::data::ConfigData;
use crate::error::StoreResult;
use crate::tree::{GroupTree, Opt, OptionId};
use crate::value::OptionValue;

/// Hook invoked on the writing thread, with the store locked, whenever an
/// option inside the listener's range changes.
///
/// The hook must not call back into the store.
pub type WakeupHook = Box<dyn Fn() + Send + Sync + 'static>;

/// Identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Listener {
    id: ListenerId,
    groups: Range<usize>,
    hook: WakeupHook,
}

struct ShadowState {
    data: ConfigData,
    listeners: Vec<Listener>,
}

/// Ground-truth option store shared by all caches.
pub struct ConfigShadow {
    tree: GroupTree,
    change_count: AtomicU64,
    next_listener: AtomicU64,
    state: Mutex<ShadowState>,
}

impl fmt::Debug for ConfigShadow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigShadow")
            .field("groups", &self.tree.group_count())
            .field("change_count", &self.change_count())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl ConfigShadow {
    /// Create a store for `tree` with every option at its default.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`](crate::StoreError::OutOfMemory)
    /// if the value storage cannot be allocated.
    pub fn new(tree: GroupTree) -> StoreResult<Arc<Self>> {
        let data = ConfigData::from_defaults(&tree, 0..tree.group_count())?;
        debug!(
            groups = tree.group_count(),
            root = tree.root().schema().name(),
            "config shadow created"
        );
        Ok(Arc::new(Self {
            tree,
            change_count: AtomicU64::new(0),
            next_listener: AtomicU64::new(1),
            state: Mutex::new(ShadowState {
                data,
                listeners: Vec::new(),
            }),
        }))
    }

    /// The static group tree.
    pub fn tree(&self) -> &GroupTree {
        &self.tree
    }

    /// Write `value` into option `id`.
    ///
    /// Returns `false` without side effects if the option already holds an
    /// equal value. Otherwise the value is copied in, the group version is
    /// bumped and every listener whose range contains the group is woken up
    /// before the lock is released.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not of the option's kind.
    pub fn write(&self, id: OptionId, value: &dyn OptionValue) -> bool {
        let descriptor = self.tree.descriptor(id);
        assert!(
            descriptor.kind() == value.kind(),
            "cannot write a {} value to option '{}' of kind {}",
            value.kind(),
            descriptor.full_name(),
            descriptor.kind()
        );

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let current = state.data.value_mut(id);
        if current.value_eq(value) {
            counter!("optstore_shadow_redundant_writes_total").increment(1);
            return false;
        }
        current.copy_from(value);

        let version = self.change_count.fetch_add(1, Ordering::SeqCst) + 1;
        state.data.group_mut(id.group()).version = version;
        counter!("optstore_shadow_writes_total").increment(1);
        trace!(option = descriptor.full_name(), version, "option written");

        for listener in &state.listeners {
            if listener.groups.contains(&id.group()) {
                (listener.hook)();
                counter!("optstore_listener_wakeups_total").increment(1);
            }
        }
        true
    }

    /// Typed [`write`](Self::write).
    pub fn set<T: OptionValue>(&self, opt: Opt<T>, value: T) -> bool {
        self.write(opt.id(), &value)
    }

    /// Copy of the current value of `id`.
    pub fn read_value(&self, id: OptionId) -> Box<dyn OptionValue> {
        self.state.lock().data.value(id).clone_value()
    }

    /// Copy of the current value of a typed option.
    pub fn get<T: OptionValue + Clone>(&self, opt: Opt<T>) -> T {
        self.state.lock().data.value(opt.id()).cast::<T>().clone()
    }

    /// Version of `group`: the change counter value of its last write, or 0.
    pub fn version(&self, group: usize) -> u64 {
        self.state.lock().data.group(group).version
    }

    /// Number of effective writes so far.
    pub fn change_count(&self) -> u64 {
        self.change_count.load(Ordering::SeqCst)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Register `hook` for changes to any group in `groups`.
    pub fn register_listener(&self, groups: Range<usize>, hook: WakeupHook) -> ListenerId {
        let mut state = self.state.lock();
        self.push_listener(&mut state, groups, hook)
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let removed = Self::take_listener(&mut self.state.lock(), id);
        removed.is_some()
    }

    /// Atomically remove `old` (if any) and register `new` (if any).
    pub(crate) fn replace_listener(
        &self,
        old: Option<ListenerId>,
        new: Option<(Range<usize>, WakeupHook)>,
    ) -> Option<ListenerId> {
        let mut state = self.state.lock();
        // Dropped after unlocking: a hook may own the last handle to a cache.
        let _removed = old.and_then(|old| Self::take_listener(&mut state, old));
        let id = new.map(|(groups, hook)| self.push_listener(&mut state, groups, hook));
        drop(state);
        id
    }

    fn take_listener(state: &mut ShadowState, id: ListenerId) -> Option<Listener> {
        let index = state.listeners.iter().position(|listener| listener.id == id)?;
        debug!(listener = %id, "listener removed");
        Some(state.listeners.remove(index))
    }

    fn push_listener(
        &self,
        state: &mut ShadowState,
        groups: Range<usize>,
        hook: WakeupHook,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        debug!(listener = %id, groups = ?groups, "listener registered");
        state.listeners.push(Listener { id, groups, hook });
        id
    }

    /// Lock the store and borrow its data.
    pub(crate) fn lock_data(&self) -> MappedMutexGuard<'_, ConfigData> {
        MutexGuard::map(self.state.lock(), |state| &mut state.data)
    }

    /// Copy `range` together with the change counter, atomically.
    pub(crate) fn snapshot(&self, range: Range<usize>) -> StoreResult<(ConfigData, u64)> {
        let state = self.state.lock();
        let data = ConfigData::copy_of(&self.tree, &state.data, range)?;
        Ok((data, self.change_count()))
    }
}
