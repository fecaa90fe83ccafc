//! Per-consumer snapshots of a subtree of the shadow store.
//!
//! A [`ConfigCache`] owns a private copy of every option below its root
//! group. Readers access that copy without any locking; [`update`] pulls in
//! whatever changed in the shadow since the last refresh and reports whether
//! anything did.
//!
//! [`update`]: ConfigCache::update
//!
//! # Example
//!
//! ```
//! use optstore_core::{ConfigCache, ConfigShadow, GroupSchema, GroupTree};
//! use std::sync::Arc;
//!
//! let audio = GroupSchema::builder("audio").option("volume", 100_i64).build();
//! let root = GroupSchema::builder("player")
//!     .sub_group("audio", Arc::clone(&audio))
//!     .build();
//!
//! let tree = GroupTree::build(root);
//! let volume = tree.opt::<i64>(&audio, "volume").unwrap();
//! let shadow = ConfigShadow::new(tree).unwrap();
//!
//! let mut reader = ConfigCache::for_schema(&shadow, &audio).unwrap();
//! let mut writer = ConfigCache::for_schema(&shadow, &audio).unwrap();
//!
//! assert!(writer.set(volume, 50));
//! assert_eq!(*reader.get(volume), 100);
//!
//! assert!(reader.update());
//! assert_eq!(*reader.get(volume), 50);
//! assert!(!reader.update());
//! ```

use std::fmt;
use std::mem;
use std::ops::Range;
use std::sync::Arc;

use optstore_dispatch::{DispatchQueue, NotifyKey};
use tracing::{debug, warn};

use crate::data::ConfigData;
use crate::error::StoreResult;
use crate::schema::GroupSchema;
use crate::shadow::{ConfigShadow, ListenerId, WakeupHook};
use crate::tree::{GroupTree, Opt, OptionId};
use crate::value::OptionValue;

/// Callback run on a dispatch queue's owner thread after a change.
pub type DispatchCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Configuration for a config cache.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Log every copied change at `debug` level with old and new value.
    pub trace_changes: bool,
}

impl CacheConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable change tracing.
    pub fn with_trace_changes(mut self, enabled: bool) -> Self {
        self.trace_changes = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    group: usize,
    option: usize,
}

struct DispatchWakeup {
    queue: Arc<DispatchQueue>,
    key: NotifyKey,
}

/// A consumer's private copy of one subtree of a [`ConfigShadow`].
pub struct ConfigCache {
    shadow: Arc<ConfigShadow>,
    config: CacheConfig,
    data: ConfigData,
    seen: u64,
    cursor: Option<Cursor>,
    change_flags: u64,
    listener: Option<ListenerId>,
    dispatch: Option<DispatchWakeup>,
}

impl fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCache")
            .field("root", &self.root())
            .field("range", &self.range())
            .field("seen", &self.seen)
            .field("change_flags", &format_args!("{:#x}", self.change_flags))
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl ConfigCache {
    /// Create a cache for the subtree rooted at `group`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`](crate::StoreError::OutOfMemory)
    /// if the copy cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `group` is not a group of the shadow's tree.
    pub fn new(shadow: &Arc<ConfigShadow>, group: usize) -> StoreResult<Self> {
        Self::with_config(shadow, group, CacheConfig::default())
    }

    /// Create a cache with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`](crate::StoreError::OutOfMemory)
    /// if the copy cannot be allocated.
    pub fn with_config(
        shadow: &Arc<ConfigShadow>,
        group: usize,
        config: CacheConfig,
    ) -> StoreResult<Self> {
        let range = shadow.tree().subtree(group);
        let (data, seen) = shadow.snapshot(range)?;
        debug!(
            group = shadow.tree().group(group).schema().name(),
            groups = data.range().len(),
            "config cache created"
        );
        Ok(Self {
            shadow: Arc::clone(shadow),
            config,
            data,
            seen,
            cursor: None,
            change_flags: 0,
            listener: None,
            dispatch: None,
        })
    }

    /// Create a cache for the subtree built from `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`](crate::StoreError::OutOfMemory)
    /// if the copy cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `schema` is not part of the shadow's tree.
    pub fn for_schema(shadow: &Arc<ConfigShadow>, schema: &Arc<GroupSchema>) -> StoreResult<Self> {
        match shadow.tree().group_index(schema) {
            Some(group) => Self::new(shadow, group),
            None => panic!("group '{}' is not part of this config tree", schema.name()),
        }
    }

    /// The shadow store this cache copies from.
    pub fn shadow(&self) -> &Arc<ConfigShadow> {
        &self.shadow
    }

    /// The static group tree.
    pub fn tree(&self) -> &GroupTree {
        self.shadow.tree()
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Index of the cache's root group.
    pub fn root(&self) -> usize {
        self.data.range().start
    }

    /// Group indices covered by this cache.
    pub fn range(&self) -> Range<usize> {
        self.data.range()
    }

    /// Check if option `id` lies within this cache's subtree.
    pub fn contains(&self, id: OptionId) -> bool {
        self.data.contains_group(id.group())
    }

    /// Refresh every changed option from the shadow.
    ///
    /// Returns `true` if at least one value was copied. A pass left
    /// unfinished by [`next_changed`](Self::next_changed) is completed first.
    pub fn update(&mut self) -> bool {
        let started = self.begin_pass();
        if !started && self.cursor.is_none() {
            return false;
        }

        let shadow = Arc::clone(&self.shadow);
        let src = shadow.lock_data();
        let mut changed = false;
        while self.step(shadow.tree(), &src).is_some() {
            changed = true;
        }
        changed
    }

    /// Copy the next changed option and return its id.
    ///
    /// Returns `None` once the current pass is complete and nothing changed
    /// since. The position inside the pass is kept between calls.
    pub fn next_changed(&mut self) -> Option<OptionId> {
        self.begin_pass();
        self.cursor?;

        let shadow = Arc::clone(&self.shadow);
        let src = shadow.lock_data();
        self.step(shadow.tree(), &src)
    }

    /// Iterate over changed options, copying each one as it is yielded.
    ///
    /// The iterator borrows the cache exclusively. Values can be read
    /// through [`Changes::cache`] between steps.
    pub fn changes(&mut self) -> Changes<'_> {
        Changes { cache: self }
    }

    fn begin_pass(&mut self) -> bool {
        let current = self.shadow.change_count();
        if current == self.seen {
            return false;
        }
        self.seen = current;
        self.cursor = Some(Cursor {
            group: self.root(),
            option: 0,
        });
        true
    }

    fn step(&mut self, tree: &GroupTree, src: &ConfigData) -> Option<OptionId> {
        let root = self.root();
        let end = self.data.range().end;

        while let Some(cursor) = self.cursor {
            if cursor.group >= end {
                self.cursor = None;
                break;
            }

            let source = src.group(cursor.group);
            let target = self.data.group_mut(cursor.group);
            if source.version > target.version {
                for option in cursor.option..target.values.len() {
                    let new = source.values[option].as_ref();
                    if target.values[option].value_eq(new) {
                        continue;
                    }

                    let id = OptionId::new(cursor.group, option);
                    let mask = tree.change_mask(id, root);
                    if self.config.trace_changes {
                        debug!(
                            option = tree.full_name(id),
                            old = ?target.values[option],
                            new = ?new,
                            flags = mask,
                            "option changed"
                        );
                    }
                    target.values[option].copy_from(new);
                    self.change_flags |= mask;
                    self.cursor = Some(Cursor {
                        group: cursor.group,
                        option: option + 1,
                    });
                    return Some(id);
                }
                target.version = source.version;
            }

            self.cursor = Some(Cursor {
                group: cursor.group + 1,
                option: 0,
            });
        }
        None
    }

    /// Borrow the cached value of a typed option.
    ///
    /// # Panics
    ///
    /// Panics if the option is outside this cache's subtree.
    pub fn get<T: OptionValue>(&self, opt: Opt<T>) -> &T {
        self.value(opt.id()).cast::<T>()
    }

    /// Mutably borrow the cached value of a typed option.
    ///
    /// Local modifications are not published until
    /// [`write_back`](Self::write_back), and are overwritten by the next
    /// [`update`](Self::update) that finds the shadow's value changed.
    pub fn get_mut<T: OptionValue>(&mut self, opt: Opt<T>) -> &mut T {
        self.value_mut(opt.id()).cast_mut::<T>()
    }

    /// Borrow the cached value of `id`.
    pub fn value(&self, id: OptionId) -> &dyn OptionValue {
        self.check_contains(id);
        self.data.value(id)
    }

    /// Mutably borrow the cached value of `id`.
    pub fn value_mut(&mut self, id: OptionId) -> &mut dyn OptionValue {
        self.check_contains(id);
        self.data.value_mut(id)
    }

    fn check_contains(&self, id: OptionId) {
        assert!(
            self.contains(id),
            "option '{}' is outside the cache rooted at group {}",
            self.tree().full_name(id),
            self.root()
        );
    }

    /// Publish the cached value of `id` to the shadow.
    ///
    /// Returns whether the shadow's value changed. Other caches covering the
    /// option are woken up, including this one.
    pub fn write_back(&self, id: OptionId) -> bool {
        self.shadow.write(id, self.value(id))
    }

    /// Store `value` locally and publish it.
    pub fn set<T: OptionValue>(&mut self, opt: Opt<T>, value: T) -> bool {
        *self.get_mut(opt) = value;
        self.write_back(opt.id())
    }

    /// Change mask of `id` as seen from this cache's root.
    pub fn change_mask(&self, id: OptionId) -> u64 {
        self.tree().change_mask(id, self.root())
    }

    /// Union of the change masks of every option copied so far.
    pub fn change_flags(&self) -> u64 {
        self.change_flags
    }

    /// Return the accumulated change flags and reset them.
    pub fn take_change_flags(&mut self) -> u64 {
        mem::take(&mut self.change_flags)
    }

    /// Set, replace or remove the hook run when an option in this cache's
    /// subtree changes.
    ///
    /// The hook runs on the writing thread while the shadow is locked, so it
    /// must only signal; calling [`update`](Self::update) from it deadlocks.
    /// Setting a hook replaces any dispatch wakeup.
    pub fn set_wakeup(&mut self, hook: Option<WakeupHook>) {
        let range = self.range();
        self.listener = self
            .shadow
            .replace_listener(self.listener.take(), hook.map(|hook| (range, hook)));

        if let Some(dispatch) = self.dispatch.take() {
            dispatch.queue.cancel(dispatch.key);
        }
    }

    /// Set, replace or remove a wakeup delivered through a dispatch queue.
    ///
    /// On every change a notification running `callback` is queued on the
    /// queue, merged with one that is still pending. Replacing or removing
    /// the registration cancels pending notifications before returning.
    pub fn set_dispatch_wakeup(&mut self, target: Option<(Arc<DispatchQueue>, DispatchCallback)>) {
        self.set_wakeup(None);

        let Some((queue, callback)) = target else {
            return;
        };
        let key = NotifyKey::new();
        let notify_queue = Arc::clone(&queue);
        let hook: WakeupHook = Box::new(move || {
            let callback = Arc::clone(&callback);
            if let Err(err) = notify_queue.enqueue_notify(key, move || callback()) {
                warn!(error = %err, %key, "failed to queue config change notification");
            }
        });

        let range = self.range();
        self.listener = self
            .shadow
            .replace_listener(self.listener.take(), Some((range, hook)));
        self.dispatch = Some(DispatchWakeup { queue, key });
    }

    /// Check if a wakeup (direct or dispatch) is registered.
    pub fn has_wakeup(&self) -> bool {
        self.listener.is_some()
    }
}

impl Drop for ConfigCache {
    fn drop(&mut self) {
        self.set_wakeup(None);
    }
}

/// Iterator over the changed options of a [`ConfigCache`].
///
/// Created by [`ConfigCache::changes`].
#[derive(Debug)]
pub struct Changes<'a> {
    cache: &'a mut ConfigCache,
}

impl Changes<'_> {
    /// The cache being updated.
    pub fn cache(&self) -> &ConfigCache {
        self.cache
    }
}

impl Iterator for Changes<'_> {
    type Item = OptionId;

    fn next(&mut self) -> Option<OptionId> {
        self.cache.next_changed()
    }
}
