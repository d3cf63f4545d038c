//! Resource cache.
//!
//! Entries move through a fixed lifecycle:
//!
//! ```text
//! Unloaded -> Loading -> Loaded -> Online <-> Offline
//! Online/Offline -> Unloading -> Unloaded
//! Loading -(loader fails)-> Unloaded
//! ```
//!
//! The entry table is only locked long enough to find or insert a per-handle
//! slot. Each slot has its own mutex and condvar, so transitions of one handle
//! are serialized while unrelated handles load in parallel. A loader runs at
//! most once at a time per handle: concurrent `load_now` callers for the same
//! handle park on the slot's condvar and share the outcome.
//!
//! Lock order is slot before table. The table lock is never held while a slot
//! lock is taken.

use std::{
    any::{type_name, Any},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
};

use bytes::Bytes;
use fnv::FnvHashMap;
use tracing::{debug, warn};

use crate::{
    error::{shared, ResourceError, Result},
    id::{ResourceHandle, ResourceInstanceId, ResourceTypeId},
    registry::{Representation, ResourceType, TypeRegistry},
    source::ByteSource,
};

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Unloaded,
    Loading,
    Loaded,
    Online,
    Offline,
    Unloading,
}

/// Entry counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub loading: usize,
    pub online: usize,
    pub offline: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.loading + self.online + self.offline
    }
}

/// Outcome of [`ResourceCache::reload_all`].
#[derive(Debug, Default)]
pub struct ReloadReport {
    pub reloaded: usize,
    pub failed: Vec<ResourceError>,
}

struct Entry {
    state: ResourceState,
    repr: Option<Representation>,
    ref_count: u32,
    /// Set when the load this slot was created for failed.
    failure: Option<ResourceError>,
}

struct Slot {
    entry: Mutex<Entry>,
    settled: Condvar,
}

impl Slot {
    fn loading() -> Self {
        Self {
            entry: Mutex::new(Entry {
                state: ResourceState::Loading,
                repr: None,
                ref_count: 0,
                failure: None,
            }),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entry> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Typed cache of loaded resources, keyed by [`ResourceHandle`].
pub struct ResourceCache {
    registry: TypeRegistry,
    source: Arc<dyn ByteSource>,
    slots: Mutex<FnvHashMap<ResourceHandle, Arc<Slot>>>,
    autoload: AtomicBool,
}

impl ResourceCache {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            registry: TypeRegistry::new(),
            source,
            slots: Mutex::new(FnvHashMap::default()),
            autoload: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Registers lifecycle callbacks for `type_id`.
    pub fn register_type(&self, type_id: ResourceTypeId, vtable: Arc<dyn ResourceType>) -> Result<()> {
        self.registry.register_type(type_id, vtable)
    }

    /// Registers `vtable` under the hash of `name` and returns the type id.
    pub fn register<T: ResourceType>(&self, name: &str, vtable: T) -> Result<ResourceTypeId> {
        self.registry.register(name, vtable)
    }

    /// Enables loading on demand from [`get_or_load`](Self::get_or_load).
    pub fn set_autoload(&self, enabled: bool) {
        self.autoload.store(enabled, Ordering::Relaxed);
    }

    pub fn autoload(&self) -> bool {
        self.autoload.load(Ordering::Relaxed)
    }

    fn lock_slots(&self) -> MutexGuard<'_, FnvHashMap<ResourceHandle, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, handle: ResourceHandle) -> Option<Arc<Slot>> {
        self.lock_slots().get(&handle).cloned()
    }

    fn remove_slot(&self, handle: ResourceHandle, slot: &Arc<Slot>) {
        let mut slots = self.lock_slots();
        if slots.get(&handle).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(&handle);
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads every name of `type_id` and brings it online, blocking until done.
    ///
    /// Names that are already loaded only gain a reference. Names another
    /// caller is loading are waited on instead of loaded twice. The first
    /// failure aborts the batch: names before it stay loaded, the failing
    /// name ends unloaded and later names are not attempted.
    pub fn load_now(&self, type_id: ResourceTypeId, names: &[ResourceInstanceId]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let vtable = self.registry.get(type_id)?;
        for &name in names {
            self.load_one(ResourceHandle::new(type_id, name), vtable.as_ref())?;
        }
        Ok(())
    }

    fn load_one(&self, handle: ResourceHandle, vtable: &dyn ResourceType) -> Result<()> {
        loop {
            let (slot, owner) = {
                let mut slots = self.lock_slots();
                match slots.get(&handle) {
                    Some(slot) => (Arc::clone(slot), false),
                    None => {
                        let slot = Arc::new(Slot::loading());
                        slots.insert(handle, Arc::clone(&slot));
                        (slot, true)
                    }
                }
            };

            if owner {
                return self.run_loader(handle, &slot, vtable);
            }

            let mut entry = slot.lock();
            while entry.state == ResourceState::Loading {
                entry = slot
                    .settled
                    .wait(entry)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match entry.state {
                ResourceState::Online | ResourceState::Offline => {
                    entry.ref_count += 1;
                    return Ok(());
                }
                _ => {
                    if let Some(err) = &entry.failure {
                        return Err(err.clone());
                    }
                    // Evicted between lookup and lock; start over with a fresh slot.
                }
            }
        }
    }

    fn run_loader(&self, handle: ResourceHandle, slot: &Arc<Slot>, vtable: &dyn ResourceType) -> Result<()> {
        debug!(%handle, "loading resource");
        let loaded = self
            .source
            .read_bytes(handle)
            .map_err(|source| ResourceError::Source { handle, source })
            .and_then(|bytes| {
                vtable
                    .load(handle, bytes)
                    .map_err(|e| ResourceError::LoaderFailure {
                        handle,
                        source: shared(e),
                    })
            });

        let mut entry = slot.lock();
        match loaded {
            Ok(repr) => {
                entry.state = ResourceState::Loaded;
                vtable.online(handle, &repr);
                entry.repr = Some(repr);
                entry.state = ResourceState::Online;
                entry.ref_count = 1;
                drop(entry);
                slot.settled.notify_all();
                debug!(%handle, "resource online");
                Ok(())
            }
            Err(err) => {
                entry.state = ResourceState::Unloaded;
                entry.failure = Some(err.clone());
                self.remove_slot(handle, slot);
                drop(entry);
                slot.settled.notify_all();
                Err(err)
            }
        }
    }

    /// Inserts a representation built outside the cache and brings it online.
    pub fn add_loaded(&self, handle: ResourceHandle, repr: Representation) -> Result<()> {
        let vtable = self.registry.get(handle.type_id)?;
        let slot = {
            let mut slots = self.lock_slots();
            if slots.contains_key(&handle) {
                return Err(ResourceError::AlreadyLoaded(handle));
            }
            let slot = Arc::new(Slot::loading());
            slots.insert(handle, Arc::clone(&slot));
            slot
        };

        let mut entry = slot.lock();
        entry.state = ResourceState::Loaded;
        vtable.online(handle, &repr);
        entry.repr = Some(repr);
        entry.state = ResourceState::Online;
        entry.ref_count = 1;
        drop(entry);
        slot.settled.notify_all();
        debug!(%handle, "added preloaded resource");
        Ok(())
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Returns the representation of an online entry. Never blocks on loads.
    pub fn get(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> Result<Representation> {
        let handle = ResourceHandle::new(type_id, name);
        let slot = self.slot(handle).ok_or(ResourceError::NotLoaded(handle))?;
        let entry = slot.lock();
        match (&entry.state, &entry.repr) {
            (ResourceState::Online, Some(repr)) => Ok(Arc::clone(repr)),
            _ => Err(ResourceError::NotLoaded(handle)),
        }
    }

    /// Typed [`get`](Self::get).
    pub fn get_as<T: Any + Send + Sync>(
        &self,
        type_id: ResourceTypeId,
        name: ResourceInstanceId,
    ) -> Result<Arc<T>> {
        self.get(type_id, name)?
            .downcast::<T>()
            .map_err(|_| ResourceError::TypeMismatch {
                handle: ResourceHandle::new(type_id, name),
                expected: type_name::<T>(),
            })
    }

    /// Like [`get`](Self::get), but loads a missing entry first when autoload is on.
    pub fn get_or_load(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> Result<Representation> {
        let handle = ResourceHandle::new(type_id, name);
        if self.autoload() && self.slot(handle).is_none() {
            warn!(%handle, "autoloading resource");
            self.load_now(type_id, &[name])?;
        }
        self.get(type_id, name)
    }

    pub fn can_get(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> bool {
        self.state(type_id, name) == ResourceState::Online
    }

    pub fn can_get_all(&self, type_id: ResourceTypeId, names: &[ResourceInstanceId]) -> bool {
        names.iter().all(|&name| self.can_get(type_id, name))
    }

    pub fn state(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> ResourceState {
        self.slot(ResourceHandle::new(type_id, name))
            .map_or(ResourceState::Unloaded, |slot| slot.lock().state)
    }

    pub fn ref_count(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> u32 {
        self.slot(ResourceHandle::new(type_id, name))
            .map_or(0, |slot| slot.lock().ref_count)
    }

    /// Drops one reference and returns what is left. Never evicts.
    pub fn release(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> Result<u32> {
        let handle = ResourceHandle::new(type_id, name);
        let slot = self.slot(handle).ok_or(ResourceError::NotLoaded(handle))?;
        let mut entry = slot.lock();
        entry.ref_count = entry.ref_count.saturating_sub(1);
        Ok(entry.ref_count)
    }

    pub fn stats(&self) -> CacheStats {
        let slots: Vec<Arc<Slot>> = self.lock_slots().values().cloned().collect();
        let mut stats = CacheStats::default();
        for slot in slots {
            match slot.lock().state {
                ResourceState::Loading | ResourceState::Loaded => stats.loading += 1,
                ResourceState::Online => stats.online += 1,
                ResourceState::Offline => stats.offline += 1,
                ResourceState::Unloading | ResourceState::Unloaded => {}
            }
        }
        stats
    }

    // =========================================================================
    // Online / offline
    // =========================================================================

    /// Takes an online entry offline. Offline or absent entries are left alone.
    pub fn offline(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> Result<()> {
        let handle = ResourceHandle::new(type_id, name);
        let Some(slot) = self.slot(handle) else {
            return Ok(());
        };
        let mut entry = slot.lock();
        match entry.state {
            ResourceState::Online => {
                let vtable = self.registry.get(type_id)?;
                if let Some(repr) = &entry.repr {
                    vtable.offline(handle, repr);
                }
                entry.state = ResourceState::Offline;
                debug!(%handle, "resource offline");
                Ok(())
            }
            ResourceState::Offline | ResourceState::Unloaded => Ok(()),
            _ => Err(ResourceError::NotLoaded(handle)),
        }
    }

    /// Brings an offline entry back online.
    pub fn online(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> Result<()> {
        let handle = ResourceHandle::new(type_id, name);
        let slot = self.slot(handle).ok_or(ResourceError::NotLoaded(handle))?;
        let mut entry = slot.lock();
        match entry.state {
            ResourceState::Online => Ok(()),
            ResourceState::Offline => {
                let vtable = self.registry.get(type_id)?;
                if let Some(repr) = &entry.repr {
                    vtable.online(handle, repr);
                }
                entry.state = ResourceState::Online;
                debug!(%handle, "resource online");
                Ok(())
            }
            _ => Err(ResourceError::NotLoaded(handle)),
        }
    }

    // =========================================================================
    // Reload
    // =========================================================================

    /// Replaces the representation of a loaded entry with one built from `bytes`.
    ///
    /// Readers that already hold the old representation keep it. If the
    /// reloader fails the old representation stays in place, and an entry that
    /// was online before comes back online.
    pub fn reload(&self, type_id: ResourceTypeId, name: ResourceInstanceId, bytes: Bytes) -> Result<()> {
        let handle = ResourceHandle::new(type_id, name);
        let slot = self.slot(handle).ok_or(ResourceError::NotLoaded(handle))?;
        let vtable = self.registry.get(type_id)?;

        let mut entry = slot.lock();
        let was_online = match entry.state {
            ResourceState::Online => true,
            ResourceState::Offline => false,
            _ => return Err(ResourceError::NotLoaded(handle)),
        };
        let old = entry
            .repr
            .clone()
            .ok_or(ResourceError::NotLoaded(handle))?;

        if was_online {
            vtable.offline(handle, &old);
            entry.state = ResourceState::Offline;
        }

        debug!(%handle, "reloading resource");
        match vtable.reload(handle, &old, bytes) {
            Ok(new) => {
                vtable.online(handle, &new);
                entry.repr = Some(new);
                entry.state = ResourceState::Online;
                Ok(())
            }
            Err(e) => {
                warn!(%handle, error = %e, "reload failed, keeping previous data");
                if was_online {
                    vtable.online(handle, &old);
                    entry.state = ResourceState::Online;
                }
                Err(ResourceError::ReloadFailure {
                    handle,
                    source: shared(e),
                })
            }
        }
    }

    /// Reloads each name from the byte source. Stops at the first failure.
    pub fn reload_from_source(&self, type_id: ResourceTypeId, names: &[ResourceInstanceId]) -> Result<()> {
        for &name in names {
            let handle = ResourceHandle::new(type_id, name);
            let bytes = self
                .source
                .read_bytes(handle)
                .map_err(|source| ResourceError::Source { handle, source })?;
            self.reload(type_id, name, bytes)?;
        }
        Ok(())
    }

    /// Reloads every loaded entry from the byte source.
    ///
    /// Failures are collected rather than aborting the sweep.
    pub fn reload_all(&self) -> ReloadReport {
        let mut handles: Vec<ResourceHandle> = self.lock_slots().keys().copied().collect();
        handles.sort();

        let mut report = ReloadReport::default();
        for handle in handles {
            if !matches!(
                self.state(handle.type_id, handle.name),
                ResourceState::Online | ResourceState::Offline
            ) {
                continue;
            }
            match self.reload_from_source(handle.type_id, &[handle.name]) {
                Ok(()) => report.reloaded += 1,
                Err(err) => report.failed.push(err),
            }
        }
        debug!(reloaded = report.reloaded, failed = report.failed.len(), "reload_all finished");
        report
    }

    // =========================================================================
    // Unload
    // =========================================================================

    /// Evicts an entry regardless of its reference count.
    ///
    /// Callers coordinate lifetimes; absent entries are a no-op.
    pub fn unload(&self, type_id: ResourceTypeId, name: ResourceInstanceId) -> Result<()> {
        let handle = ResourceHandle::new(type_id, name);
        let Some(slot) = self.slot(handle) else {
            return Ok(());
        };
        let vtable = self.registry.get(type_id)?;

        let mut entry = slot.lock();
        match entry.state {
            ResourceState::Online | ResourceState::Offline => {}
            ResourceState::Unloaded => return Ok(()),
            _ => return Err(ResourceError::NotLoaded(handle)),
        }

        if entry.state == ResourceState::Online {
            if let Some(repr) = &entry.repr {
                vtable.offline(handle, repr);
            }
            entry.state = ResourceState::Offline;
        }
        entry.state = ResourceState::Unloading;
        if let Some(repr) = entry.repr.take() {
            vtable.unload(handle, repr);
        }
        entry.state = ResourceState::Unloaded;
        entry.ref_count = 0;
        // Evict before releasing the slot so waiters never find it again.
        self.remove_slot(handle, &slot);
        drop(entry);
        slot.settled.notify_all();
        debug!(%handle, "resource unloaded");
        Ok(())
    }

    /// Unloads every name, stopping at the first error.
    pub fn unload_all(&self, type_id: ResourceTypeId, names: &[ResourceInstanceId]) -> Result<()> {
        for &name in names {
            self.unload(type_id, name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::source::MemorySource;

    #[derive(Default)]
    struct Counters {
        load: AtomicUsize,
        unload: AtomicUsize,
        online: AtomicUsize,
        offline: AtomicUsize,
    }

    /// Text resource that counts its callbacks and rejects "bad" input.
    struct Text(Arc<Counters>);

    impl ResourceType for Text {
        fn load(&self, _handle: ResourceHandle, bytes: Bytes) -> anyhow::Result<Representation> {
            self.0.load.fetch_add(1, Ordering::SeqCst);
            let text = String::from_utf8(bytes.to_vec())?;
            anyhow::ensure!(text != "bad", "rejected input");
            Ok(Arc::new(text))
        }

        fn unload(&self, _handle: ResourceHandle, _repr: Representation) {
            self.0.unload.fetch_add(1, Ordering::SeqCst);
        }

        fn online(&self, _handle: ResourceHandle, _repr: &Representation) {
            self.0.online.fetch_add(1, Ordering::SeqCst);
        }

        fn offline(&self, _handle: ResourceHandle, _repr: &Representation) {
            self.0.offline.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (ResourceCache, Arc<MemorySource>, Arc<Counters>, ResourceTypeId) {
        let source = Arc::new(MemorySource::new());
        let cache = ResourceCache::new(source.clone());
        let counters = Arc::new(Counters::default());
        let ty = cache.register("text", Text(counters.clone())).unwrap();
        (cache, source, counters, ty)
    }

    fn text(cache: &ResourceCache, ty: ResourceTypeId, name: ResourceInstanceId) -> String {
        cache.get_as::<String>(ty, name).unwrap().as_str().to_owned()
    }

    #[test]
    fn get_before_load_is_not_loaded() {
        let (cache, _, _, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        assert!(matches!(cache.get(ty, name), Err(ResourceError::NotLoaded(_))));
        assert_eq!(cache.state(ty, name), ResourceState::Unloaded);
    }

    #[test]
    fn load_brings_entry_online_with_loader_output() {
        let (cache, source, counters, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        source.insert(ResourceHandle::new(ty, name), &b"hello"[..]);

        cache.load_now(ty, &[name]).unwrap();
        assert_eq!(cache.state(ty, name), ResourceState::Online);
        assert_eq!(text(&cache, ty, name), "hello");
        assert_eq!(counters.online.load(Ordering::SeqCst), 1);

        let a = cache.get(ty, name).unwrap();
        let b = cache.get(ty, name).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn second_load_only_adds_a_reference() {
        let (cache, source, counters, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        source.insert(ResourceHandle::new(ty, name), &b"x"[..]);

        cache.load_now(ty, &[name]).unwrap();
        cache.load_now(ty, &[name]).unwrap();
        assert_eq!(counters.load.load(Ordering::SeqCst), 1);
        assert_eq!(cache.ref_count(ty, name), 2);
        assert_eq!(cache.release(ty, name).unwrap(), 1);
        assert_eq!(cache.state(ty, name), ResourceState::Online);
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let (cache, _, counters, ty) = setup();
        cache.load_now(ty, &[]).unwrap();
        cache.load_now(ResourceTypeId::from_name("unregistered"), &[]).unwrap();
        assert_eq!(counters.load.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_load_aborts_batch_and_discards_entry() {
        let (cache, source, _, ty) = setup();
        let [good, bad, later] = ["good", "bad", "later"].map(ResourceInstanceId::from_name);
        source.insert(ResourceHandle::new(ty, good), &b"fine"[..]);
        source.insert(ResourceHandle::new(ty, bad), &b"bad"[..]);
        source.insert(ResourceHandle::new(ty, later), &b"fine"[..]);

        let err = cache.load_now(ty, &[good, bad, later]).unwrap_err();
        assert!(matches!(err, ResourceError::LoaderFailure { handle, .. } if handle.name == bad));
        assert_eq!(cache.state(ty, good), ResourceState::Online);
        assert_eq!(cache.state(ty, bad), ResourceState::Unloaded);
        assert_eq!(cache.state(ty, later), ResourceState::Unloaded);
    }

    #[test]
    fn missing_bytes_surface_source_error() {
        let (cache, _, _, ty) = setup();
        let name = ResourceInstanceId::from_name("ghost");
        let err = cache.load_now(ty, &[name]).unwrap_err();
        assert!(matches!(err, ResourceError::Source { .. }));
        assert_eq!(cache.stats().total(), 0);
    }

    #[test]
    fn unregistered_type_cannot_load() {
        let (cache, _, _, _) = setup();
        let ty = ResourceTypeId::from_name("shader");
        let err = cache.load_now(ty, &[ResourceInstanceId::from_name("x")]).unwrap_err();
        assert!(matches!(err, ResourceError::UnknownResourceType(t) if t == ty));
    }

    #[test]
    fn offline_is_idempotent_and_blocks_get() {
        let (cache, source, counters, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        source.insert(ResourceHandle::new(ty, name), &b"x"[..]);
        cache.load_now(ty, &[name]).unwrap();

        cache.offline(ty, name).unwrap();
        cache.offline(ty, name).unwrap();
        assert_eq!(counters.offline.load(Ordering::SeqCst), 1);
        assert!(matches!(cache.get(ty, name), Err(ResourceError::NotLoaded(_))));

        cache.online(ty, name).unwrap();
        assert_eq!(counters.online.load(Ordering::SeqCst), 2);
        assert!(cache.can_get(ty, name));
    }

    #[test]
    fn offline_on_absent_handle_is_a_noop() {
        let (cache, _, counters, ty) = setup();
        cache.offline(ty, ResourceInstanceId::from_name("none")).unwrap();
        assert_eq!(counters.offline.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reload_replaces_and_failed_reload_keeps_previous() {
        let (cache, source, counters, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        source.insert(ResourceHandle::new(ty, name), &b"one"[..]);
        cache.load_now(ty, &[name]).unwrap();
        let before = cache.get(ty, name).unwrap();

        cache.reload(ty, name, Bytes::from_static(b"two")).unwrap();
        assert_eq!(text(&cache, ty, name), "two");
        // Readers that fetched before the reload keep the old value.
        assert_eq!(before.downcast_ref::<String>().unwrap(), "one");

        let err = cache.reload(ty, name, Bytes::from_static(b"bad")).unwrap_err();
        assert!(matches!(err, ResourceError::ReloadFailure { .. }));
        assert_eq!(text(&cache, ty, name), "two");
        assert_eq!(cache.state(ty, name), ResourceState::Online);
        // load, reload, failed-reload restore
        assert_eq!(counters.online.load(Ordering::SeqCst), 3);
        assert_eq!(counters.offline.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reload_of_offline_entry_comes_back_online() {
        let (cache, source, _, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        source.insert(ResourceHandle::new(ty, name), &b"one"[..]);
        cache.load_now(ty, &[name]).unwrap();
        cache.offline(ty, name).unwrap();

        assert!(cache.reload(ty, name, Bytes::from_static(b"bad")).is_err());
        assert_eq!(cache.state(ty, name), ResourceState::Offline);

        cache.reload(ty, name, Bytes::from_static(b"two")).unwrap();
        assert_eq!(cache.state(ty, name), ResourceState::Online);
        assert_eq!(text(&cache, ty, name), "two");
    }

    #[test]
    fn reload_requires_a_loaded_entry() {
        let (cache, _, _, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        let err = cache.reload(ty, name, Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, ResourceError::NotLoaded(_)));
    }

    #[test]
    fn reload_all_rereads_the_source() {
        let (cache, source, _, ty) = setup();
        let [a, b] = ["a", "b"].map(ResourceInstanceId::from_name);
        source.insert(ResourceHandle::new(ty, a), &b"a1"[..]);
        source.insert(ResourceHandle::new(ty, b), &b"b1"[..]);
        cache.load_now(ty, &[a, b]).unwrap();

        source.insert(ResourceHandle::new(ty, a), &b"a2"[..]);
        source.insert(ResourceHandle::new(ty, b), &b"bad"[..]);
        let report = cache.reload_all();
        assert_eq!(report.reloaded, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(text(&cache, ty, a), "a2");
        assert_eq!(text(&cache, ty, b), "b1");
    }

    #[test]
    fn unload_runs_offline_then_unloader_once() {
        let (cache, source, counters, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        source.insert(ResourceHandle::new(ty, name), &b"x"[..]);
        cache.load_now(ty, &[name]).unwrap();
        cache.load_now(ty, &[name]).unwrap();

        cache.unload(ty, name).unwrap();
        cache.unload(ty, name).unwrap();
        assert_eq!(counters.offline.load(Ordering::SeqCst), 1);
        assert_eq!(counters.unload.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(ty, name), ResourceState::Unloaded);
        assert_eq!(cache.ref_count(ty, name), 0);

        // A later load starts from scratch.
        cache.load_now(ty, &[name]).unwrap();
        assert_eq!(counters.load.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unloaded_slots_are_already_out_of_the_table() {
        let (cache, source, _, ty) = setup();
        let handle = ResourceHandle::new(ty, ResourceInstanceId::from_name("churn"));
        source.insert(handle, &b"x"[..]);
        let done = AtomicBool::new(false);
        let stale = AtomicUsize::new(0);

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..500 {
                    cache.load_now(ty, &[handle.name]).unwrap();
                    cache.unload(ty, handle.name).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let Some(slot) = cache.slot(handle) else {
                        continue;
                    };
                    let entry = slot.lock();
                    if entry.state == ResourceState::Unloaded
                        && cache.lock_slots().get(&handle).is_some_and(|listed| Arc::ptr_eq(listed, &slot))
                    {
                        stale.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        });

        assert_eq!(stale.load(Ordering::SeqCst), 0);
        assert_eq!(cache.state(ty, handle.name), ResourceState::Unloaded);
    }

    #[test]
    fn add_loaded_inserts_online_entry() {
        let (cache, _, counters, ty) = setup();
        let handle = ResourceHandle::new(ty, ResourceInstanceId::from_name("pre"));
        cache.add_loaded(handle, Arc::new(String::from("built"))).unwrap();
        assert_eq!(text(&cache, ty, handle.name), "built");
        assert_eq!(counters.online.load(Ordering::SeqCst), 1);

        let err = cache.add_loaded(handle, Arc::new(String::new())).unwrap_err();
        assert!(matches!(err, ResourceError::AlreadyLoaded(h) if h == handle));
    }

    #[test]
    fn get_as_rejects_wrong_type() {
        let (cache, source, _, ty) = setup();
        let name = ResourceInstanceId::from_name("a");
        source.insert(ResourceHandle::new(ty, name), &b"x"[..]);
        cache.load_now(ty, &[name]).unwrap();
        assert!(matches!(cache.get_as::<u32>(ty, name), Err(ResourceError::TypeMismatch { .. })));
    }

    #[test]
    fn get_or_load_honors_autoload() {
        let (cache, source, _, ty) = setup();
        let name = ResourceInstanceId::from_name("lazy");
        source.insert(ResourceHandle::new(ty, name), &b"z"[..]);

        assert!(cache.get_or_load(ty, name).is_err());
        cache.set_autoload(true);
        let repr = cache.get_or_load(ty, name).unwrap();
        assert_eq!(repr.downcast_ref::<String>().unwrap(), "z");
    }
}
