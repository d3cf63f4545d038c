//! Fixtures shared by the integration tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use engine_resource::{
    ecs::{ComponentSpawner, EntityId, WorldId},
    id::ResourceHandle,
    params::ParamRecord,
    registry::{Representation, ResourceType},
    source::MemorySource,
};

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// UTF-8 text resource that counts every callback.
///
/// Input `"bad"` fails to load or reload. An optional delay makes loads slow
/// enough for concurrent callers to pile up behind them.
#[derive(Default)]
pub struct CountingType {
    pub delay: Duration,
    pub loads: AtomicUsize,
    pub reloads: AtomicUsize,
    pub unloads: AtomicUsize,
    pub onlines: AtomicUsize,
    pub offlines: AtomicUsize,
}

impl CountingType {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn parse(bytes: &Bytes) -> anyhow::Result<String> {
        let text = std::str::from_utf8(bytes)?.to_string();
        anyhow::ensure!(text != "bad", "rejected input");
        Ok(text)
    }
}

impl ResourceType for CountingType {
    fn load(&self, _handle: ResourceHandle, bytes: Bytes) -> anyhow::Result<Representation> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(Arc::new(Self::parse(&bytes)?))
    }

    fn unload(&self, _handle: ResourceHandle, _repr: Representation) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
    }

    fn online(&self, _handle: ResourceHandle, _repr: &Representation) {
        self.onlines.fetch_add(1, Ordering::SeqCst);
    }

    fn offline(&self, _handle: ResourceHandle, _repr: &Representation) {
        self.offlines.fetch_add(1, Ordering::SeqCst);
    }

    fn reload(
        &self,
        _handle: ResourceHandle,
        _old: &Representation,
        bytes: Bytes,
    ) -> anyhow::Result<Representation> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Self::parse(&bytes)?))
    }
}

/// One recorded component batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnCall {
    pub world: WorldId,
    pub entities: Vec<EntityId>,
    pub records: Vec<ParamRecord>,
}

/// Component spawner that records every batch it is handed.
#[derive(Default)]
pub struct RecordingSpawner {
    calls: Mutex<Vec<SpawnCall>>,
}

impl RecordingSpawner {
    pub fn calls(&self) -> Vec<SpawnCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ComponentSpawner for RecordingSpawner {
    fn spawn(&self, world: WorldId, entities: &[EntityId], records: &[ParamRecord]) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SpawnCall {
                world,
                entities: entities.to_vec(),
                records: records.to_vec(),
            });
        Ok(())
    }
}

/// Stores `value` as JSON under (`type_name`, `name`).
pub fn put_json(source: &MemorySource, type_name: &str, name: &str, value: serde_json::Value) {
    source.insert(
        ResourceHandle::from_names(type_name, name),
        Bytes::from(value.to_string()),
    );
}
