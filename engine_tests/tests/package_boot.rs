//! Package loading and the runtime boot sequence.

use std::sync::Arc;

use engine_resource::{
    builtin::register_builtin_types,
    cache::ResourceCache,
    config::ResourceConfig,
    ecs::WorldId,
    id::{ResourceInstanceId, ResourceTypeId},
    math::Vec3,
    package::{package_type, PackageManager},
    source::MemorySource,
    unit::unit_type,
};
use engine_runtime::{Runtime, RuntimeState};
use engine_tests::{init_tracing, put_json};
use serde_json::json;

fn boot_data() -> Arc<MemorySource> {
    let source = Arc::new(MemorySource::new());
    put_json(
        &source,
        "package",
        "boot",
        json!({ "config": ["global"], "unit": ["camera"], "shader": ["basic"] }),
    );
    put_json(&source, "config", "global", json!({ "title": "demo" }));
    put_json(
        &source,
        "unit",
        "camera",
        json!({
            "entity_count": 1,
            "groups": [{ "component": "transform", "entities": [0], "records": [{ "position": [0, 5, -10] }] }]
        }),
    );
    put_json(&source, "shader", "basic", json!("void main() {}"));
    source
}

fn id(name: &str) -> ResourceInstanceId {
    ResourceInstanceId::from_name(name)
}

#[tokio::test]
async fn package_loads_flushes_and_unloads() -> anyhow::Result<()> {
    init_tracing();
    let cache = Arc::new(ResourceCache::new(boot_data()));
    register_builtin_types(&cache)?;
    let packages = PackageManager::new(Arc::clone(&cache));

    cache.load_now(package_type(), &[id("boot")])?;
    packages.load(id("boot"))?;
    packages.flush(id("boot")).await?;

    assert!(packages.is_loaded(id("boot")));
    assert!(cache.can_get(unit_type(), id("camera")));
    let config = cache.get_as::<serde_json::Value>(ResourceTypeId::from_name("config"), id("global"))?;
    assert_eq!(config["title"], "demo");

    // Flushing with nothing pending returns immediately.
    packages.flush(id("boot")).await?;

    packages.unload(id("boot"))?;
    assert!(!cache.can_get(unit_type(), id("camera")));
    assert!(!packages.is_loaded(id("boot")));
    // The package resource itself is the caller's to unload.
    assert!(cache.can_get(package_type(), id("boot")));
    Ok(())
}

#[tokio::test]
async fn resources_shared_with_another_holder_survive_package_unload() -> anyhow::Result<()> {
    init_tracing();
    let cache = Arc::new(ResourceCache::new(boot_data()));
    register_builtin_types(&cache)?;
    let packages = PackageManager::new(Arc::clone(&cache));

    cache.load_now(unit_type(), &[id("camera")])?;
    cache.load_now(package_type(), &[id("boot")])?;
    packages.load(id("boot"))?;
    packages.flush(id("boot")).await?;
    assert_eq!(cache.ref_count(unit_type(), id("camera")), 2);

    packages.unload(id("boot"))?;
    assert!(cache.can_get(unit_type(), id("camera")));
    assert!(!cache.can_get(ResourceTypeId::from_name("config"), id("global")));
    Ok(())
}

#[tokio::test]
async fn flush_reports_a_missing_resource() -> anyhow::Result<()> {
    init_tracing();
    let source = Arc::new(MemorySource::new());
    put_json(&source, "package", "partial", json!({ "config": ["absent"] }));
    let cache = Arc::new(ResourceCache::new(source));
    register_builtin_types(&cache)?;
    let packages = PackageManager::new(Arc::clone(&cache));

    cache.load_now(package_type(), &[id("partial")])?;
    packages.load(id("partial"))?;
    assert!(packages.flush(id("partial")).await.is_err());
    assert!(!packages.is_loaded(id("partial")));
    Ok(())
}

#[tokio::test]
async fn runtime_boots_package_and_spawns_boot_unit() -> anyhow::Result<()> {
    init_tracing();
    let cfg = ResourceConfig {
        boot_unit: Some("camera".to_string()),
        ..ResourceConfig::default()
    };
    let mut runtime = Runtime::new(cfg, boot_data())?;
    assert_eq!(runtime.state(), RuntimeState::Idle);

    let root = runtime.boot().await?.expect("boot unit root");
    assert_eq!(runtime.state(), RuntimeState::Running);
    assert!(runtime.packages().is_loaded(id("boot")));

    let transform = runtime.transforms().get(WorldId(0), root).expect("camera transform");
    assert_eq!(transform.position, Vec3::new(0.0, 5.0, -10.0));

    runtime.shutdown()?;
    assert_eq!(runtime.state(), RuntimeState::Idle);
    assert!(!runtime.cache().can_get(package_type(), id("boot")));
    assert!(!runtime.cache().can_get(unit_type(), id("camera")));
    Ok(())
}

#[tokio::test]
async fn runtime_fails_boot_without_package() -> anyhow::Result<()> {
    init_tracing();
    let mut runtime = Runtime::new(ResourceConfig::default(), Arc::new(MemorySource::new()))?;
    assert!(runtime.boot().await.is_err());
    Ok(())
}

#[tokio::test]
async fn console_commands_drive_the_runtime() -> anyhow::Result<()> {
    init_tracing();
    let source = boot_data();
    let mut runtime = Runtime::new(ResourceConfig::default(), source.clone())?;
    runtime.boot().await?;

    let out = runtime.exec("resource.stats")?;
    assert_eq!(out, vec!["online: 4, offline: 0, loading: 0"]);

    let out = runtime.exec("unit.spawn camera 3")?;
    assert!(out[0].starts_with("spawned camera in world 3"));
    assert_eq!(runtime.entities().created(), 1);

    put_json(&source, "config", "global", json!({ "title": "reloaded" }));
    let out = runtime.exec("resource.reload_all")?;
    assert_eq!(out, vec!["reloaded 4 resource(s), 0 failed"]);
    let config = runtime
        .cache()
        .get_as::<serde_json::Value>(ResourceTypeId::from_name("config"), id("global"))?;
    assert_eq!(config["title"], "reloaded");

    assert_eq!(runtime.exec("package.status boot")?, vec!["package boot: loaded"]);
    assert!(runtime.exec("unit.spawn").is_err());
    assert!(runtime.exec("set boot.pkg other").is_err());
    Ok(())
}

#[tokio::test]
async fn autoload_cvar_reaches_the_cache() -> anyhow::Result<()> {
    init_tracing();
    let source = boot_data();
    put_json(&source, "unit", "extra", json!({ "entity_count": 2 }));
    let mut runtime = Runtime::new(ResourceConfig::default(), source)?;
    runtime.boot().await?;

    assert!(runtime.exec("unit.spawn extra").is_err());
    runtime.exec("resource.autoload 1")?;
    assert!(runtime.cache().autoload());
    runtime.exec("unit.spawn extra")?;
    assert_eq!(runtime.entities().created(), 2);
    Ok(())
}

#[tokio::test]
async fn runtime_reads_compiled_files_from_the_build_directory() -> anyhow::Result<()> {
    use engine_resource::{id::ResourceHandle, source::DirectorySource};

    init_tracing();
    let build_dir = std::env::temp_dir().join(format!("engine_tests_build_{}", std::process::id()));
    let cfg = ResourceConfig {
        build_dir: build_dir.to_string_lossy().into_owned(),
        platform: "test".to_string(),
        boot_unit: Some("marker".to_string()),
        ..ResourceConfig::default()
    };

    let layout = DirectorySource::new(&build_dir, &cfg.platform);
    std::fs::create_dir_all(layout.dir())?;
    std::fs::write(
        layout.path_of(ResourceHandle::from_names("package", "boot")),
        json!({ "unit": ["marker"] }).to_string(),
    )?;
    std::fs::write(
        layout.path_of(ResourceHandle::from_names("unit", "marker")),
        json!({ "entity_count": 1 }).to_string(),
    )?;

    let mut runtime = Runtime::with_directory(cfg)?;
    let booted = runtime.boot().await;
    let _ = std::fs::remove_dir_all(&build_dir);

    assert!(booted?.is_some());
    assert_eq!(runtime.entities().created(), 1);
    Ok(())
}
