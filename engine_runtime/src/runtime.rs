//! Runtime host.
//!
//! Wires the resource cache to a byte source, the built-in resource kinds,
//! the package manager, an entity allocator and the built-in component
//! systems, and exposes them through console commands:
//! - `resource.reload_all` / `resource.stats`
//! - `package.load <name>` / `package.unload <name>` / `package.status <name>`
//! - `unit.spawn <name> [world]`
//!
//! Boot order: load the boot package resource, schedule and flush its
//! contents, then spawn the boot unit (if any) into world 0.

use std::sync::Arc;

use anyhow::{bail, Context};
use engine_resource::{
    builtin::register_builtin_types,
    cache::ResourceCache,
    components::TransformSystem,
    config::ResourceConfig,
    console::{Console, CvarFlags, CvarValue},
    ecs::{ComponentSystem, EntityAllocator, EntityId, WorldId},
    id::ResourceInstanceId,
    package::{package_type, PackageManager},
    source::{ByteSource, DirectorySource},
    unit::{unit_type, UnitSpawner},
};
use tracing::{info, warn};

pub const TRANSFORM_COMPONENT: &str = "transform";

/// Runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Types registered, nothing loaded.
    Idle,
    /// Boot package is loading.
    Booting,
    /// Boot finished.
    Running,
}

/// Resource runtime host.
pub struct Runtime {
    pub cfg: ResourceConfig,
    pub console: Console,
    cache: Arc<ResourceCache>,
    packages: Arc<PackageManager>,
    entities: Arc<EntityAllocator>,
    transforms: Arc<TransformSystem>,
    spawner: Arc<UnitSpawner>,
    state: RuntimeState,
}

impl Runtime {
    /// Creates a runtime reading compiled resources from `source`.
    pub fn new(cfg: ResourceConfig, source: Arc<dyn ByteSource>) -> anyhow::Result<Self> {
        let cache = Arc::new(ResourceCache::new(source));
        register_builtin_types(&cache).context("register resource types")?;
        cache.set_autoload(cfg.autoload);

        let transforms = Arc::new(TransformSystem::new());
        let mut components = ComponentSystem::new();
        components.register(TRANSFORM_COMPONENT, transforms.clone());

        let entities = Arc::new(EntityAllocator::new());
        let spawner = Arc::new(UnitSpawner::new(
            Arc::clone(&cache),
            entities.clone(),
            Arc::new(components),
        ));
        let packages = Arc::new(PackageManager::new(Arc::clone(&cache)));

        let mut runtime = Self {
            cfg,
            console: Console::new(),
            cache,
            packages,
            entities,
            transforms,
            spawner,
            state: RuntimeState::Idle,
        };
        runtime.register_cvars();
        runtime.register_commands();
        Ok(runtime)
    }

    /// Creates a runtime over `<build_dir>/<platform>`.
    pub fn with_directory(cfg: ResourceConfig) -> anyhow::Result<Self> {
        let source = DirectorySource::new(&cfg.build_dir, &cfg.platform);
        info!(dir = %source.dir().display(), "using build directory");
        Self::new(cfg, Arc::new(source))
    }

    fn register_cvars(&mut self) {
        let cfg = self.cfg.clone();
        self.console.register_cvar(
            "resource.build_dir",
            CvarValue::String(cfg.build_dir),
            "Compiled resource root",
            CvarFlags::READ_ONLY,
        );
        self.console.register_cvar(
            "resource.platform",
            CvarValue::String(cfg.platform),
            "Platform subdirectory of the build root",
            CvarFlags::READ_ONLY,
        );
        self.console.register_cvar(
            "resource.autoload",
            CvarValue::Bool(cfg.autoload),
            "Load missing resources on first access",
            CvarFlags::DEVELOP,
        );
        self.console.register_cvar(
            "boot.pkg",
            CvarValue::String(cfg.boot_package),
            "Boot package",
            CvarFlags::READ_ONLY,
        );
        self.console.register_cvar(
            "boot.unit",
            CvarValue::String(cfg.boot_unit.unwrap_or_default()),
            "Unit spawned after boot",
            CvarFlags::READ_ONLY,
        );
    }

    fn register_commands(&mut self) {
        let cache = Arc::clone(&self.cache);
        self.console.register_command("resource.reload_all", move |_args, ctx| {
            let report = cache.reload_all();
            for err in &report.failed {
                ctx.print(format!("  failed: {err}"));
            }
            ctx.print(format!("reloaded {} resource(s), {} failed", report.reloaded, report.failed.len()));
            Ok(())
        });

        let cache = Arc::clone(&self.cache);
        self.console.register_command("resource.stats", move |_args, ctx| {
            let stats = cache.stats();
            ctx.print(format!(
                "online: {}, offline: {}, loading: {}",
                stats.online, stats.offline, stats.loading
            ));
            Ok(())
        });

        let (cache, packages) = (Arc::clone(&self.cache), Arc::clone(&self.packages));
        self.console.register_command("package.load", move |args, ctx| {
            let Some(name) = args.first() else {
                bail!("usage: package.load <name>");
            };
            let id = ResourceInstanceId::from_name(name);
            cache.load_now(package_type(), &[id])?;
            packages.load(id)?;
            ctx.print(format!("package {name} scheduled"));
            Ok(())
        });

        let packages = Arc::clone(&self.packages);
        self.console.register_command("package.status", move |args, ctx| {
            let Some(name) = args.first() else {
                bail!("usage: package.status <name>");
            };
            let loaded = packages.is_loaded(ResourceInstanceId::from_name(name));
            ctx.print(format!("package {name}: {}", if loaded { "loaded" } else { "pending" }));
            Ok(())
        });

        let (cache, packages) = (Arc::clone(&self.cache), Arc::clone(&self.packages));
        self.console.register_command("package.unload", move |args, ctx| {
            let Some(name) = args.first() else {
                bail!("usage: package.unload <name>");
            };
            let id = ResourceInstanceId::from_name(name);
            packages.unload(id)?;
            cache.unload(package_type(), id)?;
            ctx.print(format!("package {name} unloaded"));
            Ok(())
        });

        let (cache, spawner) = (Arc::clone(&self.cache), Arc::clone(&self.spawner));
        self.console.register_command("unit.spawn", move |args, ctx| {
            let Some(name) = args.first() else {
                bail!("usage: unit.spawn <name> [world]");
            };
            let world = match args.get(1) {
                Some(w) => WorldId(w.parse().context("world must be a number")?),
                None => WorldId(0),
            };
            let id = ResourceInstanceId::from_name(name);
            cache.get_or_load(unit_type(), id)?;
            let root = spawner.spawn(world, id)?;
            ctx.print(format!("spawned {name} in world {}: root entity {}", world.0, root.0));
            Ok(())
        });
    }

    /// Loads the boot package and its contents, then spawns the boot unit.
    ///
    /// Returns the boot unit's root entity, if one was configured.
    pub async fn boot(&mut self) -> anyhow::Result<Option<EntityId>> {
        self.state = RuntimeState::Booting;
        let pkg = ResourceInstanceId::from_name(&self.cfg.boot_package);
        info!(package = %self.cfg.boot_package, "booting");

        self.cache
            .load_now(package_type(), &[pkg])
            .with_context(|| format!("load boot package '{}'", self.cfg.boot_package))?;
        self.packages.load(pkg)?;
        self.packages.flush(pkg).await?;

        let root = match self.cfg.boot_unit.clone() {
            Some(unit) => Some(self.spawn_unit(&unit, WorldId(0))?),
            None => None,
        };

        self.state = RuntimeState::Running;
        info!(root = ?root.map(|e| e.0), "boot finished");
        Ok(root)
    }

    /// Spawns a unit by name, loading it first when autoload allows.
    pub fn spawn_unit(&self, name: &str, world: WorldId) -> anyhow::Result<EntityId> {
        let id = ResourceInstanceId::from_name(name);
        self.cache
            .get_or_load(unit_type(), id)
            .with_context(|| format!("unit '{name}'"))?;
        let root = self
            .spawner
            .spawn(world, id)
            .with_context(|| format!("spawn unit '{name}'"))?;
        Ok(root)
    }

    /// Executes a console line and applies cvar changes to the cache.
    pub fn exec(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let output = self.console.exec(line)?;
        let autoload = self
            .console
            .get_cvar("resource.autoload")
            .is_some_and(|v| v.as_bool());
        if autoload != self.cache.autoload() {
            warn!(autoload, "resource autoload changed");
            self.cache.set_autoload(autoload);
        }
        Ok(output)
    }

    /// Unloads the boot package's contents and the package itself.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        let pkg = ResourceInstanceId::from_name(&self.cfg.boot_package);
        if self.cache.can_get(package_type(), pkg) {
            self.packages.unload(pkg)?;
            self.cache.unload(package_type(), pkg)?;
        }
        self.state = RuntimeState::Idle;
        info!("runtime shut down");
        Ok(())
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn packages(&self) -> &Arc<PackageManager> {
        &self.packages
    }

    pub fn entities(&self) -> &EntityAllocator {
        &self.entities
    }

    pub fn transforms(&self) -> &TransformSystem {
        &self.transforms
    }
}
