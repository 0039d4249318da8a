use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::CoreError;
use crate::plugin::descriptor::PluginDescriptor;
use crate::plugin::instance::{LifecycleState, PluginInstance};
use crate::plugin::traits::Settings;

/// Scans one or more directories for `plugin.toml` descriptor files,
/// validating each one per §4.1. Invalid descriptors are collected as
/// diagnostics and excluded from the loaded set; they never abort the
/// whole scan.
pub struct PluginRegistry {
    dirs: Vec<PathBuf>,
    descriptors: HashMap<String, PluginDescriptor>,
    rejected: Vec<(PathBuf, String)>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            descriptors: HashMap::new(),
            rejected: Vec::new(),
        }
    }

    /// Idempotent: re-running clears and rebuilds the descriptor set from
    /// disk, preserving directory scan order within and across dirs.
    pub fn discover(&mut self) -> std::io::Result<Vec<PluginDescriptor>> {
        self.descriptors.clear();
        self.rejected.clear();
        let mut ordered = Vec::new();

        for dir in self.dirs.clone() {
            let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
                Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
                Err(_) => continue,
            };
            entries.sort();
            for path in entries {
                let descriptor_path = if path.is_dir() {
                    path.join("plugin.toml")
                } else {
                    path.clone()
                };
                if !descriptor_path.exists()
                    || descriptor_path.extension().and_then(|e| e.to_str()) != Some("toml")
                {
                    continue;
                }
                match Self::load_descriptor(&descriptor_path) {
                    Ok(descriptor) => {
                        let issues = descriptor.validate();
                        if issues.is_empty() {
                            ordered.push(descriptor.clone());
                            self.descriptors.insert(descriptor.name.clone(), descriptor);
                        } else {
                            let reason = issues
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join("; ");
                            tracing::warn!(path = %descriptor_path.display(), %reason, "rejected plugin descriptor");
                            self.rejected.push((descriptor_path, reason));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %descriptor_path.display(), error = %e, "malformed plugin descriptor");
                        self.rejected.push((descriptor_path, e.to_string()));
                    }
                }
            }
        }
        Ok(ordered)
    }

    fn load_descriptor(path: &Path) -> anyhow::Result<PluginDescriptor> {
        let text = std::fs::read_to_string(path)?;
        let descriptor: PluginDescriptor = toml::from_str(&text)?;
        Ok(descriptor)
    }

    #[must_use]
    pub fn describe(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(name)
    }

    #[must_use]
    pub fn rejected(&self) -> &[(PathBuf, String)] {
        &self.rejected
    }

    #[must_use]
    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.values()
    }
}

/// A mutable reference to "the current instance", swappable atomically
/// between items so hot reload never interleaves with an in-flight item
/// (§4.1 hot-reload contract, invariant 10 of §8).
pub struct HotSwap<T: ?Sized>(Mutex<Arc<PluginInstance<T>>>);

impl<T: ?Sized> HotSwap<T> {
    #[must_use]
    pub fn new(instance: Arc<PluginInstance<T>>) -> Self {
        Self(Mutex::new(instance))
    }

    /// Takes a snapshot to use for exactly one item's processing.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PluginInstance<T>> {
        self.0.lock().expect("hotswap lock poisoned").clone()
    }

    pub fn swap(&self, instance: Arc<PluginInstance<T>>) {
        *self.0.lock().expect("hotswap lock poisoned") = instance;
    }
}

/// Holds loaded instances of one plugin trait (e.g. all OCR plugins),
/// keyed by name, each behind a `HotSwap` so `reload` can replace a
/// running instance atomically between items (§4.1 hot-reload contract,
/// invariant 10 of §8). Construction is delegated to a caller-supplied
/// factory since concrete OCR/translation/capture engines are external
/// collaborators (§6) — this crate never constructs them itself.
pub struct TypedRegistry<P: ?Sized> {
    instances: HashMap<String, Arc<HotSwap<P>>>,
}

impl<P: ?Sized> Default for TypedRegistry<P> {
    fn default() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }
}

impl<P: ?Sized> TypedRegistry<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(
        &mut self,
        descriptor: PluginDescriptor,
        requested_settings: &Settings,
        build: impl FnOnce(&Settings) -> Result<Box<P>, String>,
    ) -> Result<Arc<PluginInstance<P>>, CoreError> {
        let name = descriptor.name.clone();
        let instance = Self::build_running(descriptor, &name, requested_settings, build)?;
        self.instances.insert(name, Arc::new(HotSwap::new(instance.clone())));
        Ok(instance)
    }

    /// Builds a replacement instance for `name` and atomically swaps it in,
    /// without ever removing `name` from the registry. Any snapshot a
    /// caller already took via `get` keeps running against the old
    /// instance for the item it's mid-processing; the next `get` observes
    /// the new one. Errors (leaving the previous instance in place) if
    /// `name` isn't currently loaded, if settings fail validation, or if
    /// `build` or the transition to `Running` fails.
    pub fn reload(
        &mut self,
        name: &str,
        descriptor: PluginDescriptor,
        requested_settings: &Settings,
        build: impl FnOnce(&Settings) -> Result<Box<P>, String>,
    ) -> Result<Arc<PluginInstance<P>>, CoreError> {
        let hotswap = self
            .instances
            .get(name)
            .ok_or_else(|| CoreError::plugin_load(name, "not loaded"))?;
        let instance = Self::build_running(descriptor, name, requested_settings, build)?;
        hotswap.swap(instance.clone());
        Ok(instance)
    }

    fn build_running(
        descriptor: PluginDescriptor,
        name: &str,
        requested_settings: &Settings,
        build: impl FnOnce(&Settings) -> Result<Box<P>, String>,
    ) -> Result<Arc<PluginInstance<P>>, CoreError> {
        let resolved = descriptor.settings.validate(name, requested_settings)?;
        let boxed = build(&resolved).map_err(|reason| CoreError::plugin_load(name, reason))?;
        let instance = Arc::new(PluginInstance::new(descriptor, resolved, boxed));
        instance
            .transition(LifecycleState::Running)
            .map_err(|reason| CoreError::plugin_load(name, reason))?;
        Ok(instance)
    }

    pub fn unload(&mut self, name: &str) -> Result<(), CoreError> {
        match self.instances.remove(name) {
            Some(hotswap) => {
                let instance = hotswap.snapshot();
                let _ = instance.transition(LifecycleState::Stopped);
                let _ = instance.transition(LifecycleState::Unloaded);
                Ok(())
            }
            None => Err(CoreError::plugin_load(name, "not loaded")),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<PluginInstance<P>>> {
        self.instances.get(name).map(|hotswap| hotswap.snapshot())
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.keys().cloned().collect();
        names.sort();
        names
    }
}
