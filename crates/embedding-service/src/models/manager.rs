//! Bounded in-memory cache of loaded models.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::LoadError;

use super::provider::{DeviceKind, EmbeddingModel, ModelMetadata, ModelProvider};

/// A model handed out by the cache together with its metadata.
#[derive(Clone)]
pub struct LoadedModel {
    pub model: Arc<dyn EmbeddingModel>,
    pub metadata: ModelMetadata,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Holds at most `capacity` loaded models, evicting the oldest-inserted one when full.
///
/// Eviction follows insertion order only: a cache hit does not refresh an entry.
/// Lookups share a read lock; insertion, eviction and unload take the write lock.
/// Loads are serialized separately so a slow load never blocks hits.
pub struct ModelManager {
    provider: Arc<dyn ModelProvider>,
    capacity: usize,
    /// Device for the next load. Downgraded to CPU once if no GPU is found.
    device: Mutex<DeviceKind>,
    /// Loaded models, oldest first
    entries: RwLock<VecDeque<LoadedModel>>,
    load_lock: Mutex<()>,
}

impl ModelManager {
    /// Create an empty cache. A `capacity` of 0 is treated as 1.
    pub fn new(provider: Arc<dyn ModelProvider>, capacity: usize, device: DeviceKind) -> Self {
        let capacity = capacity.max(1);
        Self {
            provider,
            capacity,
            device: Mutex::new(device),
            entries: RwLock::new(VecDeque::with_capacity(capacity + 1)),
            load_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The device new models are loaded onto.
    pub fn device(&self) -> DeviceKind {
        *self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached model for `name`, loading it on a miss.
    ///
    /// Blocking: call from a blocking context when used from async code.
    pub fn get_or_load(&self, name: &str) -> Result<LoadedModel, LoadError> {
        if let Some(hit) = self.lookup(name) {
            tracing::debug!("Using cached model: {}", name);
            return Ok(hit);
        }

        let _loading = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have finished loading it while we waited
        if let Some(hit) = self.lookup(name) {
            tracing::debug!("Using cached model: {}", name);
            return Ok(hit);
        }

        let device = self.select_device();
        tracing::info!("Loading model: {} on device: {}", name, device);

        let model = self.provider.load(name, device).inspect_err(|e| {
            tracing::error!("Error loading model {}: {}", name, e);
        })?;

        let dimensions = model.dimensions();
        let max_sequence_length = model.max_sequence_length();
        if dimensions == 0 || max_sequence_length == 0 {
            return Err(LoadError::InvalidModel {
                model: name.to_string(),
                reason: format!(
                    "reported dimensions={dimensions}, max_sequence_length={max_sequence_length}"
                ),
            });
        }

        let loaded = LoadedModel {
            model,
            metadata: ModelMetadata {
                name: name.to_string(),
                dimensions,
                max_sequence_length,
                device,
            },
        };

        tracing::info!(
            "Model {} loaded successfully. Dimensions: {}, Device: {}",
            name,
            dimensions,
            device
        );

        let evicted = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.push_back(loaded.clone());

            let mut evicted = Vec::new();
            while entries.len() > self.capacity {
                if let Some(oldest) = entries.pop_front() {
                    evicted.push(oldest.metadata.name);
                }
            }
            evicted
        };

        for name in evicted {
            tracing::info!("Removed model {} from cache", name);
        }

        Ok(loaded)
    }

    /// Remove a model from the cache. Returns false if it wasn't loaded.
    ///
    /// Callers already holding the model keep using it until they drop it.
    pub fn unload(&self, name: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter().position(|e| e.metadata.name == name) {
            Some(index) => {
                entries.remove(index);
                tracing::info!("Unloaded model: {}", name);
                true
            }
            None => false,
        }
    }

    /// Names of loaded models, oldest first.
    pub fn list_loaded(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.metadata.name.clone())
            .collect()
    }

    /// Metadata for a loaded model, or `None` if it isn't loaded. Never loads anything.
    pub fn try_get_metadata(&self, name: &str) -> Option<ModelMetadata> {
        self.lookup(name).map(|e| e.metadata)
    }

    /// Drop every cached model.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        if count > 0 {
            tracing::info!("Released {} cached model(s)", count);
        }
    }

    fn lookup(&self, name: &str) -> Option<LoadedModel> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.metadata.name == name)
            .cloned()
    }

    fn select_device(&self) -> DeviceKind {
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        if *device == DeviceKind::Cuda && !self.provider.gpu_available() {
            tracing::warn!("CUDA requested but not available, falling back to CPU");
            *device = DeviceKind::Cpu;
        }
        *device
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubProvider;
    use super::*;

    fn manager(capacity: usize) -> (Arc<StubProvider>, ModelManager) {
        let provider = Arc::new(StubProvider::new().missing("missing-model"));
        let manager = ModelManager::new(provider.clone(), capacity, DeviceKind::Cpu);
        (provider, manager)
    }

    #[test]
    fn test_miss_loads_and_records_metadata() {
        let (provider, manager) = manager(2);

        let loaded = manager.get_or_load("all-MiniLM-L6-v2").unwrap();

        assert_eq!(provider.load_count(), 1);
        assert_eq!(
            loaded.metadata,
            ModelMetadata {
                name: "all-MiniLM-L6-v2".to_string(),
                dimensions: 8,
                max_sequence_length: 256,
                device: DeviceKind::Cpu,
            }
        );
        assert_eq!(manager.list_loaded(), vec!["all-MiniLM-L6-v2"]);
    }

    #[test]
    fn test_hit_does_not_reload() {
        let (provider, manager) = manager(2);

        let first = manager.get_or_load("m1").unwrap();
        let second = manager.get_or_load("m1").unwrap();

        assert_eq!(provider.load_count(), 1);
        assert!(Arc::ptr_eq(&first.model, &second.model));
    }

    #[test]
    fn test_evicts_oldest_inserted() {
        let (_, manager) = manager(2);

        manager.get_or_load("m1").unwrap();
        manager.get_or_load("m2").unwrap();
        manager.get_or_load("m3").unwrap();

        assert_eq!(manager.list_loaded(), vec!["m2", "m3"]);
        assert!(manager.try_get_metadata("m1").is_none());
    }

    #[test]
    fn test_hit_does_not_refresh_eviction_order() {
        let (_, manager) = manager(2);

        manager.get_or_load("m1").unwrap();
        manager.get_or_load("m2").unwrap();
        manager.get_or_load("m1").unwrap();
        manager.get_or_load("m3").unwrap();

        assert_eq!(manager.list_loaded(), vec!["m2", "m3"]);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let (_, manager) = manager(3);

        for i in 0..10 {
            manager.get_or_load(&format!("m{}", i % 5)).unwrap();
            assert!(manager.list_loaded().len() <= 3);
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (_, manager) = manager(0);
        assert_eq!(manager.capacity(), 1);

        manager.get_or_load("m1").unwrap();
        manager.get_or_load("m2").unwrap();
        assert_eq!(manager.list_loaded(), vec!["m2"]);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let (_, manager) = manager(2);

        let err = manager.get_or_load("missing-model").unwrap_err();

        assert!(matches!(err, LoadError::Failed { .. }));
        assert!(manager.list_loaded().is_empty());
    }

    #[test]
    fn test_model_without_dimensions_is_rejected() {
        let mut provider = StubProvider::new();
        provider.dimensions = 0;
        let manager = ModelManager::new(Arc::new(provider), 2, DeviceKind::Cpu);

        let err = manager.get_or_load("m1").unwrap_err();

        assert!(matches!(err, LoadError::InvalidModel { ref model, .. } if model == "m1"));
        assert!(manager.list_loaded().is_empty());
        assert!(manager.try_get_metadata("m1").is_none());
    }

    #[test]
    fn test_evicted_model_stays_usable_by_holder() {
        let (_, manager) = manager(1);

        let held = manager.get_or_load("m1").unwrap();
        manager.get_or_load("m2").unwrap();

        assert!(manager.try_get_metadata("m1").is_none());
        let vectors = held.model.encode(&["still works".to_string()], false).unwrap();
        assert_eq!(vectors.len(), 1);
    }

    #[test]
    fn test_unload() {
        let (_, manager) = manager(2);
        manager.get_or_load("m1").unwrap();

        assert!(manager.unload("m1"));
        assert!(!manager.unload("m1"));
        assert!(manager.list_loaded().is_empty());
    }

    #[test]
    fn test_gpu_downgrades_to_cpu_once() {
        let provider = Arc::new(StubProvider::new());
        let manager = ModelManager::new(provider.clone(), 2, DeviceKind::Cuda);

        let loaded = manager.get_or_load("m1").unwrap();
        manager.get_or_load("m2").unwrap();

        assert_eq!(loaded.metadata.device, DeviceKind::Cpu);
        assert_eq!(manager.device(), DeviceKind::Cpu);
        assert_eq!(
            *provider.devices.lock().unwrap(),
            vec![DeviceKind::Cpu, DeviceKind::Cpu]
        );
    }

    #[test]
    fn test_gpu_kept_when_available() {
        let mut provider = StubProvider::new();
        provider.gpu = true;
        let manager = ModelManager::new(Arc::new(provider), 1, DeviceKind::Cuda);

        let loaded = manager.get_or_load("m1").unwrap();

        assert_eq!(loaded.metadata.device, DeviceKind::Cuda);
    }

    #[test]
    fn test_concurrent_misses_load_once() {
        let (provider, manager) = manager(2);
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.get_or_load("shared").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(provider.load_count(), 1);
        assert_eq!(manager.list_loaded(), vec!["shared"]);
    }

    #[test]
    fn test_clear_releases_all() {
        let (_, manager) = manager(2);
        manager.get_or_load("m1").unwrap();
        manager.get_or_load("m2").unwrap();

        manager.clear();

        assert!(manager.list_loaded().is_empty());
    }
}
