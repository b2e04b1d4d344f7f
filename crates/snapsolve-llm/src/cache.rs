//! Time-boxed single-slot cache for an adapter's model list.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::provider::ModelInfo;

pub const DEFAULT_MODEL_TTL: Duration = Duration::from_millis(300_000);

#[derive(Debug, Clone)]
struct CachedModels {
    models: Vec<ModelInfo>,
    fetched_at: Instant,
}

#[derive(Debug)]
pub struct ModelCache {
    ttl: Duration,
    slot: Mutex<Option<CachedModels>>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_TTL)
    }
}

impl ModelCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached models if the slot is still fresh.
    #[must_use]
    pub fn get(&self) -> Option<Vec<ModelInfo>> {
        let guard = self.slot.lock().ok()?;
        guard
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.models.clone())
    }

    pub fn replace(&self, models: Vec<ModelInfo>) {
        if let Ok(mut guard) = self.slot.lock() {
            *guard = Some(CachedModels {
                models,
                fetched_at: Instant::now(),
            });
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.slot.lock() {
            *guard = None;
        }
    }

    /// Return the fresh cached list or run `fetch` and store its result.
    ///
    /// A failed fetch leaves the slot untouched.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `fetch`.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<Vec<ModelInfo>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ModelInfo>, E>>,
    {
        if let Some(models) = self.get() {
            return Ok(models);
        }
        let models = fetch().await?;
        self.replace(models.clone());
        Ok(models)
    }
}
