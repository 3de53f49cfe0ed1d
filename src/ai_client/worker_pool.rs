//! InferencePool - bounded dispatch of inference calls
//!
//! Every call runs as its own task so a slow inference server never stalls the
//! task handling the hook request; the semaphore caps how many calls are in
//! flight at once. Calls are not cancelled here, the HTTP timeout bounds them.

use super::{InferenceBackend, RawPrediction};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default pool size
pub const DEFAULT_WORKERS: usize = 10;

/// Bounded inference worker pool
pub struct InferencePool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl InferencePool {
    /// Create new pool with `size` concurrent calls (minimum 1)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Currently free slots
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one inference call on the pool
    pub async fn run(
        &self,
        backend: Arc<dyn InferenceBackend>,
        image: Arc<[u8]>,
    ) -> Result<Vec<RawPrediction>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("inference pool closed".to_string()))?;

        let endpoint = backend.endpoint().to_string();
        let task = tokio::spawn(async move {
            let _permit = permit;
            backend.infer(image).await
        });

        task.await.map_err(|e| {
            Error::Internal(format!("inference task for {} failed: {}", endpoint, e))
        })?
    }
}

impl Default for InferencePool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowBackend {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for SlowBackend {
        fn endpoint(&self) -> &str {
            "slow"
        }

        async fn infer(&self, _image: Arc<[u8]>) -> Result<Vec<RawPrediction>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct PanickingBackend;

    #[async_trait]
    impl InferenceBackend for PanickingBackend {
        fn endpoint(&self) -> &str {
            "panics"
        }

        async fn infer(&self, _image: Arc<[u8]>) -> Result<Vec<RawPrediction>> {
            panic!("backend bug");
        }
    }

    #[test]
    fn test_size_is_at_least_one() {
        assert_eq!(InferencePool::new(0).size(), 1);
        assert_eq!(InferencePool::default().size(), DEFAULT_WORKERS);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = Arc::new(InferencePool::new(2));
        let backend = Arc::new(SlowBackend {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let image: Arc<[u8]> = Arc::from(vec![0u8; 4]);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let backend: Arc<dyn InferenceBackend> = backend.clone();
            let image = image.clone();
            handles.push(tokio::spawn(async move { pool.run(backend, image).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_panicking_backend_becomes_error() {
        let pool = InferencePool::new(1);
        let result = pool.run(Arc::new(PanickingBackend), Arc::from(vec![1u8])).await;
        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(pool.available(), 1);
    }
}
