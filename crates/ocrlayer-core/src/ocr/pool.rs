//! Pool of recognition engines.
//!
//! Engines are not shared between pages: each page checks one out for the
//! duration of its recognition step and the guard hands it back on drop.
//! A guard can outlive the page that acquired it (a timed-out call keeps
//! running on its blocking thread); the engine returns once that call ends.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::Recognizer;
use crate::error::OcrError;

/// Creates a fresh engine when the pool has none idle.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn Recognizer>, OcrError> + Send + Sync>;

/// Thread-safe pool of recognition engines.
pub struct EnginePool {
    available: Mutex<Vec<Box<dyn Recognizer>>>,
    factory: EngineFactory,
    /// Idle engines kept beyond this are dropped.
    max_idle: usize,
    created_count: AtomicUsize,
    active_count: AtomicUsize,
}

impl EnginePool {
    pub fn new(factory: EngineFactory, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            available: Mutex::new(Vec::with_capacity(max_idle)),
            factory,
            max_idle: max_idle.max(1),
            created_count: AtomicUsize::new(0),
            active_count: AtomicUsize::new(0),
        })
    }

    /// Check out an engine, creating one if none is idle.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledEngine, OcrError> {
        let idle = self.available.lock().pop();

        let engine = match idle {
            Some(engine) => engine,
            None => {
                let engine = (self.factory)()?;
                let n = self.created_count.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Created {} engine (#{})", engine.name(), n);
                engine
            }
        };

        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(PooledEngine {
            engine: Some(engine),
            pool: Arc::clone(self),
        })
    }

    fn release(&self, engine: Box<dyn Recognizer>) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);

        let mut available = self.available.lock();
        if available.len() < self.max_idle {
            available.push(engine);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created_count.load(Ordering::Relaxed),
            active: self.active_count.load(Ordering::Relaxed),
            idle: self.available.lock().len(),
        }
    }
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Engines ever created.
    pub created: usize,
    /// Engines currently checked out.
    pub active: usize,
    /// Engines waiting in the pool.
    pub idle: usize,
}

/// RAII guard for a checked-out engine.
pub struct PooledEngine {
    engine: Option<Box<dyn Recognizer>>,
    pool: Arc<EnginePool>,
}

impl Deref for PooledEngine {
    type Target = dyn Recognizer;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the engine out.
        self.engine.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledEngine {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WordRecord;
    use image::DynamicImage;
    use pretty_assertions::assert_eq;

    struct Echo;

    impl Recognizer for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<WordRecord>, OcrError> {
            Ok(Vec::new())
        }
    }

    fn echo_pool(max_idle: usize) -> Arc<EnginePool> {
        EnginePool::new(Arc::new(|| Ok(Box::new(Echo) as Box<dyn Recognizer>)), max_idle)
    }

    #[test]
    fn test_engine_returned_on_drop() {
        let pool = echo_pool(2);
        {
            let mut engine = pool.acquire().unwrap();
            assert_eq!(engine.name(), "echo");
            engine.recognize(&DynamicImage::new_rgb8(1, 1)).unwrap();
            assert_eq!(pool.stats().active, 1);
        }

        let stats = pool.stats();
        assert_eq!(stats, PoolStats { created: 1, active: 0, idle: 1 });

        let _again = pool.acquire().unwrap();
        assert_eq!(pool.stats().created, 1);
    }

    #[test]
    fn test_concurrent_checkouts_get_distinct_engines() {
        let pool = echo_pool(1);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.stats().created, 2);

        drop(a);
        drop(b);
        // Only one idle engine is kept.
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_factory_error_propagates() {
        let pool = EnginePool::new(
            Arc::new(|| -> Result<Box<dyn Recognizer>, OcrError> {
                Err(OcrError::Unavailable("missing".to_string()))
            }),
            1,
        );
        assert!(matches!(pool.acquire(), Err(OcrError::Unavailable(_))));
        assert_eq!(pool.stats().active, 0);
    }
}
