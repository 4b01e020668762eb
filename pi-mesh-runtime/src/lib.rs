//! # pi-mesh Runtime
//!
//! Clock and task abstractions for pi-mesh nodes.
//!
//! A node only needs three things from its host: a millisecond clock that
//! starts at boot, a way to sleep, and a way to spawn background work.
//!
//! ## Feature Flags
//!
//! - `tokio` (default): Use Tokio runtime

#![cfg_attr(not(feature = "std"), no_std)]

use core::future::Future;
use core::time::Duration;

/// Runtime trait for async operations
pub trait MeshRuntime: Send + Sync + 'static {
    /// Milliseconds since the runtime was created
    fn now(&self) -> u64;

    /// Sleep for the specified duration
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Spawn a task (if supported by the runtime)
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Node clock reading; saturates instead of wrapping
    fn millis(&self) -> u32 {
        u32::try_from(self.now()).unwrap_or(u32::MAX)
    }
}

#[cfg(feature = "tokio")]
pub mod tokio_runtime {
    //! Tokio-based runtime implementation

    use super::*;

    /// Tokio runtime wrapper
    ///
    /// Reads `tokio::time::Instant`, so a paused test clock drives it too.
    #[derive(Debug, Clone)]
    pub struct TokioRuntime {
        boot: tokio::time::Instant,
    }

    impl Default for TokioRuntime {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TokioRuntime {
        /// Create a new Tokio runtime wrapper; the clock starts now
        pub fn new() -> Self {
            Self {
                boot: tokio::time::Instant::now(),
            }
        }
    }

    impl MeshRuntime for TokioRuntime {
        fn now(&self) -> u64 {
            self.boot.elapsed().as_millis() as u64
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        fn spawn<F>(&self, future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }
    }
}

/// Mock runtime for testing
pub mod mock_runtime {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    /// Manually driven clock; sleeping advances it instantly
    #[derive(Debug, Default)]
    pub struct MockRuntime {
        current_time_ms: AtomicU64,
    }

    impl MockRuntime {
        /// Create a new mock runtime at time zero
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a mock runtime whose clock reads `ms`
        pub fn starting_at(ms: u64) -> Self {
            Self {
                current_time_ms: AtomicU64::new(ms),
            }
        }

        /// Advance the mock clock
        pub fn advance(&self, duration: Duration) {
            self.current_time_ms
                .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl MeshRuntime for MockRuntime {
        fn now(&self) -> u64 {
            self.current_time_ms.load(Ordering::SeqCst)
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }

        fn spawn<F>(&self, _future: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            // Futures are dropped unpolled; mock-driven nodes run inline.
        }
    }
}

/// Get the default runtime based on features
#[cfg(feature = "tokio")]
pub fn default_runtime() -> tokio_runtime::TokioRuntime {
    tokio_runtime::TokioRuntime::new()
}

#[cfg(test)]
mod tests {
    use super::mock_runtime::MockRuntime;
    use super::*;

    #[test]
    fn mock_clock_advances_on_sleep() {
        let runtime = MockRuntime::starting_at(1_000);
        block_on(runtime.sleep(Duration::from_millis(250)));
        assert_eq!(runtime.now(), 1_250);
    }

    #[test]
    fn millis_saturates() {
        let runtime = MockRuntime::starting_at(u64::from(u32::MAX) + 10);
        assert_eq!(runtime.millis(), u32::MAX);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let runtime = default_runtime();
        runtime.sleep(Duration::from_millis(1_500)).await;
        let now = runtime.millis();
        assert!((1_500..=1_501).contains(&now), "clock read {}", now);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn tokio_spawn_runs_the_task() {
        let runtime = default_runtime();
        let (done, finished) = tokio::sync::oneshot::channel();
        runtime.spawn(async move {
            let _ = done.send(7u32);
        });
        assert_eq!(finished.await.unwrap(), 7);
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }
}
