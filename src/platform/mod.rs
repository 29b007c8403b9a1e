//! Process-level lifecycle.
//!
//! A [`Platform`] must exist before any client handle can be created, and it
//! can only be torn down once every handle created from it is gone. Each
//! client holds a [`PlatformLease`]; the number of live leases is what
//! [`Platform::deinit`] checks.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::transport::{BridgeFactory, TransportFactory};
use crate::utils::error::PlatformError;

struct PlatformInner {
    factory: Arc<dyn TransportFactory>,
}

pub struct Platform {
    inner: Arc<PlatformInner>,
}

/// Keeps the platform alive for as long as a client handle exists.
#[derive(Clone)]
pub(crate) struct PlatformLease {
    // Never read; holding the Arc is what counts as a live handle.
    #[allow(dead_code)]
    inner: Arc<PlatformInner>,
}

impl Platform {
    /// Initialize the platform with the default transport factory.
    pub fn init() -> Self {
        Self::with_factory(Arc::new(BridgeFactory))
    }

    /// Initialize the platform with a custom transport factory. Every client
    /// created from this platform builds its transport through `factory`.
    pub fn with_factory(factory: Arc<dyn TransportFactory>) -> Self {
        info!(version = Self::version(), "platform initialized");
        Self {
            inner: Arc::new(PlatformInner { factory }),
        }
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Number of client handles currently holding a lease.
    pub fn live_handles(&self) -> usize {
        Arc::strong_count(&self.inner) - 1
    }

    /// Tear the platform down. Fails while any client handle is still alive.
    pub fn deinit(self) -> Result<(), PlatformError> {
        let live = self.live_handles();
        if live > 0 {
            return Err(PlatformError::Busy { live });
        }
        debug!("platform deinitialized");
        Ok(())
    }

    pub(crate) fn lease(&self) -> PlatformLease {
        PlatformLease {
            inner: Arc::clone(&self.inner),
        }
    }

    pub(crate) fn factory(&self) -> &dyn TransportFactory {
        self.inner.factory.as_ref()
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("live_handles", &self.live_handles())
            .finish()
    }
}

impl fmt::Debug for PlatformLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlatformLease")
    }
}

#[cfg(test)]
mod tests;
