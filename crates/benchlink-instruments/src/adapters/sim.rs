/*!
 * Simulated interface adapter.
 *
 * Enumerates an in-memory instrument table instead of real hardware.
 * Instruments are attached and detached by the embedding code, and
 * faults can be injected to exercise the registry's failure paths.
 */
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use benchlink_core::error::{Error, Result};
use benchlink_core::types::Identity;

use crate::adapter::{AdapterInfo, InterfaceAdapter};

/// A simulated transport with a mutable instrument table
#[derive(Debug)]
pub struct SimAdapter {
    info: AdapterInfo,
    instruments: RwLock<HashMap<String, Identity>>,
    opened: AtomicBool,
    openable: AtomicBool,
    fail_next_enumerate: AtomicBool,
}

impl SimAdapter {
    /// Create a simulated adapter with an empty instrument table
    pub fn new<N: Into<String>>(name: N) -> Arc<Self> {
        Arc::new(Self {
            info: AdapterInfo::new(name, "sim", "Simulated bench transport"),
            instruments: RwLock::new(HashMap::new()),
            opened: AtomicBool::new(false),
            openable: AtomicBool::new(true),
            fail_next_enumerate: AtomicBool::new(false),
        })
    }

    /// Plug an instrument into the simulated transport
    pub async fn attach_instrument<N: Into<String>>(&self, native_id: N, identity: Identity) {
        let native_id = native_id.into();
        debug!(adapter = %self.info.name, native_id = %native_id, "Attaching simulated instrument");
        self.instruments.write().await.insert(native_id, identity);
    }

    /// Unplug an instrument; returns whether it was present
    pub async fn detach_instrument(&self, native_id: &str) -> bool {
        debug!(adapter = %self.info.name, native_id = %native_id, "Detaching simulated instrument");
        self.instruments.write().await.remove(native_id).is_some()
    }

    /// Unplug every instrument
    pub async fn clear(&self) {
        self.instruments.write().await.clear();
    }

    /// Control whether `open()` succeeds
    pub fn set_openable(&self, openable: bool) {
        self.openable.store(openable, Ordering::SeqCst);
    }

    /// Make the next `enumerate()` call fail once
    pub fn fail_next_enumerate(&self) {
        self.fail_next_enumerate.store(true, Ordering::SeqCst);
    }

    /// Whether the adapter is currently open
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InterfaceAdapter for SimAdapter {
    fn info(&self) -> &AdapterInfo {
        &self.info
    }

    async fn open(&self) -> Result<bool> {
        if !self.openable.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.opened.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn close(&self) {
        self.opened.store(false, Ordering::SeqCst);
    }

    async fn enumerate(&self) -> Result<HashMap<String, Identity>> {
        if !self.opened.load(Ordering::SeqCst) {
            return Err(Error::interface_unavailable(format!(
                "adapter {} is not open",
                self.info.name
            )));
        }
        if self.fail_next_enumerate.swap(false, Ordering::SeqCst) {
            return Err(Error::communication("injected enumeration fault"));
        }
        Ok(self.instruments.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumerate_requires_open() {
        let adapter = SimAdapter::new("sim0");
        assert!(adapter.enumerate().await.is_err());

        assert!(adapter.open().await.unwrap());
        adapter
            .attach_instrument("COM3", Identity::new("VendorX", "Model1"))
            .await;
        let observed = adapter.enumerate().await.unwrap();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed["COM3"], Identity::new("VendorX", "Model1"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let adapter = SimAdapter::new("sim0");
        adapter.open().await.unwrap();
        adapter.close().await;
        adapter.close().await;
        assert!(!adapter.is_open());
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let adapter = SimAdapter::new("sim0");
        adapter.open().await.unwrap();
        adapter.fail_next_enumerate();
        assert!(adapter.enumerate().await.is_err());
        assert!(adapter.enumerate().await.is_ok());
    }

    #[tokio::test]
    async fn test_unopenable_adapter() {
        let adapter = SimAdapter::new("sim0");
        adapter.set_openable(false);
        assert!(!adapter.open().await.unwrap());
        assert!(!adapter.is_open());
    }
}
