//! Caller-owned device cache.
//!
//! Opening the same file twice must yield the same device handle, so
//! that all spans over that file serialize on one device lock. The
//! registry is an explicit service object owned by the embedding
//! application; there is no process-wide state and no weak-reference
//! eviction, just explicit release.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::io::{DeviceError, FileDevice};

#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<PathBuf, Arc<FileDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` read-write, sharing the handle with earlier opens of
    /// the same (canonicalized) path.
    pub fn open(&mut self, path: &Path) -> Result<Arc<FileDevice>, DeviceError> {
        let key = path.canonicalize()?;
        if let Some(device) = self.devices.get(&key) {
            return Ok(Arc::clone(device));
        }
        debug!(path = %key.display(), "opening device");
        let device = Arc::new(FileDevice::open(&key)?);
        self.devices.insert(key, Arc::clone(&device));
        Ok(device)
    }

    /// Drop the registry's handle for `path`. Spans still holding the
    /// device keep it alive; the registry just stops sharing it out.
    pub fn release(&mut self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.devices.remove(&key).is_some()
    }

    /// Drop handles nobody else references anymore.
    pub fn purge_unused(&mut self) {
        self.devices
            .retain(|_, device| Arc::strong_count(device) > 1);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Device;
    use std::io::Write as _;

    #[test]
    fn repeated_opens_share_one_device() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"shared").unwrap();
        tmp.flush().unwrap();

        let mut registry = DeviceRegistry::new();
        let first = registry.open(tmp.path()).unwrap();
        let second = registry.open(tmp.path()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.read(0, 6).unwrap(), b"shared");
    }

    #[test]
    fn release_and_purge_drop_handles() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"x").unwrap();
        tmp.flush().unwrap();

        let mut registry = DeviceRegistry::new();
        let device = registry.open(tmp.path()).unwrap();
        assert!(registry.release(tmp.path()));
        assert!(registry.is_empty());

        // Reopen, drop our handle, purge.
        let _ = registry.open(tmp.path()).unwrap();
        drop(device);
        registry.purge_unused();
        assert!(registry.is_empty());
    }
}
