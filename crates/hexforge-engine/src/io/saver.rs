//! Save strategies: streaming span bytes to a target device.
//!
//! The full-rewrite path stages everything in memory and only touches
//! the target on [`commit`](Saver::commit), so a save that fails while
//! the document is being streamed never leaves the target partially
//! overwritten. The quick path (append/patch the modified tail) is
//! chosen by the editor and bypasses staging, which is only sound under
//! the editor's quick-save heuristic.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::io::{Device, DeviceError};

/// Chunk size for streaming document bytes during a save.
pub(crate) const SAVE_CHUNK: u64 = 64 * 1024;

/// Which save path ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStrategy {
    /// Patch the modified tail in place and truncate.
    Quick,
    /// Stream the whole document through staging, then overwrite.
    Full,
}

/// Write-through-staging saver bound to one target device.
pub struct Saver {
    target: Arc<dyn Device>,
    staged: Vec<u8>,
}

impl Saver {
    pub fn new(target: Arc<dyn Device>) -> Self {
        Self {
            target,
            staged: Vec::new(),
        }
    }

    /// Stage the next run of document bytes. The target is not touched.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.staged.extend_from_slice(bytes);
        Ok(())
    }

    /// Flush the staged bytes to the target and truncate it to
    /// `final_len`. Consumes the saver.
    pub fn commit(self, final_len: u64) -> Result<(), DeviceError> {
        debug_assert_eq!(self.staged.len() as u64, final_len);
        debug!(bytes = self.staged.len(), "committing staged save");
        let mut position = 0u64;
        for chunk in self.staged.chunks(SAVE_CHUNK as usize) {
            let written = self.target.write(position, chunk)?;
            if written != chunk.len() as u64 {
                return Err(DeviceError::ShortWrite {
                    expected: chunk.len() as u64,
                    written,
                });
            }
            position += written;
        }
        self.target.set_len(final_len)?;
        Ok(())
    }

    /// Abandon the save. The target was never written.
    pub fn fail(self) {
        warn!(staged = self.staged.len(), "save aborted, staging discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufferDevice;

    #[test]
    fn target_is_untouched_until_commit() {
        let target = Arc::new(BufferDevice::new(b"original".to_vec()));
        let mut saver = Saver::new(Arc::clone(&target) as Arc<dyn Device>);

        saver.push_bytes(b"new ").unwrap();
        saver.push_bytes(b"content").unwrap();
        assert_eq!(target.snapshot(), b"original");

        saver.commit(11).unwrap();
        assert_eq!(target.snapshot(), b"new content");
    }

    #[test]
    fn commit_truncates_longer_targets() {
        let target = Arc::new(BufferDevice::new(b"a much longer original".to_vec()));
        let mut saver = Saver::new(Arc::clone(&target) as Arc<dyn Device>);

        saver.push_bytes(b"tiny").unwrap();
        saver.commit(4).unwrap();

        assert_eq!(target.snapshot(), b"tiny");
    }

    #[test]
    fn fail_discards_staging() {
        let target = Arc::new(BufferDevice::new(b"keep me".to_vec()));
        let mut saver = Saver::new(Arc::clone(&target) as Arc<dyn Device>);

        saver.push_bytes(b"doomed").unwrap();
        saver.fail();

        assert_eq!(target.snapshot(), b"keep me");
    }
}
