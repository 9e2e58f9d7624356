//! Byte-addressable backing stores consumed by the editing core.
//!
//! A [`Device`] is where document bytes ultimately live: a file on disk or
//! an in-memory buffer. Devices carry their own lock, independent of any
//! editor lock, because a single device may back spans in several editors
//! at once. A long device read therefore only serializes at the device,
//! never at unrelated editors.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

pub mod registry;
pub mod saver;

pub use registry::DeviceRegistry;
pub use saver::{SaveStrategy, Saver};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device is read-only")]
    ReadOnly,
    #[error("device has a fixed size")]
    FixedSize,
    #[error("short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: u64, written: u64 },
}

/// Byte-addressable backing store.
///
/// Implementations guard their own state; all methods take `&self` and are
/// safe to call from multiple threads. Reads shorter than requested are
/// permitted only when the range runs past end-of-data.
pub trait Device: Send + Sync {
    /// Read up to `len` bytes starting at `position`.
    fn read(&self, position: u64, len: u64) -> Result<Vec<u8>, DeviceError>;

    /// Write `data` at `position`, returning the number of bytes written.
    /// Writing past the current end grows the device.
    fn write(&self, position: u64, data: &[u8]) -> Result<u64, DeviceError>;

    /// Current length in bytes.
    fn len(&self) -> Result<u64, DeviceError>;

    /// Truncate or extend the device to `len` bytes.
    fn set_len(&self, len: u64) -> Result<(), DeviceError>;

    fn is_read_only(&self) -> bool;

    fn is_fixed_size(&self) -> bool;
}

/// Growable in-memory device.
pub struct BufferDevice {
    bytes: RwLock<Vec<u8>>,
    read_only: bool,
    fixed_size: bool,
}

impl BufferDevice {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
            read_only: false,
            fixed_size: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn read_only(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
            read_only: true,
            fixed_size: true,
        }
    }

    /// Writable but never resized, e.g. a fixed disk image.
    pub fn fixed_size(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
            read_only: false,
            fixed_size: true,
        }
    }

    /// Snapshot of the current contents, for tests and staging.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().expect("buffer device lock poisoned").clone()
    }
}

impl Device for BufferDevice {
    fn read(&self, position: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        let bytes = self.bytes.read().expect("buffer device lock poisoned");
        let start = (position as usize).min(bytes.len());
        let end = start.saturating_add(len as usize).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    fn write(&self, position: u64, data: &[u8]) -> Result<u64, DeviceError> {
        if self.read_only {
            return Err(DeviceError::ReadOnly);
        }
        let mut bytes = self.bytes.write().expect("buffer device lock poisoned");
        let end = position as usize + data.len();
        if end > bytes.len() {
            if self.fixed_size {
                return Err(DeviceError::FixedSize);
            }
            bytes.resize(end, 0);
        }
        bytes[position as usize..end].copy_from_slice(data);
        Ok(data.len() as u64)
    }

    fn len(&self) -> Result<u64, DeviceError> {
        Ok(self.bytes.read().expect("buffer device lock poisoned").len() as u64)
    }

    fn set_len(&self, len: u64) -> Result<(), DeviceError> {
        if self.read_only {
            return Err(DeviceError::ReadOnly);
        }
        if self.fixed_size {
            return Err(DeviceError::FixedSize);
        }
        let mut bytes = self.bytes.write().expect("buffer device lock poisoned");
        bytes.resize(len as usize, 0);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn is_fixed_size(&self) -> bool {
        self.fixed_size
    }
}

/// File-backed device using positioned reads and writes.
pub struct FileDevice {
    file: Mutex<File>,
    path: PathBuf,
    read_only: bool,
}

impl FileDevice {
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            read_only: false,
        })
    }

    pub fn open_read_only(path: &Path) -> Result<Self, DeviceError> {
        let file = File::open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            read_only: true,
        })
    }

    /// Create (or truncate) a file as a save target.
    pub fn create(path: &Path) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            read_only: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Device for FileDevice {
    fn read(&self, position: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        let mut file = self.file.lock().expect("file device lock poisoned");
        let file_len = file.metadata()?.len();
        if position >= file_len {
            return Ok(Vec::new());
        }
        let available = (file_len - position).min(len);
        let mut buf = vec![0u8; available as usize];
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write(&self, position: u64, data: &[u8]) -> Result<u64, DeviceError> {
        if self.read_only {
            return Err(DeviceError::ReadOnly);
        }
        let mut file = self.file.lock().expect("file device lock poisoned");
        file.seek(SeekFrom::Start(position))?;
        file.write_all(data)?;
        Ok(data.len() as u64)
    }

    fn len(&self) -> Result<u64, DeviceError> {
        let file = self.file.lock().expect("file device lock poisoned");
        Ok(file.metadata()?.len())
    }

    fn set_len(&self, len: u64) -> Result<(), DeviceError> {
        if self.read_only {
            return Err(DeviceError::ReadOnly);
        }
        let file = self.file.lock().expect("file device lock poisoned");
        file.set_len(len)?;
        file.sync_data()?;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn is_fixed_size(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn buffer_device_reads_are_clamped_to_end_of_data() {
        let device = BufferDevice::new(b"hello".to_vec());

        assert_eq!(device.read(0, 5).unwrap(), b"hello");
        assert_eq!(device.read(3, 10).unwrap(), b"lo");
        assert_eq!(device.read(5, 4).unwrap(), b"");
        assert_eq!(device.read(100, 4).unwrap(), b"");
    }

    #[test]
    fn buffer_device_write_grows_and_overwrites() {
        let device = BufferDevice::new(b"hello".to_vec());

        assert_eq!(device.write(0, b"HE").unwrap(), 2);
        assert_eq!(device.snapshot(), b"HEllo");

        // Writing past the end grows the buffer, zero-filling the gap.
        assert_eq!(device.write(7, b"!!").unwrap(), 2);
        assert_eq!(device.snapshot(), b"HEllo\0\0!!");
    }

    #[test]
    fn read_only_buffer_device_rejects_mutation() {
        let device = BufferDevice::read_only(b"data".to_vec());

        assert!(matches!(device.write(0, b"x"), Err(DeviceError::ReadOnly)));
        assert!(matches!(device.set_len(0), Err(DeviceError::ReadOnly)));
        assert_eq!(device.read(0, 4).unwrap(), b"data");
    }

    #[test]
    fn fixed_size_buffer_device_allows_in_place_writes_only() {
        let device = BufferDevice::fixed_size(b"0123".to_vec());

        assert_eq!(device.write(1, b"xy").unwrap(), 2);
        assert_eq!(device.snapshot(), b"0xy3");
        assert!(matches!(device.write(3, b"overflow"), Err(DeviceError::FixedSize)));
        assert!(matches!(device.set_len(2), Err(DeviceError::FixedSize)));
    }

    #[test]
    fn file_device_round_trip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"file contents").unwrap();
        tmp.flush().unwrap();

        let device = FileDevice::open(tmp.path()).unwrap();
        assert_eq!(device.len().unwrap(), 13);
        assert_eq!(device.read(5, 8).unwrap(), b"contents");

        device.write(0, b"FILE").unwrap();
        assert_eq!(device.read(0, 4).unwrap(), b"FILE");

        device.set_len(4).unwrap();
        assert_eq!(device.len().unwrap(), 4);
        assert_eq!(device.read(0, 100).unwrap(), b"FILE");
    }

    #[test]
    fn read_only_file_device_rejects_writes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"immutable").unwrap();
        tmp.flush().unwrap();

        let device = FileDevice::open_read_only(tmp.path()).unwrap();
        assert!(matches!(device.write(0, b"x"), Err(DeviceError::ReadOnly)));
        assert_eq!(device.read(0, 9).unwrap(), b"immutable");
    }
}
