//! Spans: immutable handles to contiguous byte runs.
//!
//! A span is one link of the chain whose concatenation is the document.
//! The three kinds are closed and dispatched exhaustively: owned data,
//! a window into a backing [`Device`], or a repeating fill pattern.
//! Spans never mutate after construction; `split` produces two fresh
//! spans and editing replaces chain entries wholesale, so installed
//! spans can be read from any thread without extra locking.

use std::fmt;
use std::sync::Arc;

use crate::editing::EditError;
use crate::io::Device;

#[derive(Clone)]
pub enum SpanKind {
    /// Owned bytes, shared with any clones of this span.
    Data {
        bytes: Arc<[u8]>,
        start: usize,
        len: usize,
    },
    /// Window into a backing device. `len == None` is the open-ended
    /// form: length reports zero and reads yield empty.
    Device {
        device: Arc<dyn Device>,
        offset: u64,
        len: Option<u64>,
    },
    /// Repeating pattern. `phase` is the index inside the pattern where
    /// this window starts, so splitting keeps tile alignment.
    Fill {
        pattern: Arc<[u8]>,
        phase: u64,
        len: u64,
    },
}

/// Immutable handle to a contiguous run of document bytes.
///
/// The `savepoint` tag is stamped onto every chain span by a successful
/// save; `None` means the span was created by an edit since the last save.
#[derive(Clone)]
pub struct Span {
    kind: SpanKind,
    savepoint: Option<u64>,
}

impl Span {
    pub fn data(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len();
        Self {
            kind: SpanKind::Data { bytes, start: 0, len },
            savepoint: None,
        }
    }

    pub fn device(device: Arc<dyn Device>, offset: u64, len: u64) -> Self {
        Self {
            kind: SpanKind::Device {
                device,
                offset,
                len: Some(len),
            },
            savepoint: None,
        }
    }

    pub fn device_open_ended(device: Arc<dyn Device>, offset: u64) -> Self {
        Self {
            kind: SpanKind::Device {
                device,
                offset,
                len: None,
            },
            savepoint: None,
        }
    }

    /// Fill span of `repeat` whole tiles of `pattern`.
    pub fn fill(pattern: impl Into<Arc<[u8]>>, repeat: u64) -> Self {
        let pattern = pattern.into();
        assert!(!pattern.is_empty(), "fill pattern must not be empty");
        let len = pattern.len() as u64 * repeat;
        Self {
            kind: SpanKind::Fill {
                pattern,
                phase: 0,
                len,
            },
            savepoint: None,
        }
    }

    /// Fill span of exactly `len` bytes: whole tiles plus a truncated
    /// final tile. Used to synthesize gaps when inserting past the end.
    pub(crate) fn fill_bytes(pattern: &[u8], len: u64) -> Self {
        assert!(!pattern.is_empty(), "fill pattern must not be empty");
        Self {
            kind: SpanKind::Fill {
                pattern: Arc::from(pattern),
                phase: 0,
                len,
            },
            savepoint: None,
        }
    }

    pub fn len(&self) -> u64 {
        match &self.kind {
            SpanKind::Data { len, .. } => *len as u64,
            SpanKind::Device { len, .. } => len.unwrap_or(0),
            SpanKind::Fill { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &SpanKind {
        &self.kind
    }

    pub fn savepoint(&self) -> Option<u64> {
        self.savepoint
    }

    pub(crate) fn set_savepoint(&mut self, tag: u64) {
        self.savepoint = Some(tag);
    }

    pub(crate) fn with_savepoint(mut self, tag: u64) -> Self {
        self.savepoint = Some(tag);
        self
    }

    /// True when this span reads through the given device.
    pub(crate) fn aliases_device(&self, device: &Arc<dyn Device>) -> bool {
        match &self.kind {
            SpanKind::Device { device: own, .. } => Arc::ptr_eq(own, device),
            _ => false,
        }
    }

    /// Read `size` bytes starting at `offset` within this span.
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, EditError> {
        match &self.kind {
            // Open-ended device windows read as empty.
            SpanKind::Device { len: None, .. } => Ok(Vec::new()),
            _ => {
                let len = self.len();
                if offset.checked_add(size).is_none_or(|end| end > len) {
                    return Err(EditError::OutOfBounds {
                        position: offset.saturating_add(size),
                        length: len,
                    });
                }
                self.read_unchecked(offset, size)
            }
        }
    }

    fn read_unchecked(&self, offset: u64, size: u64) -> Result<Vec<u8>, EditError> {
        match &self.kind {
            SpanKind::Data { bytes, start, .. } => {
                let from = start + offset as usize;
                Ok(bytes[from..from + size as usize].to_vec())
            }
            SpanKind::Device {
                device,
                offset: base,
                ..
            } => Ok(device.read(base + offset, size)?),
            SpanKind::Fill {
                pattern, phase, ..
            } => {
                let tile = pattern.len() as u64;
                let mut out = Vec::with_capacity(size as usize);
                for i in 0..size {
                    out.push(pattern[((phase + offset + i) % tile) as usize]);
                }
                Ok(out)
            }
        }
    }

    /// Split into two independent spans whose concatenation equals this
    /// one. Fails for `offset == 0` and `offset >= len`; never mutates
    /// the original.
    pub fn split(&self, offset: u64) -> Result<(Span, Span), EditError> {
        let len = self.len();
        if offset == 0 || offset >= len {
            return Err(EditError::OutOfBounds {
                position: offset,
                length: len,
            });
        }
        let (left, right) = match &self.kind {
            SpanKind::Data { bytes, start, len } => (
                SpanKind::Data {
                    bytes: Arc::clone(bytes),
                    start: *start,
                    len: offset as usize,
                },
                SpanKind::Data {
                    bytes: Arc::clone(bytes),
                    start: start + offset as usize,
                    len: len - offset as usize,
                },
            ),
            SpanKind::Device {
                device,
                offset: base,
                len,
            } => {
                let total = len.expect("open-ended span has zero length");
                (
                    SpanKind::Device {
                        device: Arc::clone(device),
                        offset: *base,
                        len: Some(offset),
                    },
                    SpanKind::Device {
                        device: Arc::clone(device),
                        offset: base + offset,
                        len: Some(total - offset),
                    },
                )
            }
            SpanKind::Fill {
                pattern,
                phase,
                len,
            } => {
                let tile = pattern.len() as u64;
                (
                    SpanKind::Fill {
                        pattern: Arc::clone(pattern),
                        phase: *phase,
                        len: offset,
                    },
                    SpanKind::Fill {
                        pattern: Arc::clone(pattern),
                        phase: (phase + offset) % tile,
                        len: len - offset,
                    },
                )
            }
        };
        Ok((
            Span {
                kind: left,
                savepoint: self.savepoint,
            },
            Span {
                kind: right,
                savepoint: self.savepoint,
            },
        ))
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SpanKind::Data { start, len, .. } => f
                .debug_struct("DataSpan")
                .field("start", start)
                .field("len", len)
                .field("savepoint", &self.savepoint)
                .finish(),
            SpanKind::Device { offset, len, .. } => f
                .debug_struct("DeviceSpan")
                .field("offset", offset)
                .field("len", len)
                .field("savepoint", &self.savepoint)
                .finish(),
            SpanKind::Fill {
                pattern,
                phase,
                len,
            } => f
                .debug_struct("FillSpan")
                .field("pattern_len", &pattern.len())
                .field("phase", phase)
                .field("len", len)
                .field("savepoint", &self.savepoint)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufferDevice;

    fn device(bytes: &[u8]) -> Arc<dyn Device> {
        Arc::new(BufferDevice::new(bytes.to_vec()))
    }

    #[test]
    fn data_span_read_and_bounds() {
        let span = Span::data(b"abcdef".to_vec());

        assert_eq!(span.len(), 6);
        assert_eq!(span.read(0, 6).unwrap(), b"abcdef");
        assert_eq!(span.read(2, 3).unwrap(), b"cde");
        assert_eq!(span.read(6, 0).unwrap(), b"");
        assert!(matches!(
            span.read(4, 3),
            Err(EditError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn data_span_split_shares_storage() {
        let span = Span::data(b"abcdef".to_vec());
        let (left, right) = span.split(2).unwrap();

        assert_eq!(left.read(0, left.len()).unwrap(), b"ab");
        assert_eq!(right.read(0, right.len()).unwrap(), b"cdef");
        // Original is untouched.
        assert_eq!(span.read(0, 6).unwrap(), b"abcdef");
    }

    #[test]
    fn split_rejects_boundaries() {
        let span = Span::data(b"abc".to_vec());
        assert!(span.split(0).is_err());
        assert!(span.split(3).is_err());
        assert!(span.split(4).is_err());
    }

    #[test]
    fn device_span_reads_through_device_window() {
        let dev = device(b"0123456789");
        let span = Span::device(Arc::clone(&dev), 2, 5);

        assert_eq!(span.len(), 5);
        assert_eq!(span.read(0, 5).unwrap(), b"23456");
        assert_eq!(span.read(3, 2).unwrap(), b"56");

        let (left, right) = span.split(2).unwrap();
        assert_eq!(left.read(0, 2).unwrap(), b"23");
        assert_eq!(right.read(0, 3).unwrap(), b"456");
    }

    #[test]
    fn open_ended_device_span_reads_empty() {
        let dev = device(b"0123456789");
        let span = Span::device_open_ended(dev, 0);

        assert_eq!(span.len(), 0);
        assert_eq!(span.read(0, 8).unwrap(), b"");
        assert!(span.split(1).is_err());
    }

    #[test]
    fn fill_span_tiles_pattern() {
        let span = Span::fill(b"ab".to_vec(), 3);

        assert_eq!(span.len(), 6);
        assert_eq!(span.read(0, 6).unwrap(), b"ababab");
        // Reads never fail on tile alignment.
        assert_eq!(span.read(1, 4).unwrap(), b"baba");
        assert_eq!(span.read(3, 2).unwrap(), b"ba");
    }

    #[test]
    fn fill_span_split_keeps_phase() {
        let span = Span::fill(b"abc".to_vec(), 2);
        let (left, right) = span.split(4).unwrap();

        assert_eq!(left.read(0, 4).unwrap(), b"abca");
        assert_eq!(right.read(0, 2).unwrap(), b"bc");
    }

    #[test]
    fn fill_bytes_truncates_final_tile() {
        let span = Span::fill_bytes(b"xyz", 7);

        assert_eq!(span.len(), 7);
        assert_eq!(span.read(0, 7).unwrap(), b"xyzxyzx");
    }

    #[test]
    fn split_halves_inherit_savepoint() {
        let span = Span::data(b"abcd".to_vec()).with_savepoint(3);
        let (left, right) = span.split(2).unwrap();

        assert_eq!(left.savepoint(), Some(3));
        assert_eq!(right.savepoint(), Some(3));
    }

    #[test]
    fn clone_is_structurally_independent() {
        let mut original = Span::data(b"abcd".to_vec());
        let copy = original.clone();
        original.set_savepoint(9);

        assert_eq!(copy.savepoint(), None);
        assert_eq!(copy.read(0, 4).unwrap(), b"abcd");
    }
}
