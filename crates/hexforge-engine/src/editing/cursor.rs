//! Cursors: stateful, position-tracking views with sequential get/put
//! semantics.
//!
//! Positions are `i64` offsets relative to the cursor's anchor, and
//! `minimal`/`maximal` report how far left/right valid data extends
//! *from the current position*, not absolute offsets. Two flavors:
//!
//! - [`DataCursor`] walks an owned byte buffer, for decode-only contexts
//!   that never touch an editor. Activation is a runtime reference
//!   count; access without it is a [`CursorInactive`](EditError) error.
//! - [`EditorCursor`] is bound to an [`Editor`]. `activate()` returns an
//!   RAII [`ActiveCursor`] guard holding the editor's read or write lock
//!   for the whole activation scope, released on every exit path by
//!   `Drop`.

use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::editing::editor::{Editor, EditorState};
use crate::editing::span::Span;
use crate::editing::EditError;

/// Sequential byte access shared by every cursor flavor.
pub trait Cursor {
    /// Current position, relative to the cursor's anchor.
    fn position(&self) -> i64;

    fn seek(&mut self, position: i64);

    /// Lowest relative offset with valid data.
    fn minimal(&self) -> i64;

    /// Highest relative offset with valid data; one less than `minimal`
    /// when no data is reachable.
    fn maximal(&self) -> i64;

    /// Read up to `n` bytes and advance by the bytes actually read.
    fn get(&mut self, n: u64) -> Result<Vec<u8>, EditError>;

    /// Overwrite at the current position and advance by `data.len()`.
    fn put(&mut self, data: &[u8]) -> Result<(), EditError>;

    /// Bytes in the relative range `[start, stop)`, clamped to
    /// `[minimal, maximal + 1)`. Does not move the cursor.
    fn read_range(&self, start: i64, stop: i64) -> Result<Vec<u8>, EditError>;
}

fn clamp_range(start: i64, stop: i64, minimal: i64, maximal: i64) -> (i64, i64) {
    let start = start.max(minimal).min(maximal + 1);
    let stop = stop.min(maximal + 1).max(start);
    (start, stop)
}

/// Cursor over an owned byte buffer, used where decoded structures are
/// built without an editor. Must be activated before any access.
pub struct DataCursor {
    data: Vec<u8>,
    anchor: u64,
    position: i64,
    activation: u32,
    read_only: bool,
}

impl DataCursor {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            anchor: 0,
            position: 0,
            activation: 0,
            read_only: false,
        }
    }

    pub fn read_only(data: Vec<u8>) -> Self {
        Self {
            read_only: true,
            ..Self::new(data)
        }
    }

    /// Anchor all relative positions at `anchor` instead of zero.
    pub fn with_anchor(mut self, anchor: u64) -> Self {
        self.anchor = anchor;
        self
    }

    /// Reference-counted activation; nesting is legal.
    pub fn activate(&mut self) {
        self.activation += 1;
    }

    pub fn deactivate(&mut self) {
        assert!(self.activation > 0, "deactivate without matching activate");
        self.activation -= 1;
    }

    pub fn is_active(&self) -> bool {
        self.activation > 0
    }

    fn ensure_active(&self) -> Result<(), EditError> {
        if self.activation == 0 {
            return Err(EditError::CursorInactive);
        }
        Ok(())
    }

    fn absolute(&self, relative: i64) -> Result<u64, EditError> {
        let absolute = self.anchor as i64 + relative;
        u64::try_from(absolute).map_err(|_| EditError::OutOfBounds {
            position: 0,
            length: self.data.len() as u64,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Cursor for DataCursor {
    fn position(&self) -> i64 {
        self.position
    }

    fn seek(&mut self, position: i64) {
        self.position = position;
    }

    fn minimal(&self) -> i64 {
        -(self.anchor as i64 + self.position)
    }

    fn maximal(&self) -> i64 {
        self.data.len() as i64 - 1 - (self.anchor as i64 + self.position)
    }

    fn get(&mut self, n: u64) -> Result<Vec<u8>, EditError> {
        self.ensure_active()?;
        let absolute = self.absolute(self.position)? as usize;
        let start = absolute.min(self.data.len());
        let stop = start.saturating_add(n as usize).min(self.data.len());
        let bytes = self.data[start..stop].to_vec();
        self.position += bytes.len() as i64;
        Ok(bytes)
    }

    fn put(&mut self, data: &[u8]) -> Result<(), EditError> {
        self.ensure_active()?;
        if self.read_only {
            return Err(EditError::ReadOnly);
        }
        let absolute = self.absolute(self.position)? as usize;
        if absolute > self.data.len() {
            return Err(EditError::OutOfBounds {
                position: absolute as u64,
                length: self.data.len() as u64,
            });
        }
        let end = absolute + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[absolute..end].copy_from_slice(data);
        self.position += data.len() as i64;
        Ok(())
    }

    fn read_range(&self, start: i64, stop: i64) -> Result<Vec<u8>, EditError> {
        self.ensure_active()?;
        let (start, stop) = clamp_range(start, stop, self.minimal(), self.maximal());
        let from = self.absolute(self.position + start)? as usize;
        let to = self.absolute(self.position + stop)? as usize;
        Ok(self.data[from..to].to_vec())
    }
}

/// Cursor bound to an editor. Carries no lock until activated.
pub struct EditorCursor {
    editor: Editor,
    anchor: u64,
    position: i64,
    write: bool,
}

enum Guard<'c> {
    Read(RwLockReadGuard<'c, EditorState>),
    Write(RwLockWriteGuard<'c, EditorState>),
}

impl Guard<'_> {
    fn state(&self) -> &EditorState {
        match self {
            Guard::Read(guard) => guard,
            Guard::Write(guard) => guard,
        }
    }

    fn state_mut(&mut self) -> Result<&mut EditorState, EditError> {
        match self {
            Guard::Read(_) => Err(EditError::ReadOnly),
            Guard::Write(guard) => Ok(guard),
        }
    }
}

impl EditorCursor {
    pub(crate) fn new(editor: Editor, anchor: u64, write: bool) -> Self {
        Self {
            editor,
            anchor,
            position: 0,
            write,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn seek(&mut self, position: i64) {
        self.position = position;
    }

    /// Acquire the editor's matching lock for the activation scope. The
    /// returned guard is the only way to touch document bytes; dropping
    /// it releases the lock on every exit path.
    pub fn activate(&mut self) -> Result<ActiveCursor<'_>, EditError> {
        let Self {
            editor,
            anchor,
            position,
            write,
        } = self;
        let guard = if *write {
            let guard = editor.shared().write().expect("editor lock poisoned");
            if guard.read_only() {
                return Err(EditError::ReadOnly);
            }
            Guard::Write(guard)
        } else {
            Guard::Read(editor.shared().read().expect("editor lock poisoned"))
        };
        Ok(ActiveCursor {
            editor: &*editor,
            anchor: *anchor,
            position,
            guard: Some(guard),
        })
    }
}

/// An activated [`EditorCursor`]: holds the editor lock, exposes the
/// sequential access API, and dispatches any change events it produced
/// when it goes out of scope.
pub struct ActiveCursor<'c> {
    editor: &'c Editor,
    anchor: u64,
    position: &'c mut i64,
    guard: Option<Guard<'c>>,
}

impl<'c> ActiveCursor<'c> {
    fn guard(&self) -> &Guard<'c> {
        self.guard.as_ref().expect("guard alive until drop")
    }

    fn guard_mut(&mut self) -> &mut Guard<'c> {
        self.guard.as_mut().expect("guard alive until drop")
    }

    fn doc_len(&self) -> u64 {
        self.guard().state().chain().len()
    }

    fn absolute(&self, relative: i64) -> Result<u64, EditError> {
        let absolute = self.anchor as i64 + relative;
        u64::try_from(absolute).map_err(|_| EditError::OutOfBounds {
            position: 0,
            length: self.doc_len(),
        })
    }

    /// Replace the relative range `[start, stop)` with `value` as one
    /// undo step: a plain overwrite when the lengths match, a bracketed
    /// remove + insert otherwise.
    pub fn write(&mut self, start: i64, stop: i64, value: &[u8]) -> Result<(), EditError> {
        let from = self.absolute(start)?;
        let to = self.absolute(stop.max(start))?;
        let replaced = to - from;
        let state = self.guard_mut().state_mut()?;
        if replaced == value.len() as u64 {
            state.write_spans(from, &[Span::data(value.to_vec())], None)
        } else {
            state.replace_range(from, replaced, &[Span::data(value.to_vec())])
        }
    }
}

impl Cursor for ActiveCursor<'_> {
    fn position(&self) -> i64 {
        *self.position
    }

    fn seek(&mut self, position: i64) {
        *self.position = position;
    }

    fn minimal(&self) -> i64 {
        -(self.anchor as i64 + *self.position)
    }

    fn maximal(&self) -> i64 {
        self.doc_len() as i64 - 1 - (self.anchor as i64 + *self.position)
    }

    fn get(&mut self, n: u64) -> Result<Vec<u8>, EditError> {
        let absolute = self.absolute(*self.position)?;
        let bytes = self.guard().state().chain().read(absolute, n)?;
        *self.position += bytes.len() as i64;
        Ok(bytes)
    }

    fn put(&mut self, data: &[u8]) -> Result<(), EditError> {
        if data.is_empty() {
            return Ok(());
        }
        let absolute = self.absolute(*self.position)?;
        let state = self.guard_mut().state_mut()?;
        state.write_spans(absolute, &[Span::data(data.to_vec())], None)?;
        *self.position += data.len() as i64;
        Ok(())
    }

    fn read_range(&self, start: i64, stop: i64) -> Result<Vec<u8>, EditError> {
        let (start, stop) = clamp_range(start, stop, self.minimal(), self.maximal());
        let from = self.absolute(*self.position + start)?;
        let to = self.absolute(*self.position + stop)?;
        self.guard().state().chain().read_exact(from, to - from)
    }
}

impl Drop for ActiveCursor<'_> {
    fn drop(&mut self) {
        let events = match self.guard.as_mut() {
            Some(Guard::Write(state)) => state.take_pending(),
            _ => Vec::new(),
        };
        // Release the lock before notifying, so observers may re-enter
        // the editor's read API.
        self.guard = None;
        if !events.is_empty() {
            self.editor
                .observers()
                .lock()
                .expect("observer lock poisoned")
                .notify(&events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_cursor_requires_activation() {
        let mut cursor = DataCursor::new(b"abc".to_vec());
        assert!(matches!(cursor.get(1), Err(EditError::CursorInactive)));

        cursor.activate();
        assert_eq!(cursor.get(1).unwrap(), b"a");

        // Nested activation stays active until the outermost deactivate.
        cursor.activate();
        cursor.deactivate();
        assert_eq!(cursor.get(1).unwrap(), b"b");

        cursor.deactivate();
        assert!(matches!(cursor.get(1), Err(EditError::CursorInactive)));
    }

    #[test]
    fn data_cursor_get_advances_by_bytes_read() {
        let mut cursor = DataCursor::new(b"abcdef".to_vec());
        cursor.activate();

        assert_eq!(cursor.get(4).unwrap(), b"abcd");
        assert_eq!(cursor.position(), 4);
        // Short read at end of data.
        assert_eq!(cursor.get(10).unwrap(), b"ef");
        assert_eq!(cursor.position(), 6);
        assert_eq!(cursor.get(1).unwrap(), b"");
    }

    #[test]
    fn data_cursor_put_overwrites_and_extends() {
        let mut cursor = DataCursor::new(b"abcdef".to_vec());
        cursor.activate();
        cursor.seek(4);

        cursor.put(b"XYZ").unwrap();
        assert_eq!(cursor.position(), 7);
        assert_eq!(cursor.into_bytes(), b"abcdXYZ");
    }

    #[test]
    fn read_only_data_cursor_rejects_put() {
        let mut cursor = DataCursor::read_only(b"abc".to_vec());
        cursor.activate();
        assert!(matches!(cursor.put(b"x"), Err(EditError::ReadOnly)));
    }

    #[test]
    fn relative_bounds_track_position() {
        let mut cursor = DataCursor::new(b"abcdef".to_vec());
        cursor.activate();
        cursor.seek(2);

        assert_eq!(cursor.minimal(), -2);
        assert_eq!(cursor.maximal(), 3);

        // Ranges clamp to the valid window.
        assert_eq!(cursor.read_range(-10, 10).unwrap(), b"abcdef");
        assert_eq!(cursor.read_range(-1, 2).unwrap(), b"bcd");
    }

    #[test]
    fn editor_cursor_reads_through_the_chain() {
        let editor = Editor::from_bytes(b"Hello, World!".to_vec());
        let mut cursor = editor.create_read_cursor(7);

        let mut active = cursor.activate().unwrap();
        assert_eq!(active.get(5).unwrap(), b"World");
        assert_eq!(active.position(), 5);
        assert_eq!(active.minimal(), -12);
        assert_eq!(active.maximal(), 0);
    }

    #[test]
    fn editor_cursor_put_is_an_overwrite() {
        let editor = Editor::from_bytes(b"Hello, World!".to_vec());
        let mut cursor = editor.create_write_cursor(7).unwrap();

        {
            let mut active = cursor.activate().unwrap();
            active.put(b"Rust!").unwrap();
        }

        assert_eq!(editor.read_all().unwrap(), b"Hello, Rust!!");
        assert!(editor.undo().unwrap());
        assert_eq!(editor.read_all().unwrap(), b"Hello, World!");
    }

    #[test]
    fn editor_cursor_write_replaces_unequal_range_as_one_step() {
        let editor = Editor::from_bytes(b"0123456789".to_vec());
        let mut cursor = editor.create_write_cursor(2).unwrap();

        {
            let mut active = cursor.activate().unwrap();
            active.write(0, 6, b"##").unwrap();
        }

        assert_eq!(editor.read_all().unwrap(), b"01##89");
        assert!(editor.undo().unwrap());
        assert_eq!(editor.read_all().unwrap(), b"0123456789");
    }

    #[test]
    fn read_cursor_cannot_write() {
        let editor = Editor::from_bytes(b"abc".to_vec());
        let mut cursor = editor.create_read_cursor(0);
        let mut active = cursor.activate().unwrap();
        assert!(matches!(active.put(b"x"), Err(EditError::ReadOnly)));
    }

    #[test]
    fn write_cursor_on_read_only_editor_fails_at_creation() {
        use crate::editing::editor::EditorOptions;
        use crate::io::BufferDevice;
        use std::sync::Arc;

        let editor = Editor::new(
            Arc::new(BufferDevice::new(b"abc".to_vec())),
            EditorOptions {
                read_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            editor.create_write_cursor(0),
            Err(EditError::ReadOnly)
        ));
    }
}
