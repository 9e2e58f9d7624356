//! The editor: facade over the span chain, the action log and the
//! reader/writer lock.
//!
//! Every mutating operation holds the exclusive lock for its entire
//! duration (split + splice + bookkeeping + log update as one critical
//! section), so a reader sees either fully pre-mutation or fully
//! post-mutation state, never a half-relinked chain. Change events are
//! queued under the lock and dispatched to observers after it drops.

use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::editing::actions::{ActionLog, BranchInfo, NodeId, ReplayStep};
use crate::editing::chain::SpanChain;
use crate::editing::cursor::EditorCursor;
use crate::editing::events::{EditorEvent, ObserverId, ObserverList};
use crate::editing::span::Span;
use crate::editing::EditError;
use crate::io::saver::{SaveStrategy, Saver, SAVE_CHUNK};
use crate::io::{BufferDevice, Device};

/// Creation-time knobs, persistable by an embedding application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorOptions {
    /// Reject every mutation.
    pub read_only: bool,
    /// Reject mutations that would change total length.
    pub fixed_size: bool,
}

/// How a replayed primitive adjusts the operation counter.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OpKind {
    /// A fresh user edit: bump the counter and record an action.
    Fresh,
    /// Undo replay: counter runs backwards, nothing is recorded.
    UndoReplay,
    /// Redo replay: counter runs forward again, nothing is recorded.
    RedoReplay,
}

pub(crate) struct EditorState {
    chain: SpanChain,
    device: Arc<dyn Device>,
    read_only: bool,
    fixed_size: bool,
    /// Monotonic edit counter; undo replays walk it backwards.
    op_index: u64,
    /// Value of `op_index` at the last successful save.
    savepoint: u64,
    can_quick_save: bool,
    log: ActionLog,
    /// Events queued under the write lock, dispatched after it drops.
    pending: Vec<EditorEvent>,
}

/// Editable virtual document over a span chain.
///
/// Cheap to clone; clones share the same document state and observers.
#[derive(Clone)]
pub struct Editor {
    shared: Arc<RwLock<EditorState>>,
    observers: Arc<Mutex<ObserverList>>,
}

impl Editor {
    /// Open a device as a document: the initial chain is one device span
    /// over the whole device, stamped as unmodified.
    pub fn new(device: Arc<dyn Device>, options: EditorOptions) -> Result<Self, EditError> {
        let length = device.len()?;
        let chain = SpanChain::from_span(Span::device(Arc::clone(&device), 0, length).with_savepoint(0));
        let read_only = options.read_only || device.is_read_only();
        let fixed_size = options.fixed_size || device.is_fixed_size();
        debug!(length, read_only, fixed_size, "opening editor");
        Ok(Self {
            shared: Arc::new(RwLock::new(EditorState {
                chain,
                device,
                read_only,
                fixed_size,
                op_index: 0,
                savepoint: 0,
                can_quick_save: true,
                log: ActionLog::new(),
                pending: Vec::new(),
            })),
            observers: Arc::new(Mutex::new(ObserverList::default())),
        })
    }

    /// Empty document over a fresh in-memory device.
    pub fn empty() -> Self {
        Self::new(Arc::new(BufferDevice::empty()), EditorOptions::default())
            .expect("in-memory device cannot fail")
    }

    /// Document whose backing device starts with `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Arc::new(BufferDevice::new(bytes.into())), EditorOptions::default())
            .expect("in-memory device cannot fail")
    }

    pub(crate) fn shared(&self) -> &Arc<RwLock<EditorState>> {
        &self.shared
    }

    pub(crate) fn observers(&self) -> &Arc<Mutex<ObserverList>> {
        &self.observers
    }

    fn read_state<R>(&self, f: impl FnOnce(&EditorState) -> R) -> R {
        f(&self.shared.read().expect("editor lock poisoned"))
    }

    /// Run a mutation under the write lock, then dispatch whatever events
    /// it queued. A failed mutation dispatches nothing.
    fn write_state<R>(
        &self,
        f: impl FnOnce(&mut EditorState) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        let (result, events) = {
            let mut state = self.shared.write().expect("editor lock poisoned");
            let result = f(&mut state);
            let events = match &result {
                Ok(_) => std::mem::take(&mut state.pending),
                Err(_) => {
                    state.pending.clear();
                    Vec::new()
                }
            };
            (result, events)
        };
        if !events.is_empty() {
            self.observers.lock().expect("observer lock poisoned").notify(&events);
        }
        result
    }

    // --- queries -----------------------------------------------------

    pub fn len(&self) -> u64 {
        self.read_state(|s| s.chain.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.read_state(|s| s.read_only)
    }

    pub fn is_fixed_size(&self) -> bool {
        self.read_state(|s| s.fixed_size)
    }

    /// Read exactly `size` bytes at `position`.
    pub fn read_exact(&self, position: u64, size: u64) -> Result<Vec<u8>, EditError> {
        self.read_state(|s| s.chain.read_exact(position, size))
    }

    /// Read up to `size` bytes at `position`, clamped to end of data.
    pub fn read(&self, position: u64, size: u64) -> Result<Vec<u8>, EditError> {
        self.read_state(|s| s.chain.read(position, size))
    }

    pub fn read_all(&self) -> Result<Vec<u8>, EditError> {
        self.read_state(|s| s.chain.read_exact(0, s.chain.len()))
    }

    /// Clones of the spans intersecting the given range.
    pub fn spans_in_range(&self, position: u64, len: u64) -> Vec<Span> {
        self.read_state(|s| s.chain.spans_in_range(position, len))
    }

    pub fn is_modified(&self) -> bool {
        self.read_state(EditorState::modified)
    }

    /// Whether any span intersecting the range changed since the last save.
    pub fn is_range_modified(&self, position: u64, len: u64) -> bool {
        self.read_state(|s| {
            s.chain
                .spans_in_range(position, len)
                .iter()
                .any(|span| span.savepoint() != Some(s.savepoint))
        })
    }

    pub fn can_undo(&self) -> bool {
        self.read_state(|s| s.log.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.read_state(|s| s.log.can_redo())
    }

    /// Archived futures that forked at the current undo position.
    pub fn alternative_branches(&self) -> Vec<BranchInfo> {
        self.read_state(|s| s.log.alternative_branches())
    }

    pub fn backing_device(&self) -> Arc<dyn Device> {
        self.read_state(|s| Arc::clone(&s.device))
    }

    // --- mutations ---------------------------------------------------

    /// Insert spans at `position`. Inserting past the end requires a
    /// `fill_pattern` to synthesize the gap.
    pub fn insert_spans(
        &self,
        position: u64,
        spans: &[Span],
        fill_pattern: Option<&[u8]>,
    ) -> Result<(), EditError> {
        self.write_state(|s| s.insert_spans(position, spans, fill_pattern))
    }

    /// Convenience: insert owned bytes.
    pub fn insert_bytes(&self, position: u64, bytes: &[u8]) -> Result<(), EditError> {
        self.insert_spans(position, &[Span::data(bytes.to_vec())], None)
    }

    /// Remove up to `length` bytes at `position` (clamped to end of
    /// data). Returns the number of bytes removed.
    pub fn remove(&self, position: u64, length: u64) -> Result<u64, EditError> {
        self.write_state(|s| s.remove(position, length))
    }

    /// Overwrite starting at `position` as one atomic undo step:
    /// removes the overlapped bytes, then inserts the spans, filling any
    /// gap past the end from `fill_pattern`.
    pub fn write_spans(
        &self,
        position: u64,
        spans: &[Span],
        fill_pattern: Option<&[u8]>,
    ) -> Result<(), EditError> {
        self.write_state(|s| s.write_spans(position, spans, fill_pattern))
    }

    /// Convenience: overwrite with owned bytes.
    pub fn write_bytes(
        &self,
        position: u64,
        bytes: &[u8],
        fill_pattern: Option<&[u8]>,
    ) -> Result<(), EditError> {
        self.write_spans(position, &[Span::data(bytes.to_vec())], fill_pattern)
    }

    /// Open a composite action: every mutation until the matching
    /// [`end_complex`](Self::end_complex) becomes one undo step.
    pub fn begin_complex(&self, title: &str) {
        let mut state = self.shared.write().expect("editor lock poisoned");
        state.log.begin_complex(title);
    }

    /// Close the innermost composite action. Panics on a mismatched
    /// bracket: that is a programmer error, not a recoverable state.
    pub fn end_complex(&self) {
        let mut state = self.shared.write().expect("editor lock poisoned");
        state.log.end_complex();
    }

    /// Revert the most recent undo step. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&self) -> Result<bool, EditError> {
        self.write_state(EditorState::undo)
    }

    /// Re-apply the next redoable step. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&self) -> Result<bool, EditError> {
        self.write_state(EditorState::redo)
    }

    /// Replay a whole archived branch, restoring the bytes that future
    /// produced. Returns `false` when the branch is not eligible at the
    /// current undo position.
    pub fn redo_branch(&self, branch: usize) -> Result<bool, EditError> {
        self.write_state(|s| s.redo_branch(branch))
    }

    /// Save to `target`, or to the backing device when `None`. Without
    /// an explicit target an unmodified document is a no-op (`Ok(None)`).
    /// On success every span is stamped and the modified flag clears.
    pub fn save(&self, target: Option<Arc<dyn Device>>) -> Result<Option<SaveStrategy>, EditError> {
        self.write_state(|s| s.save(target))
    }

    // --- observers and cursors --------------------------------------

    pub fn subscribe(
        &self,
        callback: impl Fn(&EditorEvent) + Send + Sync + 'static,
    ) -> ObserverId {
        self.observers
            .lock()
            .expect("observer lock poisoned")
            .subscribe(Box::new(callback))
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers
            .lock()
            .expect("observer lock poisoned")
            .unsubscribe(id)
    }

    /// Position-tracking read view; activation takes the read lock.
    pub fn create_read_cursor(&self, position: u64) -> EditorCursor {
        EditorCursor::new(self.clone(), position, false)
    }

    /// Position-tracking write view; activation takes the write lock.
    pub fn create_write_cursor(&self, position: u64) -> Result<EditorCursor, EditError> {
        if self.is_read_only() {
            return Err(EditError::ReadOnly);
        }
        Ok(EditorCursor::new(self.clone(), position, true))
    }
}

impl EditorState {
    pub(crate) fn chain(&self) -> &SpanChain {
        &self.chain
    }

    pub(crate) fn read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn take_pending(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.pending)
    }

    fn modified(&self) -> bool {
        self.op_index != self.savepoint
    }

    fn ensure_writable(&self) -> Result<(), EditError> {
        if self.read_only {
            return Err(EditError::ReadOnly);
        }
        Ok(())
    }

    fn event(&mut self, event: EditorEvent) {
        self.pending.push(event);
    }

    /// Emit a `ModifiedChanged` if the flag flipped across `op`.
    fn tracking_modified<R>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<R, EditError>,
    ) -> Result<R, EditError> {
        let was = self.modified();
        let result = op(self)?;
        let now = self.modified();
        if was != now {
            self.event(EditorEvent::ModifiedChanged { modified: now });
        }
        Ok(result)
    }

    /// Core insert: `position` must already be clamped to the chain,
    /// spans must already be owned clones.
    fn apply_insert(
        &mut self,
        position: u64,
        spans: Vec<Span>,
        kind: OpKind,
    ) -> Result<u64, EditError> {
        let old_len = self.chain.len();
        if self.can_quick_save
            && (position < old_len
                || spans.iter().any(|span| span.aliases_device(&self.device)))
        {
            trace!(position, "quick save no longer possible");
            self.can_quick_save = false;
        }
        let added = self.chain.insert_at(position, spans.clone())?;
        match kind {
            OpKind::Fresh => {
                self.op_index += 1;
                self.log.record_insert(position, spans, added);
            }
            OpKind::UndoReplay => self.op_index -= 1,
            OpKind::RedoReplay => self.op_index += 1,
        }
        self.event(EditorEvent::Resized {
            length: self.chain.len(),
        });
        self.event(EditorEvent::DataChanged {
            position,
            length: None,
        });
        self.event(EditorEvent::BytesInserted {
            position,
            length: added,
        });
        Ok(added)
    }

    /// Core remove: `length` must already be clamped to available bytes.
    fn apply_remove(
        &mut self,
        position: u64,
        length: u64,
        kind: OpKind,
    ) -> Result<u64, EditError> {
        let old_len = self.chain.len();
        if self.can_quick_save && position + length < old_len {
            trace!(position, "quick save no longer possible");
            self.can_quick_save = false;
        }
        let removed = self.chain.remove_range(position, length)?;
        match kind {
            OpKind::Fresh => {
                self.op_index += 1;
                self.log.record_remove(position, removed, length);
            }
            OpKind::UndoReplay => self.op_index -= 1,
            OpKind::RedoReplay => self.op_index += 1,
        }
        self.event(EditorEvent::Resized {
            length: self.chain.len(),
        });
        self.event(EditorEvent::DataChanged {
            position,
            length: None,
        });
        self.event(EditorEvent::BytesRemoved {
            position,
            length,
        });
        Ok(length)
    }

    pub(crate) fn insert_spans(
        &mut self,
        position: u64,
        spans: &[Span],
        fill_pattern: Option<&[u8]>,
    ) -> Result<(), EditError> {
        self.ensure_writable()?;
        let length = self.chain.len();
        let mut to_insert = Vec::with_capacity(spans.len() + 1);
        let position = if position > length {
            // A gap past the end must be synthesized from a fill pattern.
            let Some(pattern) = fill_pattern.filter(|p| !p.is_empty()) else {
                return Err(EditError::OutOfBounds { position, length });
            };
            to_insert.push(Span::fill_bytes(pattern, position - length));
            length
        } else {
            position
        };
        // The editor owns independent copies; the caller's spans (and any
        // action still holding them) stay valid across later edits.
        to_insert.extend(spans.iter().cloned());
        let added: u64 = to_insert.iter().map(Span::len).sum();
        if added == 0 {
            return Ok(());
        }
        if self.fixed_size {
            return Err(EditError::FreezeSize);
        }
        debug!(position, added, "insert");
        self.tracking_modified(|s| s.apply_insert(position, to_insert, OpKind::Fresh))?;
        Ok(())
    }

    pub(crate) fn remove(&mut self, position: u64, length: u64) -> Result<u64, EditError> {
        self.ensure_writable()?;
        let total = self.chain.len();
        if position >= total {
            return Err(EditError::OutOfBounds {
                position,
                length: total,
            });
        }
        let length = length.min(total - position);
        if length == 0 {
            return Ok(0);
        }
        if self.fixed_size {
            return Err(EditError::FreezeSize);
        }
        debug!(position, length, "remove");
        self.tracking_modified(|s| s.apply_remove(position, length, OpKind::Fresh))
    }

    pub(crate) fn write_spans(
        &mut self,
        position: u64,
        spans: &[Span],
        fill_pattern: Option<&[u8]>,
    ) -> Result<(), EditError> {
        self.ensure_writable()?;
        let write_len: u64 = spans.iter().map(Span::len).sum();
        let length = self.chain.len();
        if self.fixed_size && position.checked_add(write_len).is_none_or(|end| end > length) {
            return Err(EditError::FreezeSize);
        }
        if position > length && fill_pattern.is_none_or(<[u8]>::is_empty) {
            return Err(EditError::OutOfBounds { position, length });
        }
        if write_len == 0 {
            return Ok(());
        }
        debug!(position, write_len, "write");
        self.tracking_modified(|s| {
            // One user-visible undo step for what is logically a single
            // overwrite, even though it runs as remove + insert.
            s.log.begin_complex("replace bytes");
            if position < length {
                let overlap = write_len.min(length - position);
                s.apply_remove(position, overlap, OpKind::Fresh)?;
            }
            s.insert_recorded(position, spans, fill_pattern)?;
            s.log.end_complex();
            Ok(())
        })
    }

    /// Replace `remove_len` bytes at `position` with `spans`, bracketed
    /// as one undo step. Used by cursors for unequal-length overwrites.
    pub(crate) fn replace_range(
        &mut self,
        position: u64,
        remove_len: u64,
        spans: &[Span],
    ) -> Result<(), EditError> {
        self.ensure_writable()?;
        let insert_len: u64 = spans.iter().map(Span::len).sum();
        let length = self.chain.len();
        if position > length {
            return Err(EditError::OutOfBounds { position, length });
        }
        let remove_len = remove_len.min(length - position);
        if self.fixed_size && insert_len != remove_len {
            return Err(EditError::FreezeSize);
        }
        if remove_len == 0 && insert_len == 0 {
            return Ok(());
        }
        debug!(position, remove_len, insert_len, "replace range");
        self.tracking_modified(|s| {
            s.log.begin_complex("replace range");
            if remove_len > 0 {
                s.apply_remove(position, remove_len, OpKind::Fresh)?;
            }
            if insert_len > 0 {
                s.apply_insert(position, spans.to_vec(), OpKind::Fresh)?;
            }
            s.log.end_complex();
            Ok(())
        })
    }

    /// Insert within an already-validated composite: preconditions were
    /// checked by the caller, recording still happens.
    fn insert_recorded(
        &mut self,
        position: u64,
        spans: &[Span],
        fill_pattern: Option<&[u8]>,
    ) -> Result<(), EditError> {
        let length = self.chain.len();
        let mut to_insert = Vec::with_capacity(spans.len() + 1);
        let position = if position > length {
            let pattern = fill_pattern.expect("gap checked by caller");
            to_insert.push(Span::fill_bytes(pattern, position - length));
            length
        } else {
            position
        };
        to_insert.extend(spans.iter().cloned());
        self.apply_insert(position, to_insert, OpKind::Fresh)?;
        Ok(())
    }

    fn apply_steps(&mut self, steps: Vec<ReplayStep>, kind: OpKind) -> Result<(), EditError> {
        for step in steps {
            match step {
                ReplayStep::Insert { position, spans } => {
                    self.apply_insert(position, spans, kind)?;
                }
                ReplayStep::Remove { position, length } => {
                    self.apply_remove(position, length, kind)?;
                }
            }
        }
        Ok(())
    }

    fn undo(&mut self) -> Result<bool, EditError> {
        self.ensure_writable()?;
        if self.log.has_open_complex() {
            warn!("undo ignored inside an open complex action");
            return Ok(false);
        }
        let Some(id) = self.log.next_undo() else {
            return Ok(false);
        };
        debug!(action = %self.log.title(id), "undo");
        self.tracking_modified(|s| {
            let steps = s.log.undo_steps(id);
            s.apply_steps(steps, OpKind::UndoReplay)?;
            s.log.note_undone();
            Ok(true)
        })
    }

    fn redo(&mut self) -> Result<bool, EditError> {
        self.ensure_writable()?;
        if self.log.has_open_complex() {
            warn!("redo ignored inside an open complex action");
            return Ok(false);
        }
        let Some(id) = self.log.next_redo() else {
            return Ok(false);
        };
        debug!(action = %self.log.title(id), "redo");
        self.tracking_modified(|s| {
            let steps = s.log.redo_steps(id);
            s.apply_steps(steps, OpKind::RedoReplay)?;
            s.log.note_redone();
            Ok(true)
        })
    }

    fn redo_branch(&mut self, branch: usize) -> Result<bool, EditError> {
        self.ensure_writable()?;
        if self.log.has_open_complex() {
            warn!("redo_branch ignored inside an open complex action");
            return Ok(false);
        }
        let Some(actions) = self.log.reattach_branch(branch) else {
            return Ok(false);
        };
        debug!(steps = actions.len(), "redoing archived branch");
        self.tracking_modified(|s| {
            for id in actions {
                let steps = s.log.redo_steps(id);
                s.apply_steps(steps, OpKind::RedoReplay)?;
                s.log.note_redone();
            }
            Ok(true)
        })
    }

    fn save(&mut self, target: Option<Arc<dyn Device>>) -> Result<Option<SaveStrategy>, EditError> {
        let target = match target {
            Some(target) => target,
            None => {
                if !self.modified() {
                    return Ok(None);
                }
                Arc::clone(&self.device)
            }
        };
        if target.is_read_only() {
            return Err(EditError::ReadOnly);
        }
        let in_place = Arc::ptr_eq(&target, &self.device);
        let length = self.chain.len();
        let strategy = if in_place && self.can_quick_save {
            SaveStrategy::Quick
        } else {
            SaveStrategy::Full
        };
        debug!(length, ?strategy, in_place, "saving");
        match strategy {
            SaveStrategy::Quick => {
                // Only bytes from the first modified span onward differ
                // from the device; patch them in place and truncate.
                let start = self
                    .chain
                    .first_modified_offset(self.savepoint)
                    .unwrap_or(length);
                let mut position = start;
                while position < length {
                    let chunk = self.chain.read(position, SAVE_CHUNK)?;
                    let written = target.write(position, &chunk)?;
                    if written != chunk.len() as u64 {
                        return Err(EditError::Device(
                            crate::io::DeviceError::ShortWrite {
                                expected: chunk.len() as u64,
                                written,
                            },
                        ));
                    }
                    position += chunk.len() as u64;
                }
                target.set_len(length)?;
            }
            SaveStrategy::Full => {
                let mut saver = Saver::new(Arc::clone(&target));
                let mut position = 0u64;
                while position < length {
                    let chunk = self.chain.read(position, SAVE_CHUNK)?;
                    position += chunk.len() as u64;
                    if let Err(error) = saver.push_bytes(&chunk) {
                        saver.fail();
                        return Err(error.into());
                    }
                }
                saver.commit(length)?;
            }
        }
        let was_modified = self.modified();
        self.savepoint = self.op_index;
        self.chain.stamp_savepoint(self.savepoint);
        if in_place && strategy == SaveStrategy::Full {
            // The device's bytes were replaced wholesale: device windows
            // held by history would now read the new content at stale
            // offsets, so the chain is rebased and the history dropped.
            self.chain = SpanChain::from_span(
                Span::device(Arc::clone(&self.device), 0, length).with_savepoint(self.savepoint),
            );
            self.log.reset();
        }
        if was_modified {
            self.event(EditorEvent::ModifiedChanged { modified: false });
        }
        Ok(Some(strategy))
    }
}
