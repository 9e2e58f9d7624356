/*!
 * # Editing Core Module
 *
 * The editable virtual-document engine: a span chain (piece table) that
 * lets callers treat an arbitrarily large byte sequence — backed by
 * in-memory buffers, fill patterns, or external devices — as one
 * mutable byte array.
 *
 * ## Architecture Overview
 *
 * ### 1. Single Source of Truth: the span chain
 * - The document is the concatenation of immutable [`Span`]s
 * - Insert/remove/overwrite at arbitrary offsets splice the chain
 *   without copying the document
 * - Spans are copy-on-split: once installed they never change, so
 *   readers share them freely
 *
 * ### 2. Transactional Mutation
 * - Every operation validates its preconditions before touching the
 *   chain; a failed call leaves chain and history exactly as they were
 * - Logically-single overwrites run as remove + insert inside one
 *   composite action, so they undo as one step
 *
 * ### 3. Branching Undo History
 * - Every mutation records an action in an arena-indexed tree
 * - Editing after an undo archives the abandoned future as a branch
 *   instead of discarding it; branches can be replayed later
 *
 * ### 4. Reader/Writer Discipline
 * - One lock guards the chain, counters and history: unlimited readers
 *   or exactly one writer
 * - Mutations hold the lock for their whole critical section, so no
 *   reader ever observes a half-relinked chain
 * - Cursors hold the matching lock for their activation scope
 *
 * ## Module Structure
 *
 * - **`span`**: the three span kinds (data, device window, fill)
 * - **`chain`**: ordered span list with split/splice primitives
 * - **`editor`**: the facade — locking, preconditions, recording, save
 * - **`actions`**: the undo/redo tree with branch preservation
 * - **`cursor`**: sequential get/put views over editors and buffers
 * - **`events`**: change notifications for external observers
 */

pub mod actions;
pub mod chain;
pub mod cursor;
pub mod editor;
pub mod events;
pub mod span;

pub use actions::BranchInfo;
pub use cursor::{ActiveCursor, Cursor, DataCursor, EditorCursor};
pub use editor::{Editor, EditorOptions};
pub use events::{EditorEvent, ObserverId};
pub use span::{Span, SpanKind};

use crate::io::DeviceError;

/// Everything that can go wrong inside the editing core.
///
/// Preconditions are validated before any mutation, so an error means
/// the document is exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("position {position} out of bounds (length {length})")]
    OutOfBounds { position: u64, length: u64 },
    #[error("document is read-only")]
    ReadOnly,
    #[error("document has a fixed size")]
    FreezeSize,
    #[error("cursor is not active")]
    CursorInactive,
    #[error(transparent)]
    Device(#[from] DeviceError),
}
