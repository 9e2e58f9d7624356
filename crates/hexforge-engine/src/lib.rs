pub mod editing;
pub mod io;

// Re-export key types for easier usage
pub use editing::{EditError, Editor, EditorCursor, EditorEvent, EditorOptions, Span};
pub use io::{BufferDevice, Device, DeviceError, DeviceRegistry, FileDevice};
