//! pianoboard - a virtual piano recorded onto a shared canvas.
//!
//! This library turns live note-on/note-off events into persisted "note
//! block" elements on a canvas surface, and later replays a board by decoding
//! those blocks back into a timeline and firing note-trigger callbacks on a
//! fixed schedule. The canvas geometry is the storage format: a block's
//! horizontal position and width encode start offset and duration, its row
//! encodes the pitch.

pub mod board;
pub mod clock;
pub mod note;
pub mod surface;

// Re-export commonly used types
pub use board::timeline::{Timeline, TimelineNote};
pub use board::{BoardError, Keyboard, PitchLayout, DISPATCH_TICK_MS, HEAD_TICK_MS, PX_PER_MS};
pub use note::NoteName;
pub use surface::{ElementId, MemorySurface, Surface};
