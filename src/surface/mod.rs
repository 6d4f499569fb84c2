//! The canvas surface capability.
//!
//! Everything the board persists lives as elements on a shared canvas owned by
//! the host application. The [`Surface`] trait is the seam between this crate
//! and that host: it covers exactly the operations the recorder, decoder, and
//! player need (create, patch, remove, list children, attach, focus). The
//! geometry of the elements *is* the storage format, so the element model here
//! carries only what the codec reads back: shape kind, position, size, label,
//! and fill.

mod memory;

pub use memory::MemorySurface;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Global counter for generating unique element IDs.
static ELEMENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an element on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    /// Generates a new unique element ID.
    ///
    /// Thread-safe: uses atomic increment internally.
    pub fn new() -> Self {
        Self(ELEMENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value (for serialization/debugging).
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape kind of a canvas element.
///
/// The kind doubles as a type tag when reading a board back: keyboard keys are
/// plain rectangles, recorded note blocks are round rectangles, and each
/// keyboard's container is a frame. Decoding relies on this distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// A keyboard container.
    Frame,
    /// A keyboard key (or the moving head marker).
    Rectangle,
    /// A persisted note block.
    RoundRectangle,
}

/// A canvas element as seen through the surface.
///
/// `x`/`y` are the element's center in canvas coordinates, matching the host
/// canvas convention. Geometry is the persistence format: for note blocks,
/// `x` and `width` encode time and `y` encodes pitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Unique identifier of this element.
    pub id: ElementId,

    /// Shape kind tag.
    pub shape: Shape,

    /// Center x coordinate.
    pub x: f64,

    /// Center y coordinate.
    pub y: f64,

    /// Element width.
    pub width: f64,

    /// Element height.
    pub height: f64,

    /// Text label. The host may store it decorated (e.g. `<p>C#</p>`).
    pub content: String,

    /// Fill color, as a CSS-style hex string.
    pub fill: String,
}

/// Specification for creating a new element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSpec {
    pub shape: Shape,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: String,
    pub fill: String,
}

/// A partial update to an existing element.
///
/// Only the fields the board ever mutates after creation are patchable;
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ElementPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ElementPatch {
    /// Patch that moves an element to a new center x.
    pub fn move_x(x: f64) -> Self {
        Self {
            x: Some(x),
            ..Self::default()
        }
    }

    /// Patch that resizes an element and re-centers it horizontally.
    pub fn resize_x(x: f64, width: f64) -> Self {
        Self {
            x: Some(x),
            width: Some(width),
            ..Self::default()
        }
    }
}

/// Errors reported by a canvas surface.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The referenced element does not exist on this surface.
    #[error("unknown element: {0:?}")]
    UnknownElement(ElementId),

    /// The referenced element cannot contain children.
    #[error("element {0:?} is not a container")]
    NotAContainer(ElementId),

    /// The element is already attached to a different container.
    #[error("element {child:?} is already attached to {parent:?}")]
    AlreadyAttached { child: ElementId, parent: ElementId },

    /// A persistence operation failed.
    #[error("surface I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored board data could not be parsed.
    #[error("invalid board data: {0}")]
    InvalidData(#[from] serde_json::Error),
}

/// The canvas surface capability supplied by the host.
///
/// Implementations persist elements however they like; the board only assumes
/// that what it writes through this trait can be read back via
/// [`Surface::element`] and [`Surface::list_children`].
pub trait Surface {
    /// Creates a new top-level element and returns its ID.
    fn create_element(&mut self, spec: ElementSpec) -> Result<ElementId, SurfaceError>;

    /// Applies a partial update to an element and persists it.
    fn update_element(&mut self, id: ElementId, patch: ElementPatch) -> Result<(), SurfaceError>;

    /// Removes an element (detaching it from its container if needed).
    ///
    /// Removing an element that no longer exists is not an error; repeated
    /// removes must be safe.
    fn remove_element(&mut self, id: ElementId) -> Result<(), SurfaceError>;

    /// Returns a snapshot of an element's current state.
    fn element(&self, id: ElementId) -> Result<Element, SurfaceError>;

    /// Returns snapshots of all children of a container, in attach order.
    fn list_children(&self, container: ElementId) -> Result<Vec<Element>, SurfaceError>;

    /// Attaches an element as a child of a container.
    fn attach(&mut self, container: ElementId, child: ElementId) -> Result<(), SurfaceError>;

    /// Brings an element into view. Best-effort; hosts without a viewport
    /// may ignore it.
    fn focus(&mut self, id: ElementId) -> Result<(), SurfaceError>;
}
