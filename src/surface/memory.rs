//! In-memory canvas surface.
//!
//! Backs the demo binary and the test suite. Elements live in a flat list in
//! creation order; containment is tracked separately so children enumerate in
//! attach order, the same order a real canvas host reports them.
//!
//! A whole board can be saved to and loaded from a JSON file, so a recorded
//! performance survives across runs of the demo.

use super::{Element, ElementId, ElementPatch, ElementSpec, Shape, Surface, SurfaceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One containment edge: `child` is attached to `parent`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Attachment {
    parent: ElementId,
    child: ElementId,
}

/// An in-memory [`Surface`] implementation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemorySurface {
    elements: Vec<Element>,
    attachments: Vec<Attachment>,
    /// Last element passed to [`Surface::focus`], for inspection in tests.
    #[serde(skip)]
    focused: Option<ElementId>,
}

impl MemorySurface {
    /// Creates an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of elements currently on the surface.
    #[allow(dead_code)]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Returns the element last brought into view, if any.
    #[allow(dead_code)]
    pub fn focused(&self) -> Option<ElementId> {
        self.focused
    }

    /// Returns all frame containers on the surface, in creation order.
    /// This is how a host rediscovers keyboards on a loaded board.
    pub fn frames(&self) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|e| e.shape == Shape::Frame)
            .map(|e| e.id)
            .collect()
    }

    /// Saves the whole board as JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SurfaceError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Loads a board previously written by [`MemorySurface::save_to_file`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SurfaceError> {
        let json = fs::read_to_string(path)?;
        let surface: Self = serde_json::from_str(&json)?;
        tracing::debug!(elements = surface.elements.len(), "loaded board");
        Ok(surface)
    }

    fn index_of(&self, id: ElementId) -> Result<usize, SurfaceError> {
        self.elements
            .iter()
            .position(|e| e.id == id)
            .ok_or(SurfaceError::UnknownElement(id))
    }
}

impl Surface for MemorySurface {
    fn create_element(&mut self, spec: ElementSpec) -> Result<ElementId, SurfaceError> {
        let id = ElementId::new();
        self.elements.push(Element {
            id,
            shape: spec.shape,
            x: spec.x,
            y: spec.y,
            width: spec.width,
            height: spec.height,
            content: spec.content,
            fill: spec.fill,
        });
        Ok(id)
    }

    fn update_element(&mut self, id: ElementId, patch: ElementPatch) -> Result<(), SurfaceError> {
        let idx = self.index_of(id)?;
        let element = &mut self.elements[idx];
        if let Some(x) = patch.x {
            element.x = x;
        }
        if let Some(y) = patch.y {
            element.y = y;
        }
        if let Some(width) = patch.width {
            element.width = width;
        }
        if let Some(height) = patch.height {
            element.height = height;
        }
        Ok(())
    }

    fn remove_element(&mut self, id: ElementId) -> Result<(), SurfaceError> {
        // Repeated removes are a no-op by contract.
        self.elements.retain(|e| e.id != id);
        self.attachments.retain(|a| a.child != id && a.parent != id);
        Ok(())
    }

    fn element(&self, id: ElementId) -> Result<Element, SurfaceError> {
        let idx = self.index_of(id)?;
        Ok(self.elements[idx].clone())
    }

    fn list_children(&self, container: ElementId) -> Result<Vec<Element>, SurfaceError> {
        let idx = self.index_of(container)?;
        if self.elements[idx].shape != Shape::Frame {
            return Err(SurfaceError::NotAContainer(container));
        }
        self.attachments
            .iter()
            .filter(|a| a.parent == container)
            .map(|a| self.element(a.child))
            .collect()
    }

    fn attach(&mut self, container: ElementId, child: ElementId) -> Result<(), SurfaceError> {
        let container_idx = self.index_of(container)?;
        if self.elements[container_idx].shape != Shape::Frame {
            return Err(SurfaceError::NotAContainer(container));
        }
        self.index_of(child)?;
        if let Some(existing) = self
            .attachments
            .iter()
            .find(|a| a.child == child)
            .map(|a| a.parent)
        {
            if existing != container {
                return Err(SurfaceError::AlreadyAttached {
                    child,
                    parent: existing,
                });
            }
            return Ok(());
        }
        self.attachments.push(Attachment {
            parent: container,
            child,
        });
        Ok(())
    }

    fn focus(&mut self, id: ElementId) -> Result<(), SurfaceError> {
        self.index_of(id)?;
        self.focused = Some(id);
        Ok(())
    }
}
