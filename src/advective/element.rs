use crate::config::MAX_FACES;
use crate::error::ElementId;
use crate::shape::ShapeFunction;

/// A mesh element carrying coefficients for one particle.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveElement {
    pub(crate) element_id: ElementId,
    /// Same-particle neighbor across each face, if active.
    pub(crate) connections: [Option<ElementId>; MAX_FACES],
    pub(crate) start_index: usize,
    pub(crate) min_life: u32,
}

impl ActiveElement {
    pub(crate) fn new(element_id: ElementId, start_index: usize, min_life: u32) -> Self {
        Self {
            element_id,
            connections: [None; MAX_FACES],
            start_index,
            min_life,
        }
    }

    pub fn element_id(&self) -> ElementId {
        self.element_id
    }

    pub fn connections(&self) -> &[Option<ElementId>; MAX_FACES] {
        &self.connections
    }

    pub fn connection(&self, face: usize) -> Option<ElementId> {
        self.connections.get(face).copied().flatten()
    }

    /// Offset of the element's coefficients in the shared coefficient vector.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Remaining upkeep cycles during which the element cannot be retired.
    pub fn min_life(&self) -> u32 {
        self.min_life
    }

    pub fn is_connected_to(&self, element: ElementId) -> bool {
        self.connections.contains(&Some(element))
    }

    pub(crate) fn disconnect(&mut self, element: ElementId) {
        for connection in &mut self.connections {
            if *connection == Some(element) {
                *connection = None;
            }
        }
    }
}

/// The local density representation of a single particle.
///
/// No two active elements of a particle share a mesh element.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvectedParticle {
    pub(crate) shape_function: ShapeFunction,
    pub(crate) elements: Vec<ActiveElement>,
}

impl AdvectedParticle {
    pub(crate) fn new(shape_function: ShapeFunction) -> Self {
        Self {
            shape_function,
            elements: Vec::new(),
        }
    }

    pub fn shape_function(&self) -> &ShapeFunction {
        &self.shape_function
    }

    pub fn elements(&self) -> &[ActiveElement] {
        &self.elements
    }

    pub fn find_element(&self, element: ElementId) -> Option<&ActiveElement> {
        self.elements.iter().find(|el| el.element_id == element)
    }

    pub(crate) fn find_element_mut(&mut self, element: ElementId) -> Option<&mut ActiveElement> {
        self.elements.iter_mut().find(|el| el.element_id == element)
    }
}
