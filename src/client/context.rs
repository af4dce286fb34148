use crate::models::ElementId;

/// Pseudo-element the toolkit reports for clicks on empty canvas.
pub const CANVAS_ELEMENT: &str = "canvas";

/// The elements a proposed edit would touch, before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationContext {
    /// Move, resize, label edit on one element.
    Element(ElementId),
    /// Multi-selection move, delete, align.
    Elements(Vec<ElementId>),
    /// Create or reconnect an edge between two endpoints.
    Connection {
        connection: Option<ElementId>,
        source: Option<ElementId>,
        target: Option<ElementId>,
    },
    /// Attach a shape to a host (boundary event on a task) inside a parent.
    Attachment {
        shape: ElementId,
        host: Option<ElementId>,
        parent: Option<ElementId>,
    },
}

impl MutationContext {
    /// Every element the context references, in declaration order, duplicates included.
    pub fn referenced(&self) -> Vec<&str> {
        match self {
            MutationContext::Element(id) => vec![id.as_str()],
            MutationContext::Elements(ids) => ids.iter().map(String::as_str).collect(),
            MutationContext::Connection {
                connection,
                source,
                target,
            } => [connection, source, target]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect(),
            MutationContext::Attachment {
                shape,
                host,
                parent,
            } => std::iter::once(shape.as_str())
                .chain([host, parent].into_iter().flatten().map(String::as_str))
                .collect(),
        }
    }
}

/// Elements that are never lockable: the empty canvas and the root container.
#[derive(Debug, Clone, Default)]
pub struct Exemptions {
    root: Option<ElementId>,
}

impl Exemptions {
    pub fn new(root: Option<ElementId>) -> Self {
        Self { root }
    }

    pub fn is_exempt(&self, element: &str) -> bool {
        element == CANVAS_ELEMENT || self.root.as_deref() == Some(element)
    }
}

/// Deduplicated, exemption-filtered list of elements a context affects.
/// Order follows first appearance.
pub fn extract_affected(context: &MutationContext, exemptions: &Exemptions) -> Vec<ElementId> {
    let mut affected: Vec<ElementId> = Vec::new();
    for id in context.referenced() {
        if id.is_empty() || exemptions.is_exempt(id) {
            continue;
        }
        if !affected.iter().any(|seen| seen == id) {
            affected.push(id.to_string());
        }
    }
    affected
}
