use crate::models::{ElementId, LockSnapshot};

use super::context::MutationContext;

/// Seam to the diagram editing toolkit.
///
/// Rendering, editing and element introspection live on the other side of
/// this trait; the collaboration engine only intercepts and reconciles.
pub trait DiagramToolkit {
    /// The toolkit's own verdict on a proposed mutation, before any lock check.
    fn native_validate(&self, _context: &MutationContext) -> bool {
        true
    }

    /// Id of the diagram's root process container, if a diagram is loaded.
    fn root_element_id(&self) -> Option<ElementId>;

    /// Replace the rendered diagram. Drops any overlays drawn before.
    fn import_document(&mut self, xml: &str);

    /// Draw lock indicators for every locked element.
    fn render_locks(&mut self, locks: &LockSnapshot, self_id: Option<&str>);
}
