//! Template transclusion
//!
//! A template is a source file containing a marker token. Before compiling,
//! the marker is replaced with the user's solution so that shared boilerplate
//! (includes, fast I/O, a `main` wrapper) lives outside the solution itself.

use tracing::debug;

/// Token in a template that is replaced by the solution source
pub const TRANSCLUDE_MARKER: &str = "{{solution}}";

/// Merge a solution into a template
///
/// Returns `solution` unchanged when transclusion is disabled or when the
/// template does not contain [`TRANSCLUDE_MARKER`]. Otherwise every marker
/// occurrence is replaced by `solution`.
pub fn apply(template: &str, solution: &str, enabled: bool) -> String {
    if !enabled {
        return solution.to_owned();
    }

    if !template.contains(TRANSCLUDE_MARKER) {
        debug!("template has no transclusion marker, using solution as-is");
        return solution.to_owned();
    }

    template.replace(TRANSCLUDE_MARKER, solution)
}
