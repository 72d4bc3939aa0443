#![forbid(unsafe_code)]

//! Reads node labels out of Mermaid flowchart source.
//!
//! The renderer does not always emit label text into its SVG, so the
//! sanitizer recovers labels from the source it was rendered from.

mod labels;

pub use labels::{NodeDeclaration, NodeShape, extract_labels, scan_node_declarations};

/// Marker that starts a comment line (also used by `%%{init}%%` directives).
pub const COMMENT_MARKER: &str = "%%";

/// First line that is neither blank nor a comment, trimmed.
#[must_use]
pub fn first_significant_line(source: &str) -> Option<&str> {
    source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
}
