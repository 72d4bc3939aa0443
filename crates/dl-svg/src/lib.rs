#![forbid(unsafe_code)]

//! SVG sanitizer for strict importers.
//!
//! Rewrites renderer output so hosts without CSS or HTML support can import
//! it: class rules become presentation attributes, effects and embedded HTML
//! go away, paints get explicit defaults and empty node labels are filled in
//! from the diagram source. [`sanitize_minimal`] is the fallback when even
//! that result is refused.

pub mod attributes;
pub mod clean;
pub mod css;
mod host;
pub mod inject;
pub mod inline;
mod minimal;
pub mod scan;

use dl_core::{FailureKind, Fidelity, SanitizeConfig};
use dl_parser::extract_labels;
use thiserror::Error;
use tracing::debug;

pub use css::{Declarations, StyleRuleSet};
pub use host::{HostImport, HostImported, StrictXmlError, StrictXmlHost, XmlSummary, sanitize_for_host};
pub use inject::{LabelSource, LabelsOrRawIds, RawNodeIds, inject_labels};
pub use minimal::{sanitize_minimal, sanitize_minimal_with_config};

/// Why a document could not be sanitized or imported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("document has no <svg> root element")]
    MissingRoot,
    #[error("malformed markup at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },
    #[error("host rejected {} SVG: {message}", .fidelity.as_str())]
    HostRejected { fidelity: Fidelity, message: String },
}

impl SanitizeError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        FailureKind::Sanitization
    }
}

/// Sanitize renderer output with the default configuration.
///
/// With `source`, injected labels come from the diagram source and fall back
/// to node ids; without it, node ids are used directly.
///
/// # Errors
///
/// [`SanitizeError::MissingRoot`] or [`SanitizeError::Malformed`] when the
/// input is not a single balanced `<svg>` element.
pub fn sanitize_svg(raw: &str, source: Option<&str>) -> Result<String, SanitizeError> {
    sanitize_svg_with_config(raw, source, &SanitizeConfig::default())
}

/// Full-fidelity sanitization.
///
/// # Errors
///
/// See [`sanitize_svg`].
pub fn sanitize_svg_with_config(
    raw: &str,
    source: Option<&str>,
    config: &SanitizeConfig,
) -> Result<String, SanitizeError> {
    let repaired = clean::repair_font_family_quotes(raw);
    let stripped = clean::remove_foreign_content(&repaired);
    scan::check_structure(&stripped)?;

    let normalized = clean::normalize_tags(&stripped);
    let (rules, unstyled) = css::collect_styles(&normalized);
    let (inlined, _) = inline::inline_styles(&unstyled, &rules);
    let cleaned = clean::strip_effects(&inlined);
    let painted = clean::apply_paint_defaults(&cleaned, config);
    let rooted = clean::ensure_namespace(&painted)?;

    let (labelled, injected) = match source {
        Some(source) => {
            let labels = extract_labels(source);
            let (out, count) = inject_labels(&rooted, &LabelsOrRawIds(&labels), config);
            (out.into_owned(), count)
        }
        None => {
            let (out, count) = inject_labels(&rooted, &RawNodeIds, config);
            (out.into_owned(), count)
        }
    };

    debug!(
        "Sanitized SVG: {} -> {} bytes, {} class rules, {injected} labels injected",
        raw.len(),
        labelled.len(),
        rules.len()
    );
    Ok(labelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_sanitization_failures() {
        assert_eq!(SanitizeError::MissingRoot.kind(), FailureKind::Sanitization);
        let err = SanitizeError::HostRejected {
            fidelity: Fidelity::Minimal,
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "host rejected minimal SVG: bad");
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(matches!(
            sanitize_svg("<svg><g></svg>", None),
            Err(SanitizeError::Malformed { .. })
        ));
        assert_eq!(sanitize_svg("<p>hi</p>", None), Err(SanitizeError::MissingRoot));
    }

    #[test]
    fn class_rules_replace_the_style_block() {
        let out = sanitize_svg("<svg><style>.node{fill:#fff;stroke:#000}</style><rect class=\"node\"/></svg>", None)
            .unwrap();
        assert_eq!(
            out,
            r##"<svg xmlns="http://www.w3.org/2000/svg"><rect class="node" fill="#fff" stroke="#000"/></svg>"##
        );
    }

    #[test]
    fn html_inside_foreign_object_does_not_break_balance() {
        let out = sanitize_svg("<svg><foreignObject><div>a<br></div></foreignObject></svg>", None).unwrap();
        assert_eq!(out, r#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#);
    }
}
