//! Importing sanitized SVG into a host, with one fallback attempt.

use std::fmt;

use dl_core::{Fidelity, SVG_NAMESPACE, SanitizeConfig};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{SanitizeError, sanitize_minimal_with_config, sanitize_svg_with_config};

/// A consumer that turns SVG text into its own node type.
pub trait HostImport {
    type Node;
    type Error: fmt::Display;

    fn import(&mut self, svg: &str) -> Result<Self::Node, Self::Error>;
}

/// Result of [`sanitize_for_host`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostImported<N> {
    pub node: N,
    pub fidelity: Fidelity,
    /// The exact SVG the host accepted.
    pub svg: String,
}

/// Sanitize `raw` and import it, retrying once with the minimal sanitizer.
///
/// # Errors
///
/// The minimal sanitizer's error, or [`SanitizeError::HostRejected`] when the
/// host refuses the minimal document too.
pub fn sanitize_for_host<H: HostImport>(
    raw: &str,
    source: Option<&str>,
    config: &SanitizeConfig,
    host: &mut H,
) -> Result<HostImported<H::Node>, SanitizeError> {
    let failure = match sanitize_svg_with_config(raw, source, config) {
        Ok(svg) => match host.import(&svg) {
            Ok(node) => {
                debug!("Host accepted full-fidelity SVG ({} bytes)", svg.len());
                return Ok(HostImported {
                    node,
                    fidelity: Fidelity::Full,
                    svg,
                });
            }
            Err(err) => format!("host rejected sanitized SVG: {err}"),
        },
        Err(err) => err.to_string(),
    };
    warn!("Full sanitization failed ({failure}); retrying with minimal sanitizer");

    let svg = sanitize_minimal_with_config(raw, config)?;
    match host.import(&svg) {
        Ok(node) => Ok(HostImported {
            node,
            fidelity: Fidelity::Minimal,
            svg,
        }),
        Err(err) => Err(SanitizeError::HostRejected {
            fidelity: Fidelity::Minimal,
            message: err.to_string(),
        }),
    }
}

/// Why [`StrictXmlHost`] refused a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrictXmlError {
    #[error("not well-formed XML: {0}")]
    Parse(String),
    #[error("root element is <{0}>, expected <svg>")]
    NotSvg(String),
    #[error("root element is not in the SVG namespace")]
    MissingNamespace,
}

/// Summary of a document [`StrictXmlHost`] accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSummary {
    pub elements: usize,
    pub text_elements: usize,
}

/// A host as strict as a native SVG importer: well-formed XML, an `<svg>`
/// root in the SVG namespace, no DTD.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictXmlHost;

impl HostImport for StrictXmlHost {
    type Node = XmlSummary;
    type Error = StrictXmlError;

    fn import(&mut self, svg: &str) -> Result<XmlSummary, StrictXmlError> {
        let doc = roxmltree::Document::parse(svg).map_err(|err| StrictXmlError::Parse(err.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "svg" {
            return Err(StrictXmlError::NotSvg(root.tag_name().name().to_string()));
        }
        if root.tag_name().namespace() != Some(SVG_NAMESPACE) {
            return Err(StrictXmlError::MissingNamespace);
        }
        let elements = root.descendants().filter(roxmltree::Node::is_element);
        let (elements, text_elements) = elements.fold((0, 0), |(all, text), node| {
            (all + 1, text + usize::from(node.has_tag_name((SVG_NAMESPACE, "text"))))
        });
        Ok(XmlSummary {
            elements,
            text_elements,
        })
    }
}
