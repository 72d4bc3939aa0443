//! Last-resort sanitizer for documents the full pipeline could not make
//! importable. Styling is thrown away in favour of fixed neutral paints.

use dl_core::SanitizeConfig;
use tracing::debug;

use crate::SanitizeError;
use crate::attributes::Attributes;
use crate::clean::{self, EFFECT_REFERENCES};
use crate::scan::{self, Scanner, TagKind};

/// Elements dropped with their content.
const REMOVED_ELEMENTS: &[&str] = &["style", "defs", "foreignObject", "script", "title"];

/// References that dangle once `<defs>` is gone.
const DANGLING_REFERENCES: &[&str] = &["marker-start", "marker-mid", "marker-end"];

const BASIC_SHAPES: &[&str] = &["rect", "circle", "ellipse", "polygon"];

/// Strip `svg` down to geometry and text with neutral paints.
///
/// # Errors
///
/// [`SanitizeError::MissingRoot`] when there is no `<svg>` element.
pub fn sanitize_minimal(svg: &str) -> Result<String, SanitizeError> {
    sanitize_minimal_with_config(svg, &SanitizeConfig::default())
}

/// [`sanitize_minimal`] with explicit paints.
///
/// # Errors
///
/// [`SanitizeError::MissingRoot`] when there is no `<svg>` element.
pub fn sanitize_minimal_with_config(svg: &str, config: &SanitizeConfig) -> Result<String, SanitizeError> {
    let repaired = clean::repair_font_family_quotes(svg);
    let stripped = scan::remove_elements(&repaired, REMOVED_ELEMENTS);
    let stripped = remove_doctype(&stripped);

    let painted = scan::rewrite_start_tags(&stripped, |tag, attrs| {
        clean::strip_references(attrs, EFFECT_REFERENCES);
        clean::strip_references(attrs, DANGLING_REFERENCES);
        clean::replace_current_color(attrs, &config.current_color_fallback);
        replace_url_paint(attrs, config);
        apply_neutral_paint(tag.name, attrs, config);
        true
    });

    let rooted = clean::ensure_namespace(&painted)?;
    debug!("Minimal sanitizer reduced {} bytes to {}", svg.len(), rooted.len());
    Ok(rooted)
}

/// `url(#...)` paints point into the removed `<defs>`.
fn replace_url_paint(attrs: &mut Attributes, config: &SanitizeConfig) {
    let mut style = attrs.style();
    let mut style_changed = false;
    for (property, fallback) in [("fill", &config.minimal_path_fill), ("stroke", &config.minimal_stroke)] {
        if attrs.get(property).is_some_and(is_url_reference) {
            attrs.set(property, fallback);
        }
        if style.get(property).is_some_and(is_url_reference) {
            style.set(property, fallback);
            style_changed = true;
        }
    }
    if style_changed {
        attrs.set_style(&style);
    }
}

fn is_url_reference(value: &str) -> bool {
    value.trim_start().starts_with("url(")
}

fn apply_neutral_paint(name: &str, attrs: &mut Attributes, config: &SanitizeConfig) {
    let (fill, stroke) = match name {
        "path" => (&config.minimal_path_fill, Some(&config.minimal_stroke)),
        "text" => (&config.text_fill, None),
        shape if BASIC_SHAPES.contains(&shape) => (&config.minimal_shape_fill, Some(&config.minimal_stroke)),
        _ => return,
    };
    if !attrs.declares("fill") {
        attrs.set("fill", fill);
    }
    if let Some(stroke) = stroke
        && !attrs.declares("stroke")
    {
        attrs.set("stroke", stroke);
    }
}

fn remove_doctype(doc: &str) -> String {
    let mut out = String::with_capacity(doc.len());
    let mut copied = 0;
    for tag in Scanner::new(doc) {
        if tag.kind == TagKind::Declaration && doc[tag.start..].starts_with("<!") {
            out.push_str(&doc[copied..tag.start]);
            copied = tag.end;
        }
    }
    out.push_str(&doc[copied..]);
    out
}
