//! Pushes class rules down onto the elements that carry the classes.

use tracing::debug;

use crate::css::StyleRuleSet;
use crate::scan;

/// Properties hosts honour as presentation attributes. Everything else
/// goes into the inline `style`.
pub const PRESENTATION_ATTRIBUTES: &[&str] = &[
    "fill",
    "fill-opacity",
    "fill-rule",
    "stroke",
    "stroke-width",
    "stroke-opacity",
    "stroke-dasharray",
    "stroke-dashoffset",
    "stroke-linecap",
    "stroke-linejoin",
    "stroke-miterlimit",
    "opacity",
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "text-anchor",
    "dominant-baseline",
    "alignment-baseline",
    "baseline-shift",
    "text-decoration",
    "letter-spacing",
    "word-spacing",
    "visibility",
    "display",
    "color",
    "stop-color",
    "stop-opacity",
    "marker-start",
    "marker-mid",
    "marker-end",
];

#[must_use]
pub fn is_presentation_attribute(property: &str) -> bool {
    PRESENTATION_ATTRIBUTES.contains(&property)
}

/// Counts reported by [`inline_styles`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStats {
    pub elements: usize,
    pub attributes: usize,
    pub style_declarations: usize,
}

/// Apply `rules` to every element with a `class` attribute.
///
/// Values already present as an attribute or in the inline style win over
/// class rules. The `class` attribute itself is kept.
#[must_use]
pub fn inline_styles(doc: &str, rules: &StyleRuleSet) -> (String, InlineStats) {
    let mut stats = InlineStats::default();
    if rules.is_empty() {
        return (doc.to_string(), stats);
    }

    let out = scan::rewrite_start_tags(doc, |_, attrs| {
        let resolved = rules.resolve(attrs.classes());
        if resolved.is_empty() {
            return false;
        }

        let mut style = attrs.style();
        let mut style_changed = false;
        let mut changed = false;
        for (property, value) in resolved.iter() {
            if attrs.has(property) || style.contains(property) {
                continue;
            }
            if is_presentation_attribute(property) {
                attrs.set(property, value);
                stats.attributes += 1;
            } else {
                style.set(property, value);
                style_changed = true;
                stats.style_declarations += 1;
            }
            changed = true;
        }
        if style_changed {
            attrs.set_style(&style);
        }
        if changed {
            stats.elements += 1;
        }
        changed
    });

    debug!(
        "Inlined {} attributes and {} style declarations into {} elements",
        stats.attributes, stats.style_declarations, stats.elements
    );
    (out, stats)
}
