//! Structural clean-up passes run around style inlining.

use std::borrow::Cow;

use dl_core::{SVG_NAMESPACE, SanitizeConfig, XLINK_NAMESPACE};

use crate::SanitizeError;
use crate::attributes::Attributes;
use crate::inject::node_id_from_group_id;
use crate::scan::{self, Scanner, Tag, TagKind};

/// Elements strict hosts cannot import, dropped with their content.
pub const FOREIGN_ELEMENTS: &[&str] = &["foreignObject", "script", "title"];

/// Effect elements whose references are stripped along with them.
pub const EFFECT_ELEMENTS: &[&str] = &["filter", "clipPath"];

/// Attributes (and inline style properties) that point at effect elements.
pub const EFFECT_REFERENCES: &[&str] = &["filter", "clip-path"];

const FONT_FAMILY_BROKEN: &str = "font-family=\"\"";

/// Repair `font-family` values whose quoted family names closed the
/// attribute early, e.g. `font-family=""trebuchet ms",verdana"`.
///
/// Inner double quotes become single quotes. A genuinely empty
/// `font-family=""` is left alone.
#[must_use]
pub fn repair_font_family_quotes(src: &str) -> Cow<'_, str> {
    if !src.contains(FONT_FAMILY_BROKEN) {
        return Cow::Borrowed(src);
    }
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(at) = rest.find(FONT_FAMILY_BROKEN) {
        let value_start = at + FONT_FAMILY_BROKEN.len() - 1;
        out.push_str(&rest[..value_start]);
        let value = &rest[value_start..];
        match broken_value_len(value) {
            Some(len) => {
                out.push_str(&value[..len].replace('"', "'"));
                rest = &value[len..];
            }
            None => rest = value,
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Length of a value that starts with a quoted family name, up to the `"`
/// that really closes the attribute.
fn broken_value_len(value: &str) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut in_name = false;
    for (at, &byte) in bytes.iter().enumerate() {
        match byte {
            b'"' => {
                let closes_attribute = matches!(
                    bytes.get(at + 1),
                    None | Some(b' ' | b'\t' | b'\n' | b'\r' | b'/' | b'>')
                );
                if closes_attribute && !in_name {
                    return Some(at);
                }
                in_name = !in_name;
            }
            b'<' | b'>' if !in_name => return None,
            _ => {}
        }
    }
    None
}

/// Drop `foreignObject`, `script` and `title` elements.
#[must_use]
pub fn remove_foreign_content(doc: &str) -> String {
    scan::remove_elements(doc, FOREIGN_ELEMENTS)
}

/// Re-emit every start tag in canonical form: double-quoted values,
/// line breaks inside values collapsed, duplicate attributes dropped.
#[must_use]
pub fn normalize_tags(doc: &str) -> String {
    scan::rewrite_start_tags(doc, |_, _| true)
}

/// Remove `filter` and `clipPath` definitions, every reference to them and
/// any `<defs>` left empty.
#[must_use]
pub fn strip_effects(doc: &str) -> String {
    let without_defs = scan::remove_elements(doc, EFFECT_ELEMENTS);
    let unreferenced = scan::rewrite_start_tags(&without_defs, |_, attrs| strip_references(attrs, EFFECT_REFERENCES));
    remove_empty_defs(&unreferenced)
}

/// Remove each attribute and inline style property named in `names`.
pub(crate) fn strip_references(attrs: &mut Attributes, names: &[&str]) -> bool {
    let mut changed = false;
    for name in names {
        changed |= attrs.remove(name);
    }
    if attrs.has("style") {
        let mut style = attrs.style();
        let mut style_changed = false;
        for name in names {
            style_changed |= style.remove(name);
        }
        if style_changed {
            attrs.set_style(&style);
            changed = true;
        }
    }
    changed
}

/// Drop `<defs/>` and `<defs>` elements holding nothing but whitespace.
#[must_use]
pub fn remove_empty_defs(doc: &str) -> String {
    let tags: Vec<Tag<'_>> = Scanner::new(doc).collect();
    let mut out = String::with_capacity(doc.len());
    let mut copied = 0;
    let mut index = 0;
    while index < tags.len() {
        let tag = tags[index];
        if tag.is_start("defs") {
            let empty_end = if tag.self_closing {
                Some((tag.end, index))
            } else {
                tags.get(index + 1)
                    .filter(|next| next.is_end("defs") && doc[tag.end..next.start].trim().is_empty())
                    .map(|next| (next.end, index + 1))
            };
            if let Some((end, last)) = empty_end {
                out.push_str(&doc[copied..tag.start]);
                copied = end;
                index = last + 1;
                continue;
            }
        }
        index += 1;
    }
    out.push_str(&doc[copied..]);
    out
}

/// Paint fix-ups that need no class information: `currentColor`, default
/// text fill and the removal of per-node group strokes.
#[must_use]
pub fn apply_paint_defaults(doc: &str, config: &SanitizeConfig) -> String {
    scan::rewrite_start_tags(doc, |tag, attrs| {
        let mut changed = replace_current_color(attrs, &config.current_color_fallback);
        if tag.name == "text" && !attrs.declares("fill") {
            attrs.set("fill", &config.text_fill);
            changed = true;
        }
        if tag.name == "g"
            && attrs
                .get("id")
                .is_some_and(|id| node_id_from_group_id(id, &config.node_group_marker).is_some())
        {
            changed |= attrs.remove("stroke");
            changed |= attrs.remove("stroke-width");
        }
        changed
    })
}

/// Replace the `currentColor` keyword, in any case, in every value.
pub(crate) fn replace_current_color(attrs: &mut Attributes, fallback: &str) -> bool {
    let mut changed = false;
    for attr in attrs.iter_mut() {
        if let Some(replaced) = replace_ignore_ascii_case(&attr.value, "currentcolor", fallback) {
            attr.value = replaced;
            changed = true;
        }
    }
    changed
}

fn replace_ignore_ascii_case(haystack: &str, needle: &str, with: &str) -> Option<String> {
    let lower = haystack.to_ascii_lowercase();
    if !lower.contains(needle) {
        return None;
    }
    let mut out = String::with_capacity(haystack.len());
    let mut copied = 0;
    for (at, _) in lower.match_indices(needle) {
        out.push_str(&haystack[copied..at]);
        out.push_str(with);
        copied = at + needle.len();
    }
    out.push_str(&haystack[copied..]);
    Some(out)
}

/// Give the root `<svg>` the SVG namespace, plus the xlink namespace when
/// `xlink:` attributes are used anywhere.
///
/// # Errors
///
/// [`SanitizeError::MissingRoot`] when the document has no `<svg>` element.
pub fn ensure_namespace(doc: &str) -> Result<String, SanitizeError> {
    let root = Scanner::new(doc)
        .find(|tag| tag.kind == TagKind::Start)
        .filter(|tag| tag.name == "svg")
        .ok_or(SanitizeError::MissingRoot)?;

    let mut attrs = Attributes::parse(root.attrs);
    let uses_xlink = doc.contains("xlink:");
    if attrs.get("xmlns") == Some(SVG_NAMESPACE) && (!uses_xlink || attrs.has("xmlns:xlink")) {
        return Ok(doc.to_string());
    }

    if attrs.get("xmlns") != Some(SVG_NAMESPACE) {
        attrs.remove("xmlns");
        attrs.prepend("xmlns", SVG_NAMESPACE);
    }
    if uses_xlink && !attrs.has("xmlns:xlink") {
        attrs.set("xmlns:xlink", XLINK_NAMESPACE);
    }

    let mut out = String::with_capacity(doc.len() + 64);
    out.push_str(&doc[..root.start]);
    scan::write_start_tag(&mut out, root.name, &attrs, root.self_closing);
    out.push_str(&doc[root.end..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_broken_font_family() {
        let src = r#"<text font-family=""trebuchet ms",verdana,arial,sans-serif" font-size="16px">x</text>"#;
        assert_eq!(
            repair_font_family_quotes(src),
            r#"<text font-family="'trebuchet ms',verdana,arial,sans-serif" font-size="16px">x</text>"#
        );
    }

    #[test]
    fn repairs_value_ending_in_quoted_name() {
        let src = r#"<g font-family=""Open Sans""/>"#;
        assert_eq!(repair_font_family_quotes(src), r#"<g font-family="'Open Sans'"/>"#);
    }

    #[test]
    fn keeps_empty_font_family() {
        let src = r#"<g font-family="" x="1"/>"#;
        assert_eq!(repair_font_family_quotes(src), src);
    }

    #[test]
    fn removes_foreign_content_case_insensitively() {
        let src = "<svg><title>T</title><foreignobject><div>x</div></foreignobject><script>a<b</script><g/></svg>";
        assert_eq!(remove_foreign_content(src), "<svg><g/></svg>");
    }

    #[test]
    fn normalizes_multiline_tags() {
        let src = "<svg>\n<path\n   d=\"M0 0\n   L1 1\"\n   class='edge'\n/></svg>";
        assert_eq!(
            normalize_tags(src),
            "<svg>\n<path d=\"M0 0 L1 1\" class=\"edge\"/></svg>"
        );
    }

    #[test]
    fn strips_filters_clip_paths_and_references() {
        let src = concat!(
            r#"<svg><defs><filter id="shadow"><feGaussianBlur/></filter></defs>"#,
            r#"<clipPath id="c"><rect/></clipPath>"#,
            r#"<g filter="url(#shadow)" clip-path="url(#c)" style="filter:url(#shadow);fill:red"/></svg>"#,
        );
        assert_eq!(strip_effects(src), r#"<svg><g style="fill:red"/></svg>"#);
    }

    #[test]
    fn keeps_defs_with_content() {
        let src = r#"<svg><defs><marker id="arrow"/></defs><defs> </defs><defs/></svg>"#;
        assert_eq!(remove_empty_defs(src), r#"<svg><defs><marker id="arrow"/></defs></svg>"#);
    }

    #[test]
    fn replaces_current_color_in_any_case() {
        let config = SanitizeConfig::default();
        let src = r#"<svg><path stroke="currentColor" style="fill:CURRENTCOLOR"/></svg>"#;
        assert_eq!(
            apply_paint_defaults(src, &config),
            r##"<svg><path stroke="#333333" style="fill:#333333"/></svg>"##
        );
    }

    #[test]
    fn only_text_elements_get_default_fill() {
        let config = SanitizeConfig::default();
        let src = r#"<svg><text>a</text><text style="fill:red">b</text><text><tspan>c</tspan></text></svg>"#;
        assert_eq!(
            apply_paint_defaults(src, &config),
            r##"<svg><text fill="#333333">a</text><text style="fill:red">b</text><text fill="#333333"><tspan>c</tspan></text></svg>"##
        );
    }

    #[test]
    fn strips_node_group_strokes() {
        let config = SanitizeConfig::default();
        let src = concat!(
            r#"<svg><g id="flowchart-A-0" class="node" stroke="red" stroke-width="2" fill="blue">"#,
            r#"<rect stroke="red"/></g><g id="cluster" stroke="red"/></svg>"#,
        );
        assert_eq!(
            apply_paint_defaults(src, &config),
            concat!(
                r#"<svg><g id="flowchart-A-0" class="node" fill="blue">"#,
                r#"<rect stroke="red"/></g><g id="cluster" stroke="red"/></svg>"#,
            )
        );
    }

    #[test]
    fn adds_missing_namespaces() {
        let src = r##"<svg width="10"><use xlink:href="#a"/></svg>"##;
        assert_eq!(
            ensure_namespace(src),
            Ok(format!(
                r##"<svg xmlns="{SVG_NAMESPACE}" width="10" xmlns:xlink="{XLINK_NAMESPACE}"><use xlink:href="#a"/></svg>"##
            ))
        );
    }

    #[test]
    fn namespaced_document_is_unchanged() {
        let src = format!(r#"<?xml version="1.0"?><svg xmlns="{SVG_NAMESPACE}"><g/></svg>"#);
        assert_eq!(ensure_namespace(&src), Ok(src.clone()));
    }

    #[test]
    fn wrong_namespace_is_replaced() {
        let src = r#"<svg xmlns="http://example.com/other"><g/></svg>"#;
        assert_eq!(
            ensure_namespace(src),
            Ok(format!(r#"<svg xmlns="{SVG_NAMESPACE}"><g/></svg>"#))
        );
    }

    #[test]
    fn namespace_requires_svg_root() {
        assert_eq!(ensure_namespace("<html/>"), Err(SanitizeError::MissingRoot));
    }
}
