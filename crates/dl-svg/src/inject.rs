//! Writes node labels back into label containers the renderer left empty.
//!
//! A node group is a `<g>` whose id contains the node-group marker followed
//! by the node id and a `-<n>` counter (`flowchart-Start-3`). Inside it, the
//! first `<g class="label">` holding no `<text>` receives one centred text
//! element.

use std::borrow::Cow;

use dl_core::{LabelMap, SanitizeConfig};
use tracing::debug;

use crate::attributes::{Attributes, escape_xml_text, format_number};
use crate::scan::{self, Scanner, TagKind};

/// Where injected label text comes from.
pub trait LabelSource {
    fn resolve<'a>(&'a self, node_id: &'a str) -> Option<&'a str>;
}

impl LabelSource for LabelMap {
    fn resolve<'a>(&'a self, node_id: &'a str) -> Option<&'a str> {
        self.get(node_id)
    }
}

/// Uses the node id itself as the label.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawNodeIds;

impl LabelSource for RawNodeIds {
    fn resolve<'a>(&'a self, node_id: &'a str) -> Option<&'a str> {
        Some(node_id)
    }
}

/// Looks a node up in the map, falling back to its raw id.
#[derive(Debug, Clone, Copy)]
pub struct LabelsOrRawIds<'m>(pub &'m LabelMap);

impl LabelSource for LabelsOrRawIds<'_> {
    fn resolve<'a>(&'a self, node_id: &'a str) -> Option<&'a str> {
        self.0.get(node_id).or(Some(node_id))
    }
}

/// Node id encoded in a node group's id, if it is one.
///
/// The marker must start the id or follow a `-`; the node id is what lies
/// between the marker and the trailing `-<digits>` counter.
#[must_use]
pub fn node_id_from_group_id<'a>(group_id: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }
    group_id.match_indices(marker).find_map(|(at, _)| {
        if at > 0 && !group_id[..at].ends_with('-') {
            return None;
        }
        let (node, counter) = group_id[at + marker.len()..].rsplit_once('-')?;
        let numbered = !counter.is_empty() && counter.bytes().all(|b| b.is_ascii_digit());
        (numbered && !node.is_empty()).then_some(node)
    })
}

enum Role {
    Plain,
    Node { id: String, slot: usize },
    Label { slot: usize, has_text: bool, at: (f32, f32) },
}

/// Inject labels from `source` into every node group that needs one.
///
/// Returns the document (borrowed when nothing changed) and the number of
/// labels written. At most one label is written per node group.
#[must_use]
pub fn inject_labels<'d>(
    doc: &'d str,
    source: &dyn LabelSource,
    config: &SanitizeConfig,
) -> (Cow<'d, str>, usize) {
    let marker = config.node_group_marker.as_str();
    let mut stack: Vec<Role> = Vec::new();
    // Per node group: whether its label is settled.
    let mut settled: Vec<bool> = Vec::new();
    let mut inserts: Vec<(usize, String)> = Vec::new();

    for tag in Scanner::new(doc) {
        match tag.kind {
            TagKind::Start => {
                if tag.name == "text"
                    && let Some(Role::Label { has_text, .. }) = stack
                        .iter_mut()
                        .rev()
                        .find(|role| matches!(role, Role::Label { .. }))
                {
                    *has_text = true;
                }
                if tag.self_closing {
                    continue;
                }
                let role = if tag.name == "g" {
                    group_role(&Attributes::parse(tag.attrs), marker, &stack, &mut settled)
                } else {
                    Role::Plain
                };
                stack.push(role);
            }
            TagKind::End => {
                let Some(Role::Label { slot, has_text, at }) = stack.pop() else {
                    continue;
                };
                if settled[slot] {
                    continue;
                }
                settled[slot] = true;
                if has_text {
                    continue;
                }
                if let Some(label) = enclosing_node(&stack, slot).and_then(|id| source.resolve(id)) {
                    inserts.push((tag.start, label_element(label, at, config)));
                }
            }
            TagKind::Comment | TagKind::Declaration | TagKind::CData => {}
        }
    }

    if inserts.is_empty() {
        return (Cow::Borrowed(doc), 0);
    }
    let count = inserts.len();
    let mut out = String::with_capacity(doc.len() + count * 128);
    let mut copied = 0;
    for (at, element) in &inserts {
        out.push_str(&doc[copied..*at]);
        out.push_str(element);
        copied = *at;
    }
    out.push_str(&doc[copied..]);
    debug!("Injected {count} node labels into {} node groups", settled.len());
    (Cow::Owned(out), count)
}

fn group_role(attrs: &Attributes, marker: &str, stack: &[Role], settled: &mut Vec<bool>) -> Role {
    if let Some(node) = attrs
        .get("id")
        .and_then(|id| node_id_from_group_id(id, marker))
    {
        settled.push(false);
        return Role::Node {
            id: node.to_string(),
            slot: settled.len() - 1,
        };
    }

    if !attrs.has_class("label") || stack.iter().any(|role| matches!(role, Role::Label { .. })) {
        return Role::Plain;
    }
    match stack.iter().rev().find_map(|role| match role {
        Role::Node { slot, .. } => Some(*slot),
        _ => None,
    }) {
        Some(slot) if !settled[slot] => Role::Label {
            slot,
            has_text: false,
            at: attrs.get("transform").map(centre_of).unwrap_or_default(),
        },
        _ => Role::Plain,
    }
}

fn enclosing_node(stack: &[Role], slot: usize) -> Option<&str> {
    stack.iter().rev().find_map(|role| match role {
        Role::Node { id, slot: s } if *s == slot => Some(id.as_str()),
        _ => None,
    })
}

/// The label group's `translate(tx, ty)` moves its origin to the top-left
/// of the label box; the node centre is the inverse. Components that do not
/// parse to a finite number count as zero.
fn centre_of(transform: &str) -> (f32, f32) {
    let Some(args) = transform
        .split_once("translate(")
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(args, _)| args)
    else {
        return (0.0, 0.0);
    };
    let mut numbers = args
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f32>().ok().filter(|v| v.is_finite()).unwrap_or(0.0));
    let tx = numbers.next().unwrap_or(0.0);
    let ty = numbers.next().unwrap_or(0.0);
    (-tx, -ty)
}

fn label_element(label: &str, (x, y): (f32, f32), config: &SanitizeConfig) -> String {
    let mut attrs = Attributes::new();
    attrs.set("x", &format_number(x));
    attrs.set("y", &format_number(y));
    attrs.set("text-anchor", "middle");
    attrs.set("dominant-baseline", "central");
    attrs.set("fill", &config.label_fill);
    attrs.set("font-size", &format_number(config.label_font_size));

    let mut out = String::new();
    scan::write_start_tag(&mut out, "text", &attrs, false);
    out.push_str(&escape_xml_text(label));
    out.push_str("</text>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelMap {
        let mut map = LabelMap::new();
        for (id, label) in pairs {
            map.insert_first(id, label);
        }
        map
    }

    const NODE: &str = concat!(
        r#"<svg><g class="nodes"><g id="flowchart-A-0" class="node" transform="translate(50, 20)">"#,
        r#"<rect width="80" height="40"/><g class="label" transform="translate(-24, -12)"><rect/></g>"#,
        r#"</g></g></svg>"#,
    );

    #[test]
    fn parses_node_group_ids() {
        assert_eq!(node_id_from_group_id("flowchart-A-0", "flowchart-"), Some("A"));
        assert_eq!(node_id_from_group_id("mermaid-1-flowchart-my-node-12", "flowchart-"), Some("my-node"));
        assert_eq!(node_id_from_group_id("flowchart-A", "flowchart-"), None);
        assert_eq!(node_id_from_group_id("flowchart--3", "flowchart-"), None);
        assert_eq!(node_id_from_group_id("subflowchart-A-0", "flowchart-"), None);
        assert_eq!(node_id_from_group_id("L-A-B-0", "flowchart-"), None);
    }

    #[test]
    fn injects_centred_label() {
        let (out, count) = inject_labels(NODE, &labels(&[("A", "Start")]), &SanitizeConfig::default());
        assert_eq!(count, 1);
        assert!(out.contains(concat!(
            r#"<g class="label" transform="translate(-24, -12)"><rect/>"#,
            r##"<text x="24" y="12" text-anchor="middle" dominant-baseline="central" fill="#333333" font-size="14">Start</text></g>"##,
        )));
    }

    #[test]
    fn falls_back_to_raw_id() {
        let (out, count) = inject_labels(NODE, &LabelsOrRawIds(&LabelMap::new()), &SanitizeConfig::default());
        assert_eq!(count, 1);
        assert!(out.contains(">A</text>"));
        let (out, _) = inject_labels(NODE, &RawNodeIds, &SanitizeConfig::default());
        assert!(out.contains(">A</text>"));
    }

    #[test]
    fn unknown_node_without_fallback_is_left_alone() {
        let (out, count) = inject_labels(NODE, &labels(&[("B", "Other")]), &SanitizeConfig::default());
        assert_eq!(count, 0);
        assert_eq!(out, NODE);
    }

    #[test]
    fn existing_text_is_not_duplicated() {
        let doc = NODE.replace("<rect/></g>", "<text>Start</text></g>");
        let (out, count) = inject_labels(&doc, &RawNodeIds, &SanitizeConfig::default());
        assert_eq!(count, 0);
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn injects_once_per_group() {
        let doc = NODE.replace(
            "<rect/></g></g>",
            r#"<rect/></g><g class="label"><rect/></g></g>"#,
        );
        let (out, count) = inject_labels(&doc, &RawNodeIds, &SanitizeConfig::default());
        assert_eq!(count, 1);
        assert_eq!(out.matches("<text").count(), 1);
    }

    #[test]
    fn edge_labels_are_ignored() {
        let doc = r#"<svg><g class="edgeLabel"><g class="label"><rect/></g></g></svg>"#;
        let (out, count) = inject_labels(doc, &RawNodeIds, &SanitizeConfig::default());
        assert_eq!(count, 0);
        assert_eq!(out, doc);
    }

    #[test]
    fn escapes_label_text() {
        let (out, _) = inject_labels(NODE, &labels(&[("A", r#"a < b & "c""#)]), &SanitizeConfig::default());
        assert!(out.contains(">a &lt; b &amp; &quot;c&quot;</text>"));
    }

    #[test]
    fn label_without_transform_is_centred_on_origin() {
        let doc = NODE.replace(r#" transform="translate(-24, -12)""#, "");
        let (out, _) = inject_labels(&doc, &RawNodeIds, &SanitizeConfig::default());
        assert!(out.contains(r#"<text x="0" y="0""#));
    }

    #[test]
    fn parses_translate_forms() {
        assert_eq!(centre_of("translate(-24 -12.5)"), (24.0, 12.5));
        assert_eq!(centre_of("translate(10)"), (-10.0, -0.0));
        assert_eq!(centre_of("scale(2)"), (0.0, 0.0));
        assert_eq!(centre_of("translate(inf, -NaN)"), (-0.0, -0.0));
    }

    #[test]
    fn degenerate_translate_still_yields_numeric_coordinates() {
        let doc = NODE.replace("translate(-24, -12)", "translate(NaN, 1e12)");
        let (out, count) = inject_labels(&doc, &labels(&[("A", "Start")]), &SanitizeConfig::default());
        assert_eq!(count, 1);
        assert!(out.contains(r#"<text x="0" y="-999999995904""#), "{out}");
        assert!(!out.contains("NaN"));
        assert!(!out.contains("2147483648"));
    }

    #[test]
    fn label_fill_is_escaped_as_an_attribute() {
        let config = SanitizeConfig {
            label_fill: r#"a"b'c"#.to_string(),
            ..SanitizeConfig::default()
        };
        let (out, _) = inject_labels(NODE, &RawNodeIds, &config);
        assert!(out.contains(r#"fill="a&quot;b&#39;c""#), "{out}");
    }
}
