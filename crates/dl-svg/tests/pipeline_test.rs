//! End-to-end sanitizer tests against real renderer output.

use dl_core::{Fidelity, SanitizeConfig};
use dl_svg::{HostImport, SanitizeError, StrictXmlHost, sanitize_for_host, sanitize_minimal, sanitize_svg};
use proptest::prelude::*;

const FLOWCHART_SVG: &str = include_str!("fixtures/flowchart.svg");
const FLOWCHART_SOURCE: &str = include_str!("fixtures/flowchart.mmd");

fn start_tag<'a>(svg: &'a str, marker: &str) -> &'a str {
    let at = svg.find(marker).unwrap_or_else(|| panic!("{marker} not found"));
    let start = svg[..at].rfind('<').unwrap();
    let end = at + svg[at..].find('>').unwrap() + 1;
    &svg[start..end]
}

#[test]
fn sanitized_flowchart_imports_into_strict_host() {
    let out = sanitize_svg(FLOWCHART_SVG, Some(FLOWCHART_SOURCE)).unwrap();
    let summary = StrictXmlHost.import(&out).unwrap();
    // Three injected labels plus the caption.
    assert_eq!(summary.text_elements, 4);

    for gone in ["<style", "foreignObject", "filter", "currentColor", "<defs", "<p>"] {
        assert!(!out.contains(gone), "{gone} survived sanitization");
    }
}

#[test]
fn labels_come_from_source() {
    let out = sanitize_svg(FLOWCHART_SVG, Some(FLOWCHART_SOURCE)).unwrap();
    assert!(out.contains(
        r##"<text x="23.50" y="12" text-anchor="middle" dominant-baseline="central" fill="#333333" font-size="14">Start</text>"##
    ));
    assert!(out.contains(">Is it ok?</text>"));
    assert!(out.contains(">Done &amp; dusted</text>"));
    // Edge labels are not node groups.
    assert!(!out.contains(">yes</text>"));
}

#[test]
fn labels_fall_back_to_node_ids_without_source() {
    let out = sanitize_svg(FLOWCHART_SVG, None).unwrap();
    for id in ["A", "B", "C"] {
        assert!(out.contains(&format!(">{id}</text>")));
    }
}

#[test]
fn class_rules_become_attributes() {
    let out = sanitize_svg(FLOWCHART_SVG, None).unwrap();

    let rect = start_tag(&out, r#"x="-53.5""#);
    assert!(rect.contains(r##"fill="#ECECFF""##), "{rect}");
    assert!(rect.contains(r##"stroke="#9370DB""##), "{rect}");

    let link = start_tag(&out, r#"id="L_A_B_0""#);
    assert!(link.contains(r#"fill="none""#), "{link}");
    assert!(link.contains(r#"stroke-width="1px""#), "{link}");
    assert!(link.contains(r#"marker-end="url(#mermaid-1_flowchart-v2-pointEnd)""#), "{link}");

    // Explicit inline paints beat the class rule.
    let highlighted = start_tag(&out, r#"rx="5""#);
    assert!(!highlighted.contains(r##"fill="#ECECFF""##), "{highlighted}");
}

#[test]
fn node_groups_lose_stroke_but_keep_fill() {
    let out = sanitize_svg(FLOWCHART_SVG, None).unwrap();
    let group = start_tag(&out, r#"id="flowchart-C-2""#);
    assert_eq!(
        group,
        r##"<g class="node default highlight" id="flowchart-C-2" transform="translate(94, 312)" fill="#f96">"##
    );
}

#[test]
fn broken_font_family_is_repaired() {
    let out = sanitize_svg(FLOWCHART_SVG, None).unwrap();
    let caption = start_tag(&out, r#"class="caption""#);
    assert!(caption.contains(r#"font-family="&#39;trebuchet ms&#39;,verdana""#), "{caption}");
    assert!(caption.contains(r##"fill="#333333""##), "{caption}");
}

#[test]
fn sanitizing_twice_changes_nothing() {
    let once = sanitize_svg(FLOWCHART_SVG, Some(FLOWCHART_SOURCE)).unwrap();
    let twice = sanitize_svg(&once, Some(FLOWCHART_SOURCE)).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn minimal_output_imports_into_strict_host() {
    let out = sanitize_minimal(FLOWCHART_SVG).unwrap();
    StrictXmlHost.import(&out).unwrap();
    for gone in ["<style", "<defs", "foreignObject", "marker-end", "filter"] {
        assert!(!out.contains(gone), "{gone} survived minimal sanitization");
    }
}

#[test]
fn strict_host_accepts_full_fidelity() {
    let imported = sanitize_for_host(
        FLOWCHART_SVG,
        Some(FLOWCHART_SOURCE),
        &SanitizeConfig::default(),
        &mut StrictXmlHost,
    )
    .unwrap();
    assert_eq!(imported.fidelity, Fidelity::Full);
}

#[test]
fn unbalanced_output_is_rejected_after_fallback() {
    let unbalanced = FLOWCHART_SVG.replace("</g></g></g><defs>", "</g></g><defs>");
    assert_ne!(unbalanced, FLOWCHART_SVG);
    let err = sanitize_for_host(&unbalanced, None, &SanitizeConfig::default(), &mut StrictXmlHost)
        .unwrap_err();
    // The minimal sanitizer does not rebalance markup, so the host refuses both attempts.
    assert!(matches!(
        err,
        SanitizeError::HostRejected {
            fidelity: Fidelity::Minimal,
            ..
        }
    ));
}

fn element() -> impl Strategy<Value = String> {
    let name = prop::sample::select(vec!["rect", "circle", "path", "text", "g"]);
    let class = prop::sample::select(vec!["", "a", "b", "a b", "c"]);
    let fill = prop::option::of(prop::sample::select(vec!["red", "currentColor", "url(#f)"]));
    (name, class, fill).prop_map(|(name, class, fill)| {
        let mut tag = format!("<{name}");
        if !class.is_empty() {
            tag.push_str(&format!(r#" class="{class}""#));
        }
        if let Some(fill) = fill {
            tag.push_str(&format!(r#" fill="{fill}""#));
        }
        if name == "text" {
            tag.push_str(">t</text>");
        } else {
            tag.push_str("/>");
        }
        tag
    })
}

proptest! {
    #[test]
    fn generated_documents_import_and_are_stable(elements in prop::collection::vec(element(), 0..16)) {
        let svg = format!(
            "<svg><style>.a{{fill:#111;cursor:pointer}} .b{{stroke:currentColor;filter:url(#f)}}</style>\
             <defs><filter id=\"f\"/></defs><g id=\"flowchart-N-0\"><g class=\"label\"></g>{}</g></svg>",
            elements.concat()
        );
        let once = sanitize_svg(&svg, None).unwrap();
        prop_assert!(StrictXmlHost.import(&once).is_ok());
        prop_assert!(!once.contains("currentColor"));
        let twice = sanitize_svg(&once, None).unwrap();
        prop_assert_eq!(once, twice);
    }
}
