//! Node-shape scanner.
//!
//! Walks each source line once, left to right. A node declaration is a run
//! of word characters immediately followed by one of the shape openers in
//! [`DELIMITERS`]; the text up to the matching closer is the label. Malformed
//! or unterminated shapes are skipped, never reported.

use dl_core::LabelMap;
use tracing::debug;

use crate::COMMENT_MARKER;

/// Node shapes recognised by their delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    /// `id[label]`
    Rect,
    /// `id(label)`
    Rounded,
    /// `id{label}`
    Diamond,
    /// `id[[label]]`
    Subroutine,
    /// `id((label))`
    Circle,
    /// `id(((label)))`
    DoubleCircle,
    /// `id([label])`
    Stadium,
    /// `id[(label)]`
    Cylinder,
    /// `id{{label}}`
    Hexagon,
    /// `id[/label/]`
    Parallelogram,
    /// `id[\label\]`
    InvParallelogram,
    /// `id[/label\]`
    Trapezoid,
    /// `id[\label/]`
    InvTrapezoid,
    /// `id>label]`
    Asymmetric,
}

/// One `id<open>label<close>` occurrence in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDeclaration {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
    /// 1-based source line.
    pub line: usize,
}

struct Delimiter {
    open: &'static str,
    closes: &'static [(&'static str, NodeShape)],
}

/// Openers sharing a prefix are listed longest first.
const DELIMITERS: &[Delimiter] = &[
    Delimiter {
        open: "(((",
        closes: &[(")))", NodeShape::DoubleCircle)],
    },
    Delimiter {
        open: "[[",
        closes: &[("]]", NodeShape::Subroutine)],
    },
    Delimiter {
        open: "[(",
        closes: &[(")]", NodeShape::Cylinder)],
    },
    Delimiter {
        open: "[/",
        closes: &[("/]", NodeShape::Parallelogram), ("\\]", NodeShape::Trapezoid)],
    },
    Delimiter {
        open: "[\\",
        closes: &[("\\]", NodeShape::InvParallelogram), ("/]", NodeShape::InvTrapezoid)],
    },
    Delimiter {
        open: "((",
        closes: &[("))", NodeShape::Circle)],
    },
    Delimiter {
        open: "([",
        closes: &[("])", NodeShape::Stadium)],
    },
    Delimiter {
        open: "{{",
        closes: &[("}}", NodeShape::Hexagon)],
    },
    Delimiter {
        open: "[",
        closes: &[("]", NodeShape::Rect)],
    },
    Delimiter {
        open: "(",
        closes: &[(")", NodeShape::Rounded)],
    },
    Delimiter {
        open: "{",
        closes: &[("}", NodeShape::Diamond)],
    },
    Delimiter {
        open: ">",
        closes: &[("]", NodeShape::Asymmetric)],
    },
];

/// Build the identifier → label map for `source`.
///
/// The first declaration of an identifier in source order wins, whatever
/// shape later declarations use. Blank labels leave the identifier unmapped.
#[must_use]
pub fn extract_labels(source: &str) -> LabelMap {
    let mut labels = LabelMap::new();
    let declarations = scan_node_declarations(source);
    for decl in &declarations {
        labels.insert_first(&decl.id, &decl.label);
    }
    debug!(
        "Extracted {} labels from {} node declarations",
        labels.len(),
        declarations.len()
    );
    labels
}

/// Every shape-delimited node declaration in `source`, in source order.
#[must_use]
pub fn scan_node_declarations(source: &str) -> Vec<NodeDeclaration> {
    let mut declarations = Vec::new();
    for (index, line) in source.lines().enumerate() {
        if line.trim_start().starts_with(COMMENT_MARKER) {
            continue;
        }
        scan_line(line, index + 1, &mut declarations);
    }
    declarations
}

fn scan_line(line: &str, line_no: usize, out: &mut Vec<NodeDeclaration>) {
    let bytes = line.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if !is_word_byte(bytes[pos]) {
            pos += 1;
            continue;
        }

        let id_start = pos;
        while pos < bytes.len() && is_word_byte(bytes[pos]) {
            pos += 1;
        }

        if let Some((shape, label, end)) = match_shape(line, pos) {
            out.push(NodeDeclaration {
                id: line[id_start..pos].to_string(),
                label: label.to_string(),
                shape,
                line: line_no,
            });
            pos = end;
        }
    }
}

/// Try every opener at `pos`; returns shape, cleaned label and the byte
/// offset just past the closer.
fn match_shape(line: &str, pos: usize) -> Option<(NodeShape, &str, usize)> {
    let rest = &line[pos..];
    for delimiter in DELIMITERS {
        let Some(body) = rest.strip_prefix(delimiter.open) else {
            continue;
        };
        let body_start = pos + delimiter.open.len();

        if let Some((shape, label, consumed)) = match_quoted(body, delimiter) {
            return Some((shape, label, body_start + consumed));
        }

        let closing = delimiter
            .closes
            .iter()
            .filter_map(|(close, shape)| body.find(close).map(|at| (at, *close, *shape)))
            .min_by_key(|(at, _, _)| *at);
        if let Some((at, close, shape)) = closing {
            return Some((shape, clean_label(&body[..at]), body_start + at + close.len()));
        }
        // Unterminated; a shorter opener sharing this prefix may still match.
    }
    None
}

/// `"label"` directly inside the delimiters, allowing closers in the label.
fn match_quoted<'a>(body: &'a str, delimiter: &Delimiter) -> Option<(NodeShape, &'a str, usize)> {
    let leading = body.len() - body.trim_start().len();
    let quoted = body[leading..].strip_prefix('"')?;
    let quote_end = quoted.find('"')?;
    let label = &quoted[..quote_end];

    let after_quote = leading + 1 + quote_end + 1;
    let tail = &body[after_quote..];
    let gap = tail.len() - tail.trim_start().len();
    let tail = &tail[gap..];

    delimiter.closes.iter().find_map(|(close, shape)| {
        tail.starts_with(close)
            .then(|| (*shape, label.trim(), after_quote + gap + close.len()))
    })
}

fn clean_label(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .map_or(trimmed, str::trim)
}

const fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn extracts_simple_flowchart_labels() {
        let labels = extract_labels("flowchart LR\n  A[Start] --> B[End]");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("A"), Some("Start"));
        assert_eq!(labels.get("B"), Some("End"));
    }

    #[test]
    fn recognises_every_shape() {
        let source = "flowchart TB\n\
            a[rect] --> b(rounded)\n\
            c{diamond} --> d[[sub]]\n\
            e((circle)) --> f([stadium])\n\
            g{{hex}} --> h[/para/]\n\
            i[\\inv\\] --> j[/trap\\]\n\
            k[\\invtrap/] --> l[(db)]\n\
            m(((double))) --> n>flag]";
        let decls = scan_node_declarations(source);
        let shapes: Vec<_> = decls.iter().map(|d| (d.id.as_str(), d.shape)).collect();
        assert_eq!(
            shapes,
            vec![
                ("a", NodeShape::Rect),
                ("b", NodeShape::Rounded),
                ("c", NodeShape::Diamond),
                ("d", NodeShape::Subroutine),
                ("e", NodeShape::Circle),
                ("f", NodeShape::Stadium),
                ("g", NodeShape::Hexagon),
                ("h", NodeShape::Parallelogram),
                ("i", NodeShape::InvParallelogram),
                ("j", NodeShape::Trapezoid),
                ("k", NodeShape::InvTrapezoid),
                ("l", NodeShape::Cylinder),
                ("m", NodeShape::DoubleCircle),
                ("n", NodeShape::Asymmetric),
            ]
        );
        let labels = extract_labels(source);
        assert_eq!(labels.get("e"), Some("circle"));
        assert_eq!(labels.get("f"), Some("stadium"));
        assert_eq!(labels.get("j"), Some("trap"));
        assert_eq!(labels.get("m"), Some("double"));
    }

    #[test]
    fn first_declaration_wins_across_shapes() {
        let labels = extract_labels("flowchart LR\nA(Rounded first) --> B\nA[Square later]");
        assert_eq!(labels.get("A"), Some("Rounded first"));

        let labels = extract_labels("flowchart LR\nA[Square first]\nA((Circle later))");
        assert_eq!(labels.get("A"), Some("Square first"));
    }

    #[test]
    fn comment_lines_are_ignored() {
        let labels = extract_labels("%% A[Commented]\nflowchart LR\n  %%{init: {}}%%\n  A[Live]");
        assert_eq!(labels.get("A"), Some("Live"));
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn blank_labels_leave_identifier_unmapped() {
        let labels = extract_labels("flowchart LR\nA[   ] --> B[End]");
        assert!(!labels.contains("A"));
        assert_eq!(labels.get("B"), Some("End"));
    }

    #[test]
    fn unterminated_shape_is_skipped() {
        let labels = extract_labels("flowchart LR\nA[Start\nB[End]");
        assert!(!labels.contains("A"));
        assert_eq!(labels.get("B"), Some("End"));
    }

    #[test]
    fn keeps_non_ascii_labels() {
        let labels = extract_labels("flowchart LR\n  A[开始] --> B{是否通过?}\n  B -->|是| C(结束)");
        assert_eq!(labels.get("A"), Some("开始"));
        assert_eq!(labels.get("B"), Some("是否通过?"));
        assert_eq!(labels.get("C"), Some("结束"));
    }

    #[test]
    fn quoted_labels_may_contain_closers() {
        let labels = extract_labels("flowchart LR\nA[\"Load [cache]\"] --> B(\"f(x)\")");
        assert_eq!(labels.get("A"), Some("Load [cache]"));
        assert_eq!(labels.get("B"), Some("f(x)"));
    }

    #[test]
    fn edge_labels_are_not_nodes() {
        let labels = extract_labels("flowchart LR\nA -->|yes| B\nB -- no --> C");
        assert!(labels.is_empty());
    }

    #[test]
    fn records_source_lines() {
        let decls = scan_node_declarations("flowchart LR\n\nX[one]");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].line, 3);
    }

    fn identifier() -> impl Strategy<Value = String> {
        "[A-Za-z_][A-Za-z0-9_]{0,6}"
    }

    fn arrow() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just(" --> "), Just(" --- "), Just(" -.-> "), Just(" ==> ")]
    }

    proptest! {
        #[test]
        fn shapeless_sources_yield_no_labels(
            edges in prop::collection::vec((identifier(), arrow(), identifier()), 0..12)
        ) {
            let mut source = String::from("flowchart TD\n");
            for (from, arrow, to) in &edges {
                source.push_str(from);
                source.push_str(arrow);
                source.push_str(to);
                source.push('\n');
            }
            prop_assert!(extract_labels(&source).is_empty());
        }

        #[test]
        fn extraction_is_deterministic(source in "[A-Za-z0-9_\\[\\](){}>/ \\n-]{0,80}") {
            prop_assert_eq!(extract_labels(&source), extract_labels(&source));
        }
    }
}
