//! Class-rule collection from embedded `<style>` blocks.
//!
//! Only the part of CSS the renderer emits matters here: flat rule lists
//! whose selectors end in one or more `.class` references. At-rules are
//! skipped, pseudo-classes and attribute selectors are ignored.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::scan::{self, Scanner, TagKind};

/// Ordered `property: value` pairs with last-write-wins semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    entries: Vec<(String, String)>,
}

impl Declarations {
    /// Parse a declaration block body (`fill:#fff; stroke: red !important`).
    ///
    /// Properties are lowercased, `!important` is dropped, entries without a
    /// colon or with an empty side are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut decls = Self::default();
        for piece in split_top_level(text, b';') {
            let Some((property, value)) = piece.split_once(':') else {
                continue;
            };
            let property = property.trim().to_ascii_lowercase();
            let value = strip_important(value.trim());
            if property.is_empty() || value.is_empty() {
                continue;
            }
            decls.set(&property, value);
        }
        decls
    }

    pub fn set(&mut self, property: &str, value: &str) {
        match self.entries.iter_mut().find(|(p, _)| p == property) {
            Some((_, existing)) => value.clone_into(existing),
            None => self.entries.push((property.to_string(), value.to_string())),
        }
    }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.entries.iter().any(|(p, _)| p == property)
    }

    pub fn remove(&mut self, property: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(p, _)| p != property);
        self.entries.len() != before
    }

    /// Apply `other` on top of `self`.
    pub fn merge(&mut self, other: &Self) {
        for (property, value) in &other.entries {
            self.set(property, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut String)> {
        self.entries.iter_mut().map(|(p, v)| (p.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as an inline style value (`fill:#fff;stroke:red`).
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, (property, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                out.push(';');
            }
            out.push_str(property);
            out.push(':');
            out.push_str(value);
        }
        out
    }
}

/// Class name → merged declarations, in stylesheet order.
#[derive(Debug, Clone, Default)]
pub struct StyleRuleSet {
    rules: FxHashMap<String, Declarations>,
}

impl StyleRuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single stylesheet.
    #[must_use]
    pub fn parse(css: &str) -> Self {
        let mut rules = Self::new();
        rules.add_stylesheet(css);
        rules
    }

    /// Fold a stylesheet into the set. A class mentioned by several rules
    /// accumulates their declarations, later ones overriding earlier ones.
    pub fn add_stylesheet(&mut self, css: &str) {
        let css = strip_comments(css);
        let mut rest = css.as_str();
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            let Some(brace) = rest.find('{') else {
                break;
            };

            if rest.starts_with('@') {
                if let Some(semi) = rest.find(';')
                    && semi < brace
                {
                    rest = &rest[semi + 1..];
                    continue;
                }
                rest = match block_end(rest, brace) {
                    Some(end) => &rest[end + 1..],
                    None => "",
                };
                continue;
            }

            let prelude = &rest[..brace];
            let body_start = brace + 1;
            let (body, next) = match rest[body_start..].find('}') {
                Some(rel) => (&rest[body_start..body_start + rel], &rest[body_start + rel + 1..]),
                None => (&rest[body_start..], ""),
            };
            self.add_rule(prelude, body);
            rest = next;
        }
    }

    fn add_rule(&mut self, prelude: &str, body: &str) {
        let decls = Declarations::parse(body);
        if decls.is_empty() {
            return;
        }
        for selector in prelude.split(',') {
            let Some(subject) = selector.split_whitespace().last() else {
                continue;
            };
            for class in class_refs(subject) {
                self.rules.entry(class.to_string()).or_default().merge(&decls);
            }
        }
    }

    #[must_use]
    pub fn get(&self, class: &str) -> Option<&Declarations> {
        self.rules.get(class)
    }

    /// Union of the declarations of `classes`; later classes win conflicts.
    pub fn resolve<'c>(&self, classes: impl IntoIterator<Item = &'c str>) -> Declarations {
        let mut resolved = Declarations::default();
        for class in classes {
            if let Some(decls) = self.rules.get(class) {
                resolved.merge(decls);
            }
        }
        resolved
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Collect class rules from every `<style>` block and return the document
/// with those blocks removed.
#[must_use]
pub fn collect_styles(doc: &str) -> (StyleRuleSet, String) {
    let mut rules = StyleRuleSet::new();
    let mut blocks = 0_usize;
    let mut scanner = Scanner::new(doc).peekable();
    while let Some(tag) = scanner.next() {
        if tag.kind != TagKind::Start || tag.self_closing || !tag.name.eq_ignore_ascii_case("style") {
            continue;
        }
        if let Some(close) = scanner.next_if(|next| next.kind == TagKind::End) {
            rules.add_stylesheet(&doc[tag.end..close.start]);
            blocks += 1;
        }
    }
    debug!("Collected {} class rules from {blocks} style blocks", rules.len());
    if blocks == 0 {
        return (rules, doc.to_string());
    }
    (rules, scan::remove_elements(doc, &["style"]))
}

/// Class names referenced by one compound selector (`g.node.default:hover`).
fn class_refs(subject: &str) -> impl Iterator<Item = &str> {
    subject.split('.').skip(1).filter_map(|segment| {
        let len = segment
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '-' | '_') || !c.is_ascii()))
            .map_or(segment.len(), |(at, _)| at);
        (len > 0).then(|| &segment[..len])
    })
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(open) = rest.find("/*") {
        out.push_str(&rest[..open]);
        match rest[open + 2..].find("*/") {
            Some(rel) => rest = &rest[open + 2 + rel + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.replace("<![CDATA[", "").replace("]]>", "")
}

/// Offset of the `}` closing the block opened at `open`.
fn block_end(css: &str, open: usize) -> Option<usize> {
    let mut depth = 0_usize;
    for (at, byte) in css.bytes().enumerate().skip(open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(at);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_important(value: &str) -> &str {
    match value.rfind('!') {
        Some(bang) if value[bang + 1..].trim().eq_ignore_ascii_case("important") => {
            value[..bang].trim_end()
        }
        _ => value,
    }
}

/// Split on `sep` outside quotes and parentheses.
fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut quote: Option<u8> = None;
    let mut depth = 0_usize;
    let mut start = 0;
    for (at, byte) in text.bytes().enumerate() {
        match (quote, byte) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(byte),
            (None, b'(') => depth += 1,
            (None, b')') => depth = depth.saturating_sub(1),
            (None, b) if b == sep && depth == 0 => {
                pieces.push(&text[start..at]);
                start = at + 1;
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
}
