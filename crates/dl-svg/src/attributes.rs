//! Attribute lists of scanned start tags.
//!
//! Values are held unescaped and escaped again on render, so every tag a
//! pass touches comes out with canonical double-quoted attributes.

use std::borrow::Cow;

use crate::css::Declarations;

/// A single SVG attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Ordered attributes of one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    attrs: Vec<Attribute>,
}

impl Attributes {
    /// Create a new empty attribute collection.
    #[must_use]
    pub fn new() -> Self {
        Self { attrs: Vec::new() }
    }

    /// Parse the raw attribute text of a start tag.
    ///
    /// Accepts double-quoted, single-quoted, unquoted and valueless
    /// attributes. Entities are decoded and line breaks inside values
    /// collapse to a single space. A repeated name keeps its first value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let bytes = raw.as_bytes();
        let mut attrs = Self::new();
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/' {
                pos += 1;
                continue;
            }

            let name_start = pos;
            while pos < bytes.len()
                && !bytes[pos].is_ascii_whitespace()
                && !matches!(bytes[pos], b'=' | b'/' | b'>' | b'"' | b'\'')
            {
                pos += 1;
            }
            if pos == name_start {
                pos += 1;
                continue;
            }
            let name = &raw[name_start..pos];

            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            let mut value = "";
            if bytes.get(pos) == Some(&b'=') {
                pos += 1;
                while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                match bytes.get(pos) {
                    Some(&quote @ (b'"' | b'\'')) => {
                        let start = pos + 1;
                        let end = raw[start..]
                            .find(char::from(quote))
                            .map_or(raw.len(), |rel| start + rel);
                        value = &raw[start..end];
                        pos = (end + 1).min(raw.len());
                    }
                    Some(_) => {
                        let start = pos;
                        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                            pos += 1;
                        }
                        value = &raw[start..pos];
                    }
                    None => {}
                }
            }

            if !attrs.has(name) {
                attrs.attrs.push(Attribute {
                    name: name.to_string(),
                    value: collapse_line_breaks(&unescape_xml(value)).into_owned(),
                });
            }
        }
        attrs
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => value.clone_into(&mut attr.value),
            None => self.attrs.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Insert an attribute ahead of all others unless it is already set.
    pub fn prepend(&mut self, name: &str, value: &str) {
        if !self.has(name) {
            self.attrs.insert(
                0,
                Attribute {
                    name: name.to_string(),
                    value: value.to_string(),
                },
            );
        }
    }

    /// Remove an attribute; reports whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|a| a.name != name);
        self.attrs.len() != before
    }

    /// Check if a specific attribute is set.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Get the value of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.attrs.iter_mut()
    }

    /// Class names from the `class` attribute, in order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.get("class").unwrap_or_default().split_whitespace()
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Declarations of the inline `style` attribute.
    #[must_use]
    pub fn style(&self) -> Declarations {
        self.get("style").map(Declarations::parse).unwrap_or_default()
    }

    /// Replace the inline `style`; an empty set removes the attribute.
    pub fn set_style(&mut self, style: &Declarations) {
        if style.is_empty() {
            self.remove("style");
        } else {
            self.set("style", &style.render());
        }
    }

    /// Whether `property` is given either as an attribute or inline style.
    #[must_use]
    pub fn declares(&self, property: &str) -> bool {
        self.has(property) || self.style().contains(property)
    }

    /// Render attributes to a string.
    #[must_use]
    pub fn render(&self) -> String {
        let mut result = String::new();
        for attr in &self.attrs {
            result.push(' ');
            result.push_str(&attr.name);
            result.push_str("=\"");
            push_escaped(&mut result, &attr.value, true);
            result.push('"');
        }
        result
    }

    /// Get the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Check if the attribute collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Format a coordinate the way it is written into attributes.
///
/// Non-finite values are written as `0`; whole numbers lose the fraction.
#[must_use]
pub fn format_number(n: f32) -> String {
    if !n.is_finite() || n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n:.2}")
    }
}

/// Append `s` with markup characters replaced by references. Apostrophes
/// only need escaping inside attribute values.
fn push_escaped(out: &mut String, s: &str, in_attribute: bool) {
    for c in s.chars() {
        let reference = match c {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            '"' => "&quot;",
            '\'' if in_attribute => "&#39;",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push_str(reference);
    }
}

/// Escape special characters in XML text content.
#[must_use]
pub fn escape_xml_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    push_escaped(&mut result, s, false);
    result
}

/// Decode the predefined XML entities and character references.
///
/// Anything else that starts with `&` is kept literally.
pub(crate) fn unescape_xml(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code).filter(|c| *c != '\0')
        }
    }
}

fn collapse_line_breaks(value: &str) -> Cow<'_, str> {
    if !value.contains(['\n', '\r']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            while out.ends_with([' ', '\t']) {
                out.pop();
            }
            out.push(' ');
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
