//! Finite-state tag scanner over SVG markup.
//!
//! The scanner never builds a tree. It yields tags with byte spans so the
//! passes in this crate can copy untouched text verbatim and rewrite only
//! the tags they care about. `style` and `script` bodies are raw text.

use crate::SanitizeError;
use crate::attributes::Attributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Start,
    End,
    Comment,
    /// `<?xml ...?>`, `<!DOCTYPE ...>` and friends.
    Declaration,
    CData,
}

/// One tag located in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    pub kind: TagKind,
    /// Element name for start and end tags, empty otherwise.
    pub name: &'a str,
    /// Raw attribute text of a start tag, without the self-closing slash.
    pub attrs: &'a str,
    pub self_closing: bool,
    /// Byte offset of `<`.
    pub start: usize,
    /// Byte offset just past `>`.
    pub end: usize,
}

impl Tag<'_> {
    #[must_use]
    pub fn is_start(&self, name: &str) -> bool {
        self.kind == TagKind::Start && self.name == name
    }

    #[must_use]
    pub fn is_end(&self, name: &str) -> bool {
        self.kind == TagKind::End && self.name == name
    }
}

/// Iterator over the tags of a document.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    raw_text: Option<&'a str>,
    truncated: Option<usize>,
    stray: Option<usize>,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            raw_text: None,
            truncated: None,
            stray: None,
        }
    }

    /// Offset of the construct that ended the scan early, if any.
    #[must_use]
    pub fn truncated_at(&self) -> Option<usize> {
        self.truncated
    }

    /// Offset of the first `<` that did not open a tag.
    #[must_use]
    pub fn stray_at(&self) -> Option<usize> {
        self.stray
    }

    fn stop(&mut self, at: usize) -> Option<Tag<'a>> {
        self.truncated = Some(at);
        self.pos = self.src.len();
        None
    }

    fn scan_delimited(&mut self, start: usize, open_len: usize, close: &str, kind: TagKind) -> Option<Tag<'a>> {
        let body = start + open_len;
        let Some(rel) = self.src[body..].find(close) else {
            return self.stop(start);
        };
        let end = body + rel + close.len();
        self.pos = end;
        Some(Tag {
            kind,
            name: "",
            attrs: "",
            self_closing: false,
            start,
            end,
        })
    }

    fn scan_end_tag(&mut self, start: usize) -> Option<Tag<'a>> {
        let name_start = start + 2;
        let name = read_name(&self.src[name_start..]);
        let Some(rel) = self.src[name_start..].find('>') else {
            return self.stop(start);
        };
        let end = name_start + rel + 1;
        self.pos = end;
        Some(Tag {
            kind: TagKind::End,
            name,
            attrs: "",
            self_closing: false,
            start,
            end,
        })
    }

    fn scan_start_tag(&mut self, start: usize, name: &'a str) -> Option<Tag<'a>> {
        let attrs_start = start + 1 + name.len();
        let bytes = self.src.as_bytes();
        let mut quote: Option<u8> = None;
        let mut close = None;
        for (offset, &byte) in bytes[attrs_start..].iter().enumerate() {
            match (quote, byte) {
                (Some(q), b) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(byte),
                (None, b'>') => {
                    close = Some(attrs_start + offset);
                    break;
                }
                (None, _) => {}
            }
        }
        let Some(close) = close else {
            return self.stop(start);
        };

        let inner = self.src[attrs_start..close].trim_end();
        let (attrs, self_closing) = match inner.strip_suffix('/') {
            Some(attrs) => (attrs, true),
            None => (inner, false),
        };
        self.pos = close + 1;
        if !self_closing && is_raw_text_element(name) {
            self.raw_text = Some(name);
        }
        Some(Tag {
            kind: TagKind::Start,
            name,
            attrs,
            self_closing,
            start,
            end: close + 1,
        })
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        if let Some(name) = self.raw_text.take() {
            match find_raw_text_end(self.src, self.pos, name) {
                Some(at) => self.pos = at,
                None => return self.stop(self.pos),
            }
        }

        loop {
            let rel = self.src.get(self.pos..)?.find('<')?;
            let start = self.pos + rel;
            let rest = &self.src[start..];

            if rest.starts_with("<!--") {
                return self.scan_delimited(start, 4, "-->", TagKind::Comment);
            }
            if rest.starts_with("<![CDATA[") {
                return self.scan_delimited(start, 9, "]]>", TagKind::CData);
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                return self.scan_delimited(start, 2, ">", TagKind::Declaration);
            }
            if rest.starts_with("</") {
                return self.scan_end_tag(start);
            }

            let name = read_name(&rest[1..]);
            if name.is_empty() {
                self.stray.get_or_insert(start);
                self.pos = start + 1;
                continue;
            }
            return self.scan_start_tag(start, name);
        }
    }
}

fn read_name(src: &str) -> &str {
    let bytes = src.as_bytes();
    if !bytes
        .first()
        .is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'_' | b':'))
    {
        return "";
    }
    let len = bytes.iter().take_while(|b| is_name_byte(**b)).count();
    &src[..len]
}

const fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b':' | b'-' | b'.')
}

fn is_raw_text_element(name: &str) -> bool {
    name.eq_ignore_ascii_case("style") || name.eq_ignore_ascii_case("script")
}

fn find_raw_text_end(src: &str, from: usize, name: &str) -> Option<usize> {
    let hay = &src[from..];
    let mut search = 0;
    while let Some(rel) = hay[search..].find("</") {
        let at = search + rel;
        let after = &hay.as_bytes()[at + 2..];
        if after.len() >= name.len()
            && after[..name.len()].eq_ignore_ascii_case(name.as_bytes())
            && after.get(name.len()).is_none_or(|b| !is_name_byte(*b))
        {
            return Some(from + at);
        }
        search = at + 2;
    }
    None
}

/// Verify the document is a single, balanced `<svg>` element tree.
///
/// # Errors
///
/// [`SanitizeError::MissingRoot`] when the first element is not `<svg>`;
/// [`SanitizeError::Malformed`] for mismatched, unclosed or unterminated markup.
pub fn check_structure(src: &str) -> Result<(), SanitizeError> {
    let mut scanner = Scanner::new(src);
    let mut stack: Vec<&str> = Vec::new();
    let mut seen_root = false;

    for tag in scanner.by_ref() {
        match tag.kind {
            TagKind::Start => {
                if stack.is_empty() {
                    if seen_root {
                        return Err(malformed(tag.start, format!("<{}> after the root element", tag.name)));
                    }
                    if tag.name != "svg" {
                        return Err(SanitizeError::MissingRoot);
                    }
                    seen_root = true;
                }
                if !tag.self_closing {
                    stack.push(tag.name);
                }
            }
            TagKind::End => match stack.pop() {
                Some(open) if open == tag.name => {}
                Some(open) => {
                    return Err(malformed(
                        tag.start,
                        format!("expected </{open}>, found </{}>", tag.name),
                    ));
                }
                None => {
                    return Err(malformed(tag.start, format!("unexpected </{}>", tag.name)));
                }
            },
            TagKind::Comment | TagKind::Declaration | TagKind::CData => {}
        }
    }

    if let Some(at) = scanner.truncated_at() {
        return Err(malformed(at, "unterminated markup".to_string()));
    }
    if let Some(at) = scanner.stray_at() {
        return Err(malformed(at, "'<' does not start a tag".to_string()));
    }
    if !seen_root {
        return Err(SanitizeError::MissingRoot);
    }
    if let Some(open) = stack.last() {
        return Err(malformed(src.len(), format!("<{open}> is never closed")));
    }
    Ok(())
}

fn malformed(offset: usize, message: String) -> SanitizeError {
    SanitizeError::Malformed { offset, message }
}

/// Re-emit every start tag for which `edit` reports a change.
pub(crate) fn rewrite_start_tags<F>(src: &str, mut edit: F) -> String
where
    F: FnMut(&Tag<'_>, &mut Attributes) -> bool,
{
    let mut out = String::with_capacity(src.len() + src.len() / 8);
    let mut copied = 0;
    for tag in Scanner::new(src) {
        if tag.kind != TagKind::Start {
            continue;
        }
        let mut attrs = Attributes::parse(tag.attrs);
        if !edit(&tag, &mut attrs) {
            continue;
        }
        out.push_str(&src[copied..tag.start]);
        write_start_tag(&mut out, tag.name, &attrs, tag.self_closing);
        copied = tag.end;
    }
    out.push_str(&src[copied..]);
    out
}

pub(crate) fn write_start_tag(out: &mut String, name: &str, attrs: &Attributes, self_closing: bool) {
    out.push('<');
    out.push_str(name);
    out.push_str(&attrs.render());
    if self_closing {
        out.push('/');
    }
    out.push('>');
}

/// Drop every element named in `names` (any case) together with its content.
///
/// An element whose end tag never appears is left in place.
pub(crate) fn remove_elements(src: &str, names: &[&str]) -> String {
    let tags: Vec<Tag<'_>> = Scanner::new(src).collect();
    let mut out = String::with_capacity(src.len());
    let mut copied = 0;
    let mut index = 0;
    while index < tags.len() {
        let tag = tags[index];
        let targeted = tag.kind == TagKind::Start
            && names.iter().any(|name| tag.name.eq_ignore_ascii_case(name));
        if targeted {
            let span = if tag.self_closing {
                Some((tag.end, index))
            } else {
                matching_end(&tags, index)
            };
            if let Some((end, last)) = span {
                out.push_str(&src[copied..tag.start]);
                copied = end;
                index = last + 1;
                continue;
            }
        }
        index += 1;
    }
    out.push_str(&src[copied..]);
    out
}

/// End offset and tag index of the element opened at `tags[open]`.
pub(crate) fn matching_end(tags: &[Tag<'_>], open: usize) -> Option<(usize, usize)> {
    let name = tags[open].name;
    let mut depth = 0_usize;
    for (index, tag) in tags.iter().enumerate().skip(open) {
        match tag.kind {
            TagKind::Start if !tag.self_closing && tag.name.eq_ignore_ascii_case(name) => depth += 1,
            TagKind::End if tag.name.eq_ignore_ascii_case(name) => {
                depth -= 1;
                if depth == 0 {
                    return Some((tag.end, index));
                }
            }
            _ => {}
        }
    }
    None
}
