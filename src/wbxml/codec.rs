//! A minimal WBXML-shaped binary writer/reader.
//!
//! This implements just enough of the token-tagged binary XML encoding
//! (`spec.md` GLOSSARY: "WBXML — A token-tagged binary XML encoding using
//! per-page code tables") to round-trip the handful of documents this crate's
//! driver builds and parses: a code-page switch opcode, tagged elements with
//! an explicit "has content" bit, inline string content, and an explicit END
//! token closing each non-empty element. It is not a conformant general WBXML
//! implementation (no attributes, no string table, no entities) — those are
//! unused by any document in `spec.md` §6.

use anyhow::{bail, Context, Result};
use bytes::{Buf, BufMut, BytesMut};

use super::tags::{CodePage, Tag};

const TOKEN_SWITCH_PAGE: u8 = 0x00;
const TOKEN_END: u8 = 0x01;
const TOKEN_STR_I: u8 = 0x03;
const HAS_CONTENT: u8 = 0x40;

pub struct Writer {
    buf: BytesMut,
    current_page: u8,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            current_page: 0,
        }
    }

    fn switch_page(&mut self, page: CodePage) {
        let page = page as u8;
        if page != self.current_page {
            self.buf.put_u8(TOKEN_SWITCH_PAGE);
            self.buf.put_u8(page);
            self.current_page = page;
        }
    }

    /// Write an element with text content, e.g. `<SyncKey>1</SyncKey>`.
    pub fn text_element(&mut self, tag: Tag, text: &str) {
        self.switch_page(tag.page);
        self.buf.put_u8(tag.token | HAS_CONTENT);
        self.buf.put_u8(TOKEN_STR_I);
        self.buf.put_slice(text.as_bytes());
        self.buf.put_u8(0);
        self.buf.put_u8(TOKEN_END);
    }

    /// Write a self-closing, content-free element, e.g. `<GetChanges/>`.
    pub fn empty_element(&mut self, tag: Tag) {
        self.switch_page(tag.page);
        self.buf.put_u8(tag.token);
    }

    /// Open an element that will contain nested elements; pair with `close`.
    pub fn open(&mut self, tag: Tag) {
        self.switch_page(tag.page);
        self.buf.put_u8(tag.token | HAS_CONTENT);
    }

    pub fn close(&mut self) {
        self.buf.put_u8(TOKEN_END);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed element, identified by `(page, token)` rather than a resolved
/// `Tag` so the reader doesn't need the full reverse-lookup table wired in;
/// callers in `wbxml::documents` match on `(page, token)` against the
/// constants in `wbxml::tags`.
#[derive(Debug, Clone)]
pub enum Node {
    Element {
        page: u8,
        token: u8,
        children: Vec<Node>,
    },
    Text(String),
}

impl Node {
    pub fn is(&self, tag: Tag) -> bool {
        matches!(self, Node::Element { page, token, .. } if *page == tag.page as u8 && *token == tag.token)
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element { children, .. } => children,
            Node::Text(_) => &[],
        }
    }

    pub fn find(&self, tag: Tag) -> Option<&Node> {
        self.children().iter().find(|n| n.is(tag))
    }

    pub fn find_all<'a>(&'a self, tag: Tag) -> impl Iterator<Item = &'a Node> {
        self.children().iter().filter(move |n| n.is(tag))
    }

    pub fn text(&self) -> Option<&str> {
        self.children().iter().find_map(|n| match n {
            Node::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Parses a byte stream into a synthetic root `Node` holding the top-level
/// elements as children, so callers can `root.find(tags::FOLDER_SYNC)`.
pub fn parse(mut data: &[u8]) -> Result<Node> {
    let mut page = 0u8;
    let children = parse_children(&mut data, &mut page)?;
    Ok(Node::Element {
        page: 0,
        token: 0,
        children,
    })
}

fn parse_children(data: &mut &[u8], page: &mut u8) -> Result<Vec<Node>> {
    let mut out = Vec::new();
    loop {
        if data.is_empty() {
            return Ok(out);
        }
        let token = data[0];
        if token == TOKEN_END {
            data.advance(1);
            return Ok(out);
        }
        if token == TOKEN_SWITCH_PAGE {
            if data.len() < 2 {
                bail!("truncated WBXML: switch page missing operand");
            }
            *page = data[1];
            data.advance(2);
            continue;
        }
        data.advance(1);
        let has_content = token & HAS_CONTENT != 0;
        let tag_token = token & !HAS_CONTENT;

        if !has_content {
            out.push(Node::Element {
                page: *page,
                token: tag_token,
                children: Vec::new(),
            });
            continue;
        }

        // Content follows: either nested elements, or a single STR_I text run
        // (this subset never mixes the two, matching every document this
        // crate emits).
        if data.first() == Some(&TOKEN_STR_I) {
            data.advance(1);
            let text = read_cstr(data).context("reading inline string content")?;
            out.push(Node::Element {
                page: *page,
                token: tag_token,
                children: vec![Node::Text(text)],
            });
            // consume trailing END for this element
            if data.first() == Some(&TOKEN_END) {
                data.advance(1);
            }
        } else {
            let mut child_page = *page;
            let children = parse_children(data, &mut child_page)?;
            out.push(Node::Element {
                page: *page,
                token: tag_token,
                children,
            });
        }
    }
}

fn read_cstr(data: &mut &[u8]) -> Result<String> {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .context("unterminated string in WBXML stream")?;
    let s = String::from_utf8(data[..end].to_vec()).context("invalid UTF-8 in WBXML string")?;
    data.advance(end + 1);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wbxml::tags::*;

    #[test]
    fn round_trips_nested_elements_and_text() {
        let mut w = Writer::new();
        w.open(FOLDER_SYNC);
        w.text_element(FOLDER_SYNC_KEY, "42");
        w.close();

        let root = parse(&w.finish()).unwrap();
        let folder_sync = root.find(FOLDER_SYNC).expect("FolderSync present");
        let key = folder_sync.find(FOLDER_SYNC_KEY).expect("SyncKey present");
        assert_eq!(key.text(), Some("42"));
    }

    #[test]
    fn empty_elements_have_no_children() {
        let mut w = Writer::new();
        w.open(SYNC);
        w.empty_element(GET_CHANGES);
        w.close();

        let root = parse(&w.finish()).unwrap();
        let sync = root.find(SYNC).unwrap();
        let gc = sync.find(GET_CHANGES).unwrap();
        assert!(gc.children().is_empty());
    }

    #[test]
    fn switches_pages_only_when_needed() {
        let mut w = Writer::new();
        w.open(FOLDER_SYNC); // Folder page
        w.text_element(FOLDER_SYNC_KEY, "0"); // same page, no switch
        w.close();
        let bytes = w.finish();
        // No SWITCH_PAGE byte should appear since both tags are on the Folder page.
        assert!(!bytes.contains(&TOKEN_SWITCH_PAGE));
    }
}
