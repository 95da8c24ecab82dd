//! Canonical XML writer.
//!
//! Output is already in C14N form: no XML declaration, no self-closing
//! elements, no insignificant whitespace, text escaped for `&`, `<` and `>`
//! only. Callers pass attributes in canonical order (namespace first, then
//! attributes sorted by name).

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use domain::event::normalize_text;

use super::{XmlError, XmlResult};

pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    fn write(&mut self, event: Event<'_>) -> XmlResult<()> {
        self.inner
            .write_event(event)
            .map_err(|e| XmlError::Write(e.to_string()))
    }

    pub fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> XmlResult<()> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.write(Event::Start(start))
    }

    pub fn close(&mut self, name: &str) -> XmlResult<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    /// `<name attrs>body</name>`
    pub fn group<F>(&mut self, name: &str, attrs: &[(&str, &str)], body: F) -> XmlResult<()>
    where
        F: FnOnce(&mut Self) -> XmlResult<()>,
    {
        self.open(name, attrs)?;
        body(self)?;
        self.close(name)
    }

    /// Element with text content; whitespace is collapsed.
    pub fn leaf(&mut self, name: &str, value: impl AsRef<str>) -> XmlResult<()> {
        let text = normalize_text(value.as_ref());
        self.open(name, &[])?;
        if !text.is_empty() {
            self.write(Event::Text(BytesText::from_escaped(partial_escape(text.as_str()))))?;
        }
        self.close(name)
    }

    /// Element with text content, written verbatim (base64, digests).
    pub fn leaf_exact(&mut self, name: &str, value: &str) -> XmlResult<()> {
        self.open(name, &[])?;
        self.write(Event::Text(BytesText::from_escaped(partial_escape(value))))?;
        self.close(name)
    }

    pub fn opt_leaf<S: AsRef<str>>(&mut self, name: &str, value: Option<S>) -> XmlResult<()> {
        match value {
            Some(v) => self.leaf(name, v),
            None => Ok(()),
        }
    }

    /// Append an already canonical fragment.
    pub fn raw(&mut self, fragment: &str) {
        self.inner.get_mut().extend_from_slice(fragment.as_bytes());
    }

    pub fn finish(self) -> XmlResult<String> {
        String::from_utf8(self.inner.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }
}
