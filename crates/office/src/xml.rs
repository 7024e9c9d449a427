//! Thin event-writing wrapper over `quick_xml::Writer`.

use crate::error::{Result, SerializationError};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

fn xml_error(err: impl std::fmt::Display) -> SerializationError {
    SerializationError::Xml(err.to_string())
}

pub(crate) struct XmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl XmlBuilder {
    /// A document fragment without an XML declaration.
    pub fn fragment() -> Self {
        Self { writer: Writer::new(Vec::new()) }
    }

    pub fn document() -> Result<Self> {
        let mut builder = Self::fragment();
        builder
            .writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        Ok(builder)
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(element)).map_err(xml_error)
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name))).map_err(xml_error)
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(element)).map_err(xml_error)
    }

    /// Escaped character data.
    pub fn text(&mut self, text: &str) -> Result<()> {
        self.writer.write_event(Event::Text(BytesText::new(text))).map_err(xml_error)
    }

    /// Splices an already-written fragment in place.
    pub fn raw(&mut self, fragment: &[u8]) {
        self.writer.get_mut().extend_from_slice(fragment);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}
