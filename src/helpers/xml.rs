//! Event-level XML reading shared by the xlsx and ods readers.

use crate::error::FieldSegregatorError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Failures in turning raw XML text into cell content.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntity(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValue(String),
}

/// Buffered quick-xml reader configured for spreadsheet parts.
///
/// One event buffer is reused for the whole part, so an [`Event`] borrowed from
/// [`XmlReader::next`] is only valid until the following call.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Wraps a part stream. Mismatched end tags and malformed comments are tolerated,
    /// and surrounding whitespace is kept because it can be cell text.
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        // <c r="A1"/> must produce a Start/End pair like a regular element
        config.expand_empty_elements = true;
        config.trim_text(false);

        XmlReader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Reads the next event, or `None` at end of document.
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, FieldSegregatorError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(FieldSegregatorError::XmlError(error)),
        }
    }
}

/// Value access for a single attribute such as `r="B7"` or `s="3"`.
pub(crate) trait XmlAttributeHelper<'a> {
    /// Returns the value with entities resolved.
    fn get_value(&self) -> Result<Cow<'a, str>, FieldSegregatorError>;

    /// Parses the value, e.g. a style index or a repeat count.
    fn parse_value<T: FromStr>(&self) -> Result<T, FieldSegregatorError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, FieldSegregatorError> {
        Ok(self.unescape_value()?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, FieldSegregatorError> {
        let value = self.get_value()?;
        value
            .parse()
            .map_err(|_| XmlError::ParseAttributeValue(value.to_string()).into())
    }
}

/// Attribute lookup on a start tag.
pub(crate) trait XmlNodeHelper<'a> {
    /// Looks up an attribute by its qualified name, e.g. `table:name`.
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, FieldSegregatorError>;

    /// `Ok(None)` when the attribute is absent; an error when it is present but does not parse.
    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, FieldSegregatorError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, FieldSegregatorError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, FieldSegregatorError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }
}

/// Accumulates cell text from text and reference events.
pub(crate) trait XmlTextContextHelper {
    /// Appends a run of character data as is.
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), FieldSegregatorError>;

    /// Resolves `&#NN;`, `&#xNN;` and the predefined entities.
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), FieldSegregatorError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), FieldSegregatorError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), FieldSegregatorError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntity(raw.to_string()))?;
        }
        Ok(())
    }
}

/// Drives an [`XmlReader`] until end of document, dispatching each event to the given arms.
/// Unmatched events are ignored; `break` leaves the loop early.
#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
