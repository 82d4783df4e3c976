// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request builders for `CardDAV` operations.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::CardDavError;
use crate::filter::Filter;
use crate::types::Href;
use crate::xml::{PropName, ns};

pub(crate) type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// vCard properties every partial `address-data` request must include.
const MANDATORY_VCARD_PROPS: [&str; 5] = ["BEGIN", "END", "FN", "VERSION", "UID"];

fn new_writer() -> XmlWriter {
    Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
}

fn root_element(name: &str) -> BytesStart<'_> {
    let mut root = BytesStart::new(name);
    root.push_attribute(("xmlns:D", ns::DAV));
    root.push_attribute(("xmlns:C", ns::CARDDAV));
    root.push_attribute(("xmlns:CS", ns::CS));
    root
}

fn finish(writer: XmlWriter) -> Result<String, CardDavError> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| CardDavError::Xml(format!("UTF-8 error: {e}")))
}

fn write_text_element(
    writer: &mut XmlWriter,
    name: &str,
    text: &str,
) -> Result<(), CardDavError> {
    if text.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(name)))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new(name)))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}

fn write_empty_prop(writer: &mut XmlWriter, prop: PropName) -> Result<(), CardDavError> {
    let name = format!("{}:{}", ns::prefix(prop.namespace()), prop.local_name());
    writer.write_event(Event::Empty(BytesStart::new(name)))?;
    Ok(())
}

/// `<D:prop><D:getetag/><C:address-data>...</C:address-data></D:prop>`
fn write_etag_and_address_data(
    writer: &mut XmlWriter,
    vcard_props: &[String],
) -> Result<(), CardDavError> {
    writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
    write_empty_prop(writer, PropName::GetETag)?;

    if vcard_props.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("C:address-data")))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new("C:address-data")))?;
        for prop in with_mandatory_props(vcard_props) {
            let mut elem = BytesStart::new("C:prop");
            elem.push_attribute(("name", prop.as_str()));
            writer.write_event(Event::Empty(elem))?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:address-data")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
    Ok(())
}

/// Adds the mandatory vCard properties to a non-empty selection.
fn with_mandatory_props(props: &[String]) -> Vec<String> {
    let mut all: Vec<String> = Vec::with_capacity(props.len() + MANDATORY_VCARD_PROPS.len());
    for prop in props
        .iter()
        .map(String::as_str)
        .chain(MANDATORY_VCARD_PROPS)
    {
        let prop = prop.to_ascii_uppercase();
        if !all.contains(&prop) {
            all.push(prop);
        }
    }
    all
}

/// PROPFIND request builder.
#[derive(Debug, Default)]
pub struct PropFindRequest {
    props: Vec<PropName>,
}

impl PropFindRequest {
    /// Creates a new PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Creates a request for the given properties.
    #[must_use]
    pub fn with_properties(props: &[PropName]) -> Self {
        Self {
            props: props.to_vec(),
        }
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: PropName) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = new_writer();

        writer.write_event(Event::Start(root_element("D:propfind")))?;
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        for prop in &self.props {
            write_empty_prop(&mut writer, *prop)?;
        }
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
        writer.write_event(Event::End(BytesEnd::new("D:propfind")))?;

        finish(writer)
    }
}

/// `sync-collection` REPORT builder (RFC 6578).
#[derive(Debug)]
pub struct SyncCollectionRequest {
    sync_token: String,
    sync_level: u32,
}

impl SyncCollectionRequest {
    /// Creates a request starting from `sync_token`; an empty token asks for
    /// a full synchronization.
    #[must_use]
    pub fn new(sync_token: impl Into<String>) -> Self {
        Self {
            sync_token: sync_token.into(),
            sync_level: 1,
        }
    }

    /// Sets the sync level.
    #[must_use]
    pub const fn sync_level(mut self, level: u32) -> Self {
        self.sync_level = level;
        self
    }

    /// Builds the XML body for the REPORT.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = new_writer();

        writer.write_event(Event::Start(root_element("D:sync-collection")))?;
        write_text_element(&mut writer, "D:sync-token", &self.sync_token)?;
        write_text_element(&mut writer, "D:sync-level", &self.sync_level.to_string())?;
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        write_empty_prop(&mut writer, PropName::GetETag)?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
        writer.write_event(Event::End(BytesEnd::new("D:sync-collection")))?;

        finish(writer)
    }
}

/// `addressbook-multiget` REPORT builder.
#[derive(Debug, Default)]
pub struct AddressbookMultiGetRequest {
    hrefs: Vec<Href>,
    vcard_props: Vec<String>,
}

impl AddressbookMultiGetRequest {
    /// Creates a new multiget request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an href to the request.
    pub fn add_href(&mut self, href: Href) -> &mut Self {
        self.hrefs.push(href);
        self
    }

    /// Restricts the returned vCard to the given properties. The properties
    /// needed for a valid card are added automatically.
    #[must_use]
    pub fn vcard_properties(mut self, props: &[String]) -> Self {
        self.vcard_props = props.to_vec();
        self
    }

    /// Builds the XML body for the REPORT.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = new_writer();

        writer.write_event(Event::Start(root_element("C:addressbook-multiget")))?;
        write_etag_and_address_data(&mut writer, &self.vcard_props)?;
        for href in &self.hrefs {
            write_text_element(&mut writer, "D:href", href.as_str())?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:addressbook-multiget")))?;

        finish(writer)
    }
}

/// `addressbook-query` REPORT builder.
#[derive(Debug)]
pub struct AddressbookQueryRequest<'a> {
    filter: &'a Filter,
    vcard_props: Vec<String>,
    limit: Option<u32>,
}

impl<'a> AddressbookQueryRequest<'a> {
    /// Creates a query for cards matching `filter`.
    #[must_use]
    pub const fn new(filter: &'a Filter) -> Self {
        Self {
            filter,
            vcard_props: Vec::new(),
            limit: None,
        }
    }

    /// Restricts the returned vCard to the given properties.
    #[must_use]
    pub fn vcard_properties(mut self, props: &[String]) -> Self {
        self.vcard_props = props.to_vec();
        self
    }

    /// Asks the server to return at most `limit` results.
    #[must_use]
    pub const fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Builds the XML body for the REPORT.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = new_writer();

        writer.write_event(Event::Start(root_element("C:addressbook-query")))?;
        write_etag_and_address_data(&mut writer, &self.vcard_props)?;
        self.filter.write_xml(&mut writer)?;
        if let Some(limit) = self.limit {
            writer.write_event(Event::Start(BytesStart::new("C:limit")))?;
            write_text_element(&mut writer, "C:nresults", &limit.to_string())?;
            writer.write_event(Event::End(BytesEnd::new("C:limit")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:addressbook-query")))?;

        finish(writer)
    }
}
