// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! XML utilities for WebDAV/CardDAV processing.
//!
//! Responses are read into a small namespace-resolved element tree; the
//! properties a client cares about are then decoded from it through a fixed
//! table keyed by [`PropName`].

use std::collections::HashMap;
use std::fmt;

use quick_xml::NsReader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use url::Url;

use crate::error::CardDavError;
use crate::types::AddressDataType;

/// XML namespaces used in `CardDAV`.
pub mod ns {
    /// `WebDAV` namespace.
    pub const DAV: &str = "DAV:";

    /// `CardDAV` namespace.
    pub const CARDDAV: &str = "urn:ietf:params:xml:ns:carddav";

    /// Calendar server extensions (`getctag`).
    pub const CS: &str = "http://calendarserver.org/ns/";

    /// Prefix used for `namespace` in request bodies.
    pub(crate) fn prefix(namespace: &str) -> &'static str {
        match namespace {
            CARDDAV => "C",
            CS => "CS",
            _ => "D",
        }
    }
}

/// A namespace-qualified XML element name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    namespace: String,
    local: String,
}

impl QName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// The namespace URI, empty for unqualified names.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The local part of the name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local
    }

    /// Whether this name equals `{namespace}local`.
    #[must_use]
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace == namespace && self.local == local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

/// Properties the client requests and decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropName {
    /// `DAV:displayname`.
    DisplayName,
    /// `DAV:resourcetype`.
    ResourceType,
    /// `DAV:getetag`.
    GetETag,
    /// `DAV:getcontenttype`.
    GetContentType,
    /// `DAV:sync-token`.
    SyncToken,
    /// `DAV:current-user-principal`.
    CurrentUserPrincipal,
    /// `DAV:supported-report-set`.
    SupportedReportSet,
    /// `CARDDAV:addressbook-home-set`.
    AddressbookHomeSet,
    /// `CARDDAV:addressbook-description`.
    AddressbookDescription,
    /// `CARDDAV:supported-address-data`.
    SupportedAddressData,
    /// `CARDDAV:max-resource-size`.
    MaxResourceSize,
    /// `CARDDAV:address-data`.
    AddressData,
    /// `CS:getctag`.
    GetCTag,
}

type Decoder = fn(&Element, &Url) -> Option<PropValue>;

impl PropName {
    const ALL: [Self; 13] = [
        Self::DisplayName,
        Self::ResourceType,
        Self::GetETag,
        Self::GetContentType,
        Self::SyncToken,
        Self::CurrentUserPrincipal,
        Self::SupportedReportSet,
        Self::AddressbookHomeSet,
        Self::AddressbookDescription,
        Self::SupportedAddressData,
        Self::MaxResourceSize,
        Self::AddressData,
        Self::GetCTag,
    ];

    /// Namespace URI of the property.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::DisplayName
            | Self::ResourceType
            | Self::GetETag
            | Self::GetContentType
            | Self::SyncToken
            | Self::CurrentUserPrincipal
            | Self::SupportedReportSet => ns::DAV,
            Self::AddressbookHomeSet
            | Self::AddressbookDescription
            | Self::SupportedAddressData
            | Self::MaxResourceSize
            | Self::AddressData => ns::CARDDAV,
            Self::GetCTag => ns::CS,
        }
    }

    /// Local element name of the property.
    #[must_use]
    pub const fn local_name(self) -> &'static str {
        match self {
            Self::DisplayName => "displayname",
            Self::ResourceType => "resourcetype",
            Self::GetETag => "getetag",
            Self::GetContentType => "getcontenttype",
            Self::SyncToken => "sync-token",
            Self::CurrentUserPrincipal => "current-user-principal",
            Self::SupportedReportSet => "supported-report-set",
            Self::AddressbookHomeSet => "addressbook-home-set",
            Self::AddressbookDescription => "addressbook-description",
            Self::SupportedAddressData => "supported-address-data",
            Self::MaxResourceSize => "max-resource-size",
            Self::AddressData => "address-data",
            Self::GetCTag => "getctag",
        }
    }

    /// Looks up a known property by its qualified name.
    #[must_use]
    pub fn from_qname(name: &QName) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| name.is(p.namespace(), p.local_name()))
    }

    /// The qualified name of the property.
    #[must_use]
    pub fn qname(self) -> QName {
        QName::new(self.namespace(), self.local_name())
    }

    const fn decoder(self) -> Decoder {
        match self {
            Self::CurrentUserPrincipal => decode_href,
            Self::AddressbookHomeSet => decode_hrefs,
            Self::ResourceType => decode_child_names,
            Self::SupportedReportSet => decode_report_set,
            Self::SupportedAddressData => decode_address_data_types,
            Self::DisplayName
            | Self::GetETag
            | Self::GetContentType
            | Self::SyncToken
            | Self::AddressbookDescription
            | Self::MaxResourceSize
            | Self::AddressData
            | Self::GetCTag => decode_text,
        }
    }

    /// Decodes the property element; `base` resolves relative hrefs.
    #[must_use]
    pub fn decode(self, element: &Element, base: &Url) -> Option<PropValue> {
        (self.decoder())(element, base)
    }
}

/// A decoded property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    /// Element text.
    Text(String),
    /// A single href, resolved to an absolute URL.
    Href(Url),
    /// Several hrefs, resolved to absolute URLs.
    Hrefs(Vec<Url>),
    /// Qualified names, e.g. resource types or reports.
    Names(Vec<QName>),
    /// Entries of `supported-address-data`.
    AddressDataTypes(Vec<AddressDataType>),
}

fn decode_text(element: &Element, _base: &Url) -> Option<PropValue> {
    Some(PropValue::Text(element.text.clone()))
}

fn resolve_href(text: &str, base: &Url) -> Option<Url> {
    match base.join(text.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(href = text, %base, err = %e, "ignoring unresolvable href");
            None
        }
    }
}

fn decode_href(element: &Element, base: &Url) -> Option<PropValue> {
    element
        .child(ns::DAV, "href")
        .and_then(|href| resolve_href(&href.text, base))
        .map(PropValue::Href)
}

fn decode_hrefs(element: &Element, base: &Url) -> Option<PropValue> {
    let urls: Vec<_> = element
        .children_named(ns::DAV, "href")
        .filter_map(|href| resolve_href(&href.text, base))
        .collect();
    Some(PropValue::Hrefs(urls))
}

fn decode_child_names(element: &Element, _base: &Url) -> Option<PropValue> {
    let names = element.children.iter().map(|c| c.name.clone()).collect();
    Some(PropValue::Names(names))
}

// <supported-report><report><C:addressbook-multiget/></report></supported-report>
fn decode_report_set(element: &Element, _base: &Url) -> Option<PropValue> {
    let names = element
        .children
        .iter()
        .flat_map(|supported| supported.children.iter())
        .flat_map(|report| report.children.iter())
        .map(|name| name.name.clone())
        .collect();
    Some(PropValue::Names(names))
}

fn decode_address_data_types(element: &Element, _base: &Url) -> Option<PropValue> {
    let types = element
        .children_named(ns::CARDDAV, "address-data-type")
        .filter_map(|t| {
            let content_type = t.attribute("content-type")?;
            Some(AddressDataType {
                content_type: content_type.to_string(),
                version: t.attribute("version").map(str::to_string),
            })
        })
        .collect();
    Some(PropValue::AddressDataTypes(types))
}

/// Decoded properties of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceProperties(HashMap<PropName, PropValue>);

impl ResourceProperties {
    /// Decodes all known properties found below a `DAV:prop` element.
    #[must_use]
    pub fn from_prop(prop: &Element, base: &Url) -> Self {
        let mut props = HashMap::new();
        for child in &prop.children {
            let Some(name) = PropName::from_qname(&child.name) else {
                tracing::trace!(name = %child.name, "ignoring unknown property");
                continue;
            };
            if let Some(value) = name.decode(child, base) {
                props.insert(name, value);
            }
        }
        Self(props)
    }

    /// Returns the raw decoded value.
    #[must_use]
    pub fn get(&self, name: PropName) -> Option<&PropValue> {
        self.0.get(&name)
    }

    /// Inserts a decoded value.
    pub fn insert(&mut self, name: PropName, value: PropValue) {
        self.0.insert(name, value);
    }

    /// Returns a text property, trimmed.
    #[must_use]
    pub fn text(&self, name: PropName) -> Option<&str> {
        match self.0.get(&name)? {
            PropValue::Text(s) => Some(s.trim()),
            _ => None,
        }
    }

    /// Returns a text property without trimming.
    #[must_use]
    pub fn raw_text(&self, name: PropName) -> Option<&str> {
        match self.0.get(&name)? {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a single-href property.
    #[must_use]
    pub fn href(&self, name: PropName) -> Option<&Url> {
        match self.0.get(&name)? {
            PropValue::Href(url) => Some(url),
            PropValue::Hrefs(urls) => urls.first(),
            _ => None,
        }
    }

    /// Returns a multi-href property.
    #[must_use]
    pub fn hrefs(&self, name: PropName) -> &[Url] {
        match self.0.get(&name) {
            Some(PropValue::Hrefs(urls)) => urls,
            Some(PropValue::Href(url)) => std::slice::from_ref(url),
            _ => &[],
        }
    }

    /// Returns a list-of-names property.
    #[must_use]
    pub fn names(&self, name: PropName) -> &[QName] {
        match self.0.get(&name) {
            Some(PropValue::Names(names)) => names,
            _ => &[],
        }
    }

    /// Returns the `supported-address-data` entries.
    #[must_use]
    pub fn address_data_types(&self) -> &[AddressDataType] {
        match self.0.get(&PropName::SupportedAddressData) {
            Some(PropValue::AddressDataTypes(types)) => types,
            _ => &[],
        }
    }

    /// Whether `resourcetype` lists `{namespace}local`.
    #[must_use]
    pub fn has_resource_type(&self, namespace: &str, local: &str) -> bool {
        self.names(PropName::ResourceType)
            .iter()
            .any(|n| n.is(namespace, local))
    }

    /// Number of decoded properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no property was decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds all properties of `other`, overwriting duplicates.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

/// A parsed XML element with resolved namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified element name.
    pub name: QName,
    /// Attributes by local name, namespace declarations excluded.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Concatenated text content directly inside this element.
    pub text: String,
}

impl Element {
    /// Parses a complete document and returns its root element.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Xml`] if the document is not well-formed.
    pub fn parse(xml: &str) -> Result<Self, CardDavError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().check_end_names = true;

        let mut stack: Vec<Self> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_resolved_event()? {
                (ns, Event::Start(e)) => stack.push(Self::open(&ns, &e)?),
                (ns, Event::Empty(e)) => {
                    let element = Self::open(&ns, &e)?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                (_, Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| CardDavError::Xml("Unbalanced end tag".to_string()))?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                (_, Event::Text(e)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&decode_text_bytes(&e)?);
                    }
                }
                (_, Event::CData(e)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                (_, Event::GeneralRef(e)) => {
                    if let Some(top) = stack.last_mut() {
                        match e.resolve_char_ref() {
                            Ok(Some(ch)) => top.text.push(ch),
                            _ => {
                                let name = String::from_utf8_lossy(&e);
                                let resolved = resolve_predefined_entity(&name).ok_or_else(
                                    || CardDavError::Xml(format!("Unknown entity: &{name};")),
                                )?;
                                top.text.push_str(resolved);
                            }
                        }
                    }
                }
                (_, Event::Eof) => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(CardDavError::Xml("Unexpected EOF".to_string()));
        }
        root.ok_or_else(|| CardDavError::Xml("Document has no root element".to_string()))
    }

    fn open(ns: &ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Self, CardDavError> {
        let namespace = match ns {
            ResolveResult::Bound(Namespace(uri)) => String::from_utf8_lossy(uri).into_owned(),
            _ => String::new(),
        };
        let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| CardDavError::Xml(e.to_string()))?;
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| CardDavError::Xml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name: QName::new(namespace, local),
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn attach(
        stack: &mut [Self],
        root: &mut Option<Self>,
        element: Self,
    ) -> Result<(), CardDavError> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
        } else if root.is_none() {
            *root = Some(element);
        } else {
            return Err(CardDavError::Xml("Multiple root elements".to_string()));
        }
        Ok(())
    }

    /// Whether this element is `{namespace}local`.
    #[must_use]
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.name.is(namespace, local)
    }

    /// First child named `{namespace}local`.
    #[must_use]
    pub fn child(&self, namespace: &str, local: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.is(namespace, local))
    }

    /// All children named `{namespace}local`.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, local))
    }

    /// Value of the attribute with the given local name.
    #[must_use]
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == local)
            .map(|(_, v)| v.as_str())
    }
}

fn decode_text_bytes(raw: &[u8]) -> Result<String, CardDavError> {
    match std::str::from_utf8(raw) {
        Ok(s) => Ok(unescape(s)
            .map_err(|e| CardDavError::Xml(format!("XML decode error: {e}")))?
            .into_owned()),
        Err(_) => Ok(String::from_utf8_lossy(raw).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://dav.example.com/abooks/user/").unwrap()
    }

    #[test]
    fn element_resolves_prefixes_and_default_namespace() {
        let xml = r#"<multistatus xmlns="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <response><href>/a/</href><card:addressbook/></response>
</multistatus>"#;
        let root = Element::parse(xml).unwrap();
        assert!(root.is(ns::DAV, "multistatus"));
        let response = root.child(ns::DAV, "response").unwrap();
        assert_eq!(response.child(ns::DAV, "href").unwrap().text, "/a/");
        assert!(response.child(ns::CARDDAV, "addressbook").is_some());
    }

    #[test]
    fn element_decodes_entities_in_text() {
        let root = Element::parse("<D:x xmlns:D=\"DAV:\">Tom &amp; Jerry &#65;</D:x>").unwrap();
        assert_eq!(root.text, "Tom & Jerry A");
    }

    #[test]
    fn element_rejects_unbalanced_documents() {
        assert!(Element::parse("<D:a xmlns:D=\"DAV:\"><D:b></D:a>").is_err());
        assert!(Element::parse("<D:a xmlns:D=\"DAV:\">").is_err());
        assert!(Element::parse("").is_err());
    }

    #[test]
    fn href_decoder_resolves_against_base() {
        let xml = r#"<D:current-user-principal xmlns:D="DAV:"><D:href>../../principals/user/</D:href></D:current-user-principal>"#;
        let element = Element::parse(xml).unwrap();
        let value = PropName::CurrentUserPrincipal.decode(&element, &base());
        assert_eq!(
            value,
            Some(PropValue::Href(
                Url::parse("https://dav.example.com/principals/user/").unwrap()
            ))
        );
    }

    #[test]
    fn report_set_decoder_collects_report_names() {
        let xml = r#"<D:supported-report-set xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:supported-report><D:report><C:addressbook-multiget/></D:report></D:supported-report>
  <D:supported-report><D:report><D:sync-collection/></D:report></D:supported-report>
</D:supported-report-set>"#;
        let element = Element::parse(xml).unwrap();
        let Some(PropValue::Names(names)) = PropName::SupportedReportSet.decode(&element, &base())
        else {
            panic!("expected names");
        };
        assert_eq!(
            names,
            vec![
                QName::new(ns::CARDDAV, "addressbook-multiget"),
                QName::new(ns::DAV, "sync-collection"),
            ]
        );
    }

    #[test]
    fn address_data_decoder_reads_attributes() {
        let xml = r#"<C:supported-address-data xmlns:C="urn:ietf:params:xml:ns:carddav">
  <C:address-data-type content-type="text/vcard" version="3.0"/>
  <C:address-data-type content-type="text/vcard"/>
</C:supported-address-data>"#;
        let element = Element::parse(xml).unwrap();
        let Some(PropValue::AddressDataTypes(types)) =
            PropName::SupportedAddressData.decode(&element, &base())
        else {
            panic!("expected address data types");
        };
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].version.as_deref(), Some("3.0"));
        assert_eq!(types[1].version, None);
    }

    #[test]
    fn unknown_properties_are_ignored() {
        let xml = r#"<D:prop xmlns:D="DAV:" xmlns:X="urn:x"><X:color>red</X:color><D:getetag>"1"</D:getetag></D:prop>"#;
        let prop = Element::parse(xml).unwrap();
        let props = ResourceProperties::from_prop(&prop, &base());
        assert_eq!(props.len(), 1);
        assert_eq!(props.text(PropName::GetETag), Some("\"1\""));
    }

    #[test]
    fn qname_displays_in_clark_notation() {
        assert_eq!(
            PropName::GetCTag.qname().to_string(),
            "{http://calendarserver.org/ns/}getctag"
        );
    }
}
