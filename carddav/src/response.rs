// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsers for WebDAV/CardDAV operations.

use reqwest::StatusCode;
use url::Url;

use crate::error::CardDavError;
use crate::http::DavResponse;
use crate::types::Href;
use crate::xml::{Element, ResourceProperties, ns};

/// `WebDAV` multistatus response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// The response entries in document order.
    pub responses: Vec<ResponseItem>,
    /// Top-level `sync-token` of a `sync-collection` report.
    pub sync_token: Option<String>,
}

/// Individual response in multistatus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseItem {
    /// One or more resources sharing a single status, used to signal
    /// deletions and truncation.
    Status {
        /// Absolute URLs of the resources.
        urls: Vec<Url>,
        /// The raw status line.
        status: String,
    },
    /// Properties of one resource grouped by status.
    PropStat {
        /// Absolute URL of the resource.
        url: Url,
        /// Property groups in document order.
        prop_stats: Vec<PropStat>,
    },
}

/// Property group with its status. Properties are only decoded for
/// successful groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropStat {
    /// The raw status line.
    pub status: String,
    /// The decoded properties.
    pub props: ResourceProperties,
}

impl PropStat {
    /// Whether the group has a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        parse_status_line(&self.status).is_some_and(|s| s.is_success())
    }
}

/// Parses the code out of `HTTP/1.1 404 Not Found`.
#[must_use]
pub fn parse_status_line(line: &str) -> Option<StatusCode> {
    let code = line.split_whitespace().nth(1)?;
    code.parse::<u16>()
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
}

impl ResponseItem {
    fn from_element(response: &Element, base: &Url) -> Option<Self> {
        let urls: Vec<Url> = response
            .children_named(ns::DAV, "href")
            .filter_map(|href| match base.join(href.text.trim()) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(href = %href.text, err = %e, "skipping unresolvable href");
                    None
                }
            })
            .collect();

        if let Some(status) = response.child(ns::DAV, "status") {
            return Some(Self::Status {
                urls,
                status: status.text.trim().to_string(),
            });
        }

        let url = urls.into_iter().next()?;
        let prop_stats = response
            .children_named(ns::DAV, "propstat")
            .map(|propstat| {
                let status = propstat
                    .child(ns::DAV, "status")
                    .map(|s| s.text.trim().to_string())
                    .unwrap_or_default();
                let mut prop_stat = PropStat {
                    status,
                    props: ResourceProperties::default(),
                };
                if prop_stat.is_success() {
                    for prop in propstat.children_named(ns::DAV, "prop") {
                        prop_stat.props.extend(ResourceProperties::from_prop(prop, base));
                    }
                }
                prop_stat
            })
            .collect();

        Some(Self::PropStat { url, prop_stats })
    }

    /// The status code of a status entry.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => parse_status_line(status),
            Self::PropStat { .. } => None,
        }
    }

    /// Properties of all successful groups of a propstat entry, merged.
    #[must_use]
    pub fn successful_props(&self) -> Option<ResourceProperties> {
        let Self::PropStat { prop_stats, .. } = self else {
            return None;
        };
        let mut merged: Option<ResourceProperties> = None;
        for prop_stat in prop_stats.iter().filter(|p| p.is_success()) {
            merged
                .get_or_insert_with(ResourceProperties::default)
                .extend(prop_stat.props.clone());
        }
        merged
    }
}

impl MultiStatusResponse {
    /// Parses a multistatus document; relative hrefs are resolved against
    /// `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the XML is malformed or the root element is not
    /// `DAV:multistatus`.
    pub fn from_xml(xml: &str, base: &Url) -> Result<Self, CardDavError> {
        Self::from_element(&Element::parse(xml)?, base)
    }

    /// Interprets an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns an error if the root element is not `DAV:multistatus`.
    pub fn from_element(root: &Element, base: &Url) -> Result<Self, CardDavError> {
        if !root.is(ns::DAV, "multistatus") {
            return Err(CardDavError::Xml(format!(
                "Expected {{DAV:}}multistatus, got {}",
                root.name
            )));
        }

        let responses = root
            .children_named(ns::DAV, "response")
            .filter_map(|r| ResponseItem::from_element(r, base))
            .collect();
        let sync_token = root
            .child(ns::DAV, "sync-token")
            .map(|t| t.text.trim().to_string());

        Ok(Self {
            responses,
            sync_token,
        })
    }

    /// Successful properties per resource, in document order.
    pub fn resources(&self) -> impl Iterator<Item = (&Url, ResourceProperties)> + '_ {
        self.responses.iter().filter_map(|r| match r {
            ResponseItem::PropStat { url, .. } => r.successful_props().map(|p| (url, p)),
            ResponseItem::Status { .. } => None,
        })
    }

    /// Successful properties of the resource at `url`.
    #[must_use]
    pub fn props_for(&self, url: &Url) -> Option<ResourceProperties> {
        let wanted = Href::from_url(url);
        self.resources()
            .find(|(u, _)| Href::from_url(u).same_resource(&wanted))
            .map(|(_, p)| p)
    }
}

fn check_xml(resp: &DavResponse) -> Result<(), CardDavError> {
    if resp.is_xml() {
        Ok(())
    } else {
        Err(CardDavError::Protocol(format!(
            "Expected an XML response from {}, got content type {:?}",
            resp.url,
            resp.content_type()
        )))
    }
}

fn parse_logged(resp: &DavResponse) -> Result<Element, CardDavError> {
    Element::parse(&resp.body).inspect_err(|e| {
        tracing::warn!(url = %resp.url, err = %e, "failed to parse XML response");
    })
}

/// Parses the body of a `207 Multi-Status` response.
///
/// # Errors
///
/// Returns [`CardDavError::Protocol`] if the status is not 207 or the body is
/// not XML, and [`CardDavError::Xml`] if it cannot be parsed.
pub fn parse_multistatus(resp: &DavResponse) -> Result<MultiStatusResponse, CardDavError> {
    if resp.status != StatusCode::MULTI_STATUS {
        return Err(CardDavError::Protocol(format!(
            "Expected 207 Multi-Status from {}, got {}",
            resp.url, resp.status
        )));
    }
    check_xml(resp)?;
    MultiStatusResponse::from_element(&parse_logged(resp)?, &resp.url)
}

/// Parses the body of any successful XML response.
///
/// # Errors
///
/// Returns [`CardDavError::Protocol`] if the status is not 2xx or the body is
/// not XML, and [`CardDavError::Xml`] if it cannot be parsed.
pub fn check_and_parse_single_doc(resp: &DavResponse) -> Result<Element, CardDavError> {
    if !resp.status.is_success() {
        return Err(CardDavError::Protocol(format!(
            "Unexpected status {} from {}",
            resp.status, resp.url
        )));
    }
    check_xml(resp)?;
    parse_logged(resp)
}
