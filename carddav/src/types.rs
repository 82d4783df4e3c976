// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::ops::Deref;

use url::Url;

/// Address object href (server path).
///
/// A `Href` identifies a resource by its path on the `CardDAV` server,
/// such as `/addressbooks/user/default/card1.vcf`. Hrefs returned by the
/// server are resolved against the request URL first, so relative and
/// absolute forms map to the same `Href`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Href(String);

impl Href {
    /// Wraps a server path.
    #[must_use]
    pub const fn new(href: String) -> Self {
        Self(href)
    }

    /// Creates a `Href` from the path of an absolute URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self(url.path().to_string())
    }

    /// The raw value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether both hrefs name the same resource, ignoring a trailing slash.
    #[must_use]
    pub fn same_resource(&self, other: &Self) -> bool {
        self.0.trim_end_matches('/') == other.0.trim_end_matches('/')
    }
}

impl Deref for Href {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Href {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Href {
    fn from(href: String) -> Self {
        Self(href)
    }
}

impl From<&str> for Href {
    fn from(href: &str) -> Self {
        Self(href.to_string())
    }
}

/// An HTTP entity tag. Compared byte for byte to detect changed cards and
/// sent in `If-Match` on updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    /// Wraps an entity tag as sent by the server, quotes included.
    #[must_use]
    pub const fn new(etag: String) -> Self {
        Self(etag)
    }

    /// The raw value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ETag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ETag {
    fn from(etag: String) -> Self {
        Self(etag)
    }
}

impl From<&str> for ETag {
    fn from(etag: &str) -> Self {
        Self(etag.to_string())
    }
}

/// An address book found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressbookInfo {
    /// Absolute URL of the address book collection.
    pub url: Url,
    /// The display name, if the server reported one.
    pub display_name: Option<String>,
}

/// A content type / version pair from `supported-address-data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressDataType {
    /// Media type, e.g. `text/vcard`.
    pub content_type: String,
    /// vCard version, e.g. `3.0`.
    pub version: Option<String>,
}
