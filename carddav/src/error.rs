// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use crate::types::Href;
use crate::vcard::VCardError;

/// `CardDAV` client errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CardDavError {
    /// Transport failure or timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// The request could not be built or sent as given.
    #[error("Invalid request: {0}")]
    Client(String),

    /// Unexpected status code or content type.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Malformed XML or an unexpected document shape.
    #[error("XML error: {0}")]
    Xml(String),

    /// Malformed filter or query construction.
    #[error("Invalid filter for '{property}': {reason}")]
    Validation {
        /// Property or parameter the problem was found on.
        property: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(Href),

    /// Precondition failed (`ETag` mismatch).
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// vCard parsing error.
    #[error("vCard parsing error: {0}")]
    VCard(#[from] VCardError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CardDavError {
    pub(crate) fn validation(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            property: property.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for CardDavError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Client(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<quick_xml::Error> for CardDavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for CardDavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("IO error: {e}"))
    }
}

impl From<url::ParseError> for CardDavError {
    fn from(e: url::ParseError) -> Self {
        Self::Client(format!("Invalid URL: {e}"))
    }
}
