// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

/// `CardDAV` authentication method.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AuthMethod {
    /// No authentication.
    #[serde(rename = "none")]
    #[default]
    None,
    /// HTTP Basic authentication.
    #[serde(rename = "basic")]
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// `Authorization: Bearer` with an OAuth access token.
    #[serde(rename = "bearer")]
    Bearer {
        /// Bearer token.
        token: String,
    },
}

/// `CardDAV` account configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CardDavConfig {
    /// Discovery URI (a bare domain or URL) or the URL of a collection.
    #[serde(default)]
    pub base_url: String,
    /// Authentication method.
    #[serde(default)]
    pub auth: AuthMethod,
    /// Timeout of each request in seconds. The only way requests are cancelled.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Whether server certificates are verified.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("cardamom-carddav/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_verify_tls() -> bool {
    true
}

impl Default for CardDavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            verify_tls: default_verify_tls(),
        }
    }
}
