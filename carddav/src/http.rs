// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication, redirect tracking and `ETag` handling.
//!
//! Automatic redirects are disabled in the underlying client: WebDAV servers
//! redirect PROPFIND and REPORT requests, and those must be re-sent with the
//! same method and body, which generic clients only do for a subset of status
//! codes.

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode, redirect};
use url::Url;

use crate::config::{AuthMethod, CardDavConfig};
use crate::error::CardDavError;
use crate::types::{ETag, Href};

/// Maximum number of redirects followed for one request.
pub const MAX_REDIRECTS: usize = 5;

/// Value of the `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource only.
    Zero,
    /// The resource and its direct members.
    One,
}

impl Depth {
    /// Header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct DavResponse {
    /// Status of the final response.
    pub status: StatusCode,
    /// Headers of the final response.
    pub headers: HeaderMap,
    /// Response body.
    pub body: String,
    /// URL the final response was received from.
    pub url: Url,
    /// Whether at least one redirect was followed.
    pub redirected: bool,
}

impl DavResponse {
    /// The `Content-Type` header, if present and valid.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether the body is declared as XML.
    #[must_use]
    pub fn is_xml(&self) -> bool {
        self.content_type().is_some_and(|ct| {
            let media = ct.split(';').next().unwrap_or_default().trim();
            media.eq_ignore_ascii_case("application/xml")
                || media.eq_ignore_ascii_case("text/xml")
                || media.to_ascii_lowercase().ends_with("+xml")
        })
    }

    /// The `ETag` header, if present.
    #[must_use]
    pub fn etag(&self) -> Option<ETag> {
        self.headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| ETag::new(s.to_string()))
    }

    /// Maps error statuses to errors, passing 2xx responses through.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::NotFound`] on 404,
    /// [`CardDavError::PreconditionFailed`] on 412 and
    /// [`CardDavError::Protocol`] for any other non-success status.
    pub fn error_for_status(self) -> Result<Self, CardDavError> {
        match self.status {
            s if s.is_success() => Ok(self),
            StatusCode::NOT_FOUND => Err(CardDavError::NotFound(Href::from_url(&self.url))),
            StatusCode::PRECONDITION_FAILED => Err(CardDavError::PreconditionFailed(
                self.etag()
                    .map_or_else(|| "unknown".to_string(), |e| e.to_string()),
            )),
            status => Err(CardDavError::Protocol(format!(
                "{status} for {}: {}",
                self.url,
                self.body.chars().take(200).collect::<String>()
            ))),
        }
    }
}

/// HTTP client for `CardDAV` operations.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: CardDavConfig,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: CardDavConfig) -> Result<Self, CardDavError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self { client, config })
    }

    /// Builds a request with authentication headers.
    pub fn build_request(&self, method: Method, url: &Url) -> RequestBuilder {
        let mut req = self.client.request(method, url.clone());

        match &self.config.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Sends a request, following up to [`MAX_REDIRECTS`] redirects with the
    /// same method, headers and body. Authentication is only sent to the
    /// origin of `url`.
    ///
    /// A chain longer than the limit is not an error: the last redirect
    /// response is returned and the caller inspects its status.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Network`] on transport failure and
    /// [`CardDavError::Client`] if the request cannot be built.
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        headers: HeaderMap,
        body: Option<&str>,
    ) -> Result<DavResponse, CardDavError> {
        let mut current = url.clone();
        let mut redirects = 0;

        loop {
            tracing::debug!(%method, url = %current, "sending request");
            // Credentials only go to the origin the caller asked for.
            let req = if current.origin() == url.origin() {
                self.build_request(method.clone(), &current)
            } else {
                self.client.request(method.clone(), current.clone())
            };
            let mut req = req.headers(headers.clone());
            if let Some(body) = body {
                req = req.body(body.to_string());
            }
            let resp = req.send().await?;
            let status = resp.status();
            tracing::trace!(%method, url = %current, %status, "received response");

            if is_redirect(status) && redirects < MAX_REDIRECTS {
                if let Some(target) = redirect_target(&resp, &current) {
                    tracing::debug!(from = %current, to = %target, %status, "following redirect");
                    if target.origin() != url.origin()
                        && !matches!(self.config.auth, AuthMethod::None)
                    {
                        tracing::warn!(
                            to = %target,
                            "redirected to another origin, dropping credentials"
                        );
                    }
                    redirects += 1;
                    current = target;
                    continue;
                }
            } else if is_redirect(status) {
                tracing::warn!(url = %current, "redirect limit reached");
            }

            let headers = resp.headers().clone();
            let body = resp.text().await?;
            return Ok(DavResponse {
                status,
                headers,
                body,
                url: current,
                redirected: redirects > 0,
            });
        }
    }

    /// Adds If-Match header for conditional updates.
    #[must_use]
    pub fn if_match(mut headers: HeaderMap, etag: &ETag) -> HeaderMap {
        if let Ok(value) = HeaderValue::from_str(etag.as_str()) {
            headers.insert(header::IF_MATCH, value);
        }
        headers
    }

    /// Adds `If-None-Match: *` for conditional creation.
    #[must_use]
    pub fn if_none_match_any(mut headers: HeaderMap) -> HeaderMap {
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        headers
    }
}

const fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn redirect_target(resp: &reqwest::Response, current: &Url) -> Option<Url> {
    let location = resp.headers().get(header::LOCATION)?.to_str().ok()?;
    match current.join(location) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(location, err = %e, "ignoring invalid Location header");
            None
        }
    }
}

/// Builds a WebDAV extension method such as `PROPFIND`.
pub(crate) fn dav_method(name: &str) -> Result<Method, CardDavError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| CardDavError::Client(format!("Invalid method {name}: {e}")))
}

/// Headers for an XML request body.
pub(crate) fn xml_headers(depth: Depth) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    headers.insert("Depth", HeaderValue::from_static(depth.as_str()));
    headers
}
