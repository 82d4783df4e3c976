// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CardDAV` client for principal and address book operations.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::addressbook::AddressbookCollection;
use crate::config::CardDavConfig;
use crate::error::CardDavError;
use crate::http::{Depth, DavResponse, HttpClient, dav_method, xml_headers};
use crate::request::PropFindRequest;
use crate::response::{MultiStatusResponse, check_and_parse_single_doc, parse_multistatus};
use crate::types::{AddressbookInfo, ETag};
use crate::xml::{PropName, ResourceProperties, ns};

/// `CardDAV` client for accessing address books on `CardDAV` servers.
///
/// # Example
///
/// ```ignore
/// use cardamom_carddav::{AuthMethod, CardDavClient, CardDavConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CardDavConfig {
///     base_url: "https://dav.example.com/".to_string(),
///     auth: AuthMethod::Basic {
///         username: "user".to_string(),
///         password: "pass".to_string(),
///     },
///     ..Default::default()
/// };
///
/// let client = CardDavClient::new(config)?;
/// let principal = client.current_user_principal(&client.base_url()?).await?;
/// for home in client.addressbook_home_set(&principal).await? {
///     let books = client.list_addressbooks(&home).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CardDavClient {
    http: Arc<HttpClient>,
    config: CardDavConfig,
}

impl CardDavClient {
    /// Creates a new `CardDAV` client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: CardDavConfig) -> Result<Self, CardDavError> {
        let http = HttpClient::new(config.clone())?;
        Ok(Self {
            http: Arc::new(http),
            config,
        })
    }

    /// The configured base URL. A bare host name is taken as `https://`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URL is invalid.
    pub fn base_url(&self) -> Result<Url, CardDavError> {
        let raw = self.config.base_url.trim();
        if raw.is_empty() {
            return Err(CardDavError::Config("base_url is empty".to_string()));
        }
        if raw.contains("://") {
            Ok(Url::parse(raw)?)
        } else {
            Ok(Url::parse(&format!("https://{raw}"))?)
        }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &CardDavConfig {
        &self.config
    }

    /// The underlying HTTP client.
    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Issues a PROPFIND and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error on a non-2xx status, a non-XML body or malformed XML.
    pub async fn propfind(
        &self,
        url: &Url,
        props: &[PropName],
        depth: Depth,
    ) -> Result<MultiStatusResponse, CardDavError> {
        self.propfind_with_headers(url, props, xml_headers(depth))
            .await
    }

    /// Issues a PROPFIND with `Prefer: return=minimal`, asking the server to
    /// omit properties it does not have.
    ///
    /// # Errors
    ///
    /// Returns an error on a non-2xx status, a non-XML body or malformed XML.
    pub async fn propfind_minimal(
        &self,
        url: &Url,
        props: &[PropName],
        depth: Depth,
    ) -> Result<MultiStatusResponse, CardDavError> {
        let mut headers = xml_headers(depth);
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));
        self.propfind_with_headers(url, props, headers).await
    }

    async fn propfind_with_headers(
        &self,
        url: &Url,
        props: &[PropName],
        headers: HeaderMap,
    ) -> Result<MultiStatusResponse, CardDavError> {
        let body = PropFindRequest::with_properties(props).build()?;
        let resp = self
            .http
            .send(dav_method("PROPFIND")?, url, headers, Some(&body))
            .await?;
        let root = check_and_parse_single_doc(&resp)?;
        MultiStatusResponse::from_element(&root, &resp.url)
    }

    /// Properties of the single resource at `url` (PROPFIND depth 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response names no
    /// resource with successful properties.
    pub async fn resource_properties(
        &self,
        url: &Url,
        props: &[PropName],
    ) -> Result<ResourceProperties, CardDavError> {
        let multistatus = self.propfind(url, props, Depth::Zero).await?;
        // Servers may answer with a differently spelled href for the same
        // resource; a depth 0 response only describes one resource.
        multistatus
            .props_for(url)
            .or_else(|| multistatus.resources().next().map(|(_, p)| p))
            .ok_or_else(|| CardDavError::Protocol(format!("No properties returned for {url}")))
    }

    /// Issues a REPORT and decodes the multistatus response.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers 207 with an XML body.
    pub async fn report(
        &self,
        url: &Url,
        body: &str,
        depth: Depth,
    ) -> Result<MultiStatusResponse, CardDavError> {
        let resp = self
            .http
            .send(dav_method("REPORT")?, url, xml_headers(depth), Some(body))
            .await?;
        parse_multistatus(&resp)
    }

    /// Fetches a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    pub async fn get(&self, url: &Url) -> Result<DavResponse, CardDavError> {
        self.http
            .send(Method::GET, url, HeaderMap::new(), None)
            .await?
            .error_for_status()
    }

    /// Stores a vCard at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    pub async fn put(
        &self,
        url: &Url,
        body: &str,
        mut headers: HeaderMap,
    ) -> Result<DavResponse, CardDavError> {
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("text/vcard; charset=utf-8"),
        );
        self.http
            .send(Method::PUT, url, headers, Some(body))
            .await?
            .error_for_status()
    }

    /// Deletes the resource at `url`, conditionally on `etag` if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    pub async fn delete(&self, url: &Url, etag: Option<&ETag>) -> Result<(), CardDavError> {
        let headers = match etag {
            Some(etag) => HttpClient::if_match(HeaderMap::new(), etag),
            None => HeaderMap::new(),
        };
        self.http
            .send(Method::DELETE, url, headers, None)
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Finds the principal URL of the authenticated user, starting from a
    /// context path such as `/.well-known/carddav`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the property is missing.
    pub async fn current_user_principal(&self, context: &Url) -> Result<Url, CardDavError> {
        let props = self
            .resource_properties(context, &[PropName::CurrentUserPrincipal])
            .await?;
        props
            .href(PropName::CurrentUserPrincipal)
            .cloned()
            .ok_or_else(|| {
                CardDavError::Protocol(format!("No current-user-principal at {context}"))
            })
    }

    /// Finds the address book home collections of a principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the property is missing.
    pub async fn addressbook_home_set(&self, principal: &Url) -> Result<Vec<Url>, CardDavError> {
        let props = self
            .resource_properties(principal, &[PropName::AddressbookHomeSet])
            .await?;
        let homes = props.hrefs(PropName::AddressbookHomeSet).to_vec();
        if homes.is_empty() {
            return Err(CardDavError::Protocol(format!(
                "No addressbook-home-set at {principal}"
            )));
        }
        Ok(homes)
    }

    /// Lists the address books directly below a home collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    pub async fn list_addressbooks(
        &self,
        home: &Url,
    ) -> Result<Vec<AddressbookInfo>, CardDavError> {
        let multistatus = self
            .propfind(
                home,
                &[PropName::ResourceType, PropName::DisplayName],
                Depth::One,
            )
            .await?;

        let books: Vec<_> = multistatus
            .resources()
            .filter(|(_, props)| props.has_resource_type(ns::CARDDAV, "addressbook"))
            .map(|(url, props)| AddressbookInfo {
                url: url.clone(),
                display_name: props
                    .text(PropName::DisplayName)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
            })
            .collect();
        tracing::debug!(%home, count = books.len(), "listed address books");
        Ok(books)
    }

    /// Returns a handle for the address book collection at `url`. No request
    /// is made until properties are refreshed.
    #[must_use]
    pub fn addressbook(&self, url: Url) -> AddressbookCollection {
        AddressbookCollection::new(self.clone(), url)
    }
}
