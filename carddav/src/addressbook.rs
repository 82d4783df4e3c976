// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Address book collection handle and address objects.

use reqwest::header::HeaderMap;
use url::Url;

use crate::client::CardDavClient;
use crate::error::CardDavError;
use crate::filter::Filter;
use crate::http::{Depth, HttpClient};
use crate::request::{AddressbookMultiGetRequest, AddressbookQueryRequest, SyncCollectionRequest};
use crate::response::MultiStatusResponse;
use crate::types::{AddressDataType, ETag, Href};
use crate::vcard::{self, VCard};
use crate::xml::{PropName, ResourceProperties, ns};

/// Properties fetched by [`AddressbookCollection::refresh_properties`].
const COLLECTION_PROPS: [PropName; 8] = [
    PropName::DisplayName,
    PropName::AddressbookDescription,
    PropName::SupportedReportSet,
    PropName::SyncToken,
    PropName::GetCTag,
    PropName::SupportedAddressData,
    PropName::MaxResourceSize,
    PropName::ResourceType,
];

/// A vCard resource inside an address book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressObject {
    /// Server path of the resource.
    pub href: Href,
    /// Entity tag, when known.
    pub etag: Option<ETag>,
    /// Raw vCard, once fetched.
    pub body: Option<String>,
    /// Parsed vCard; `None` if the body is missing or failed to parse.
    pub card: Option<VCard>,
}

impl AddressObject {
    /// An object whose body has not been fetched yet.
    #[must_use]
    pub const fn pending(href: Href, etag: Option<ETag>) -> Self {
        Self {
            href,
            etag,
            body: None,
            card: None,
        }
    }

    /// Sets the body and parses it. A parse failure is logged and leaves
    /// `card` empty.
    pub fn set_body(&mut self, body: String) {
        self.card = match vcard::parse(&body) {
            Ok(card) => Some(card),
            Err(e) => {
                tracing::warn!(href = %self.href, err = %e, "failed to parse vCard");
                None
            }
        };
        self.body = Some(body);
    }
}

/// An address book collection on the server.
#[derive(Debug, Clone)]
pub struct AddressbookCollection {
    client: CardDavClient,
    url: Url,
    props: ResourceProperties,
}

impl AddressbookCollection {
    pub(crate) fn new(client: CardDavClient, mut url: Url) -> Self {
        // Member URLs are joined onto the collection URL.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Self {
            client,
            url,
            props: ResourceProperties::default(),
        }
    }

    /// Absolute URL of the collection.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Server path of the collection.
    #[must_use]
    pub fn href(&self) -> Href {
        Href::from_url(&self.url)
    }

    /// The client this handle uses.
    #[must_use]
    pub fn client(&self) -> &CardDavClient {
        &self.client
    }

    /// Properties from the last refresh.
    #[must_use]
    pub fn properties(&self) -> &ResourceProperties {
        &self.props
    }

    /// Fetches the collection properties without caching them.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    pub async fn fetch_properties(&self) -> Result<ResourceProperties, CardDavError> {
        self.client
            .resource_properties(&self.url, &COLLECTION_PROPS)
            .await
    }

    /// Fetches and caches the collection properties.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    pub async fn refresh_properties(&mut self) -> Result<(), CardDavError> {
        self.props = self.fetch_properties().await?;
        Ok(())
    }

    /// The display name, or the last path segment of the URL.
    #[must_use]
    pub fn name(&self) -> String {
        if let Some(name) = self.display_name() {
            return name.to_string();
        }
        self.url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .unwrap_or_default()
            .to_string()
    }

    /// The `displayname` property, if non-empty.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.props
            .text(PropName::DisplayName)
            .filter(|s| !s.is_empty())
    }

    /// The `addressbook-description` property.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.props.text(PropName::AddressbookDescription)
    }

    /// The `max-resource-size` property in octets.
    #[must_use]
    pub fn max_resource_size(&self) -> Option<u64> {
        self.props
            .text(PropName::MaxResourceSize)
            .and_then(|s| s.parse().ok())
    }

    /// The `supported-address-data` entries.
    #[must_use]
    pub fn supported_address_data(&self) -> &[AddressDataType] {
        self.props.address_data_types()
    }

    /// Whether the server advertises the `sync-collection` report.
    #[must_use]
    pub fn supports_sync_collection(&self) -> bool {
        supports_report(&self.props, ns::DAV, "sync-collection")
    }

    /// Whether the server advertises the `addressbook-multiget` report.
    #[must_use]
    pub fn supports_multiget(&self) -> bool {
        supports_report(&self.props, ns::CARDDAV, "addressbook-multiget")
    }

    /// The `sync-token` property.
    #[must_use]
    pub fn sync_token(&self) -> Option<&str> {
        self.props.text(PropName::SyncToken)
    }

    /// The legacy `getctag` property.
    #[must_use]
    pub fn ctag(&self) -> Option<&str> {
        self.props.text(PropName::GetCTag)
    }

    fn resource_url(&self, href: &Href) -> Result<Url, CardDavError> {
        Ok(self.url.join(href.as_str())?)
    }

    /// Fetches a single vCard.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::NotFound`] if the card does not exist.
    pub async fn get_card(&self, href: &Href) -> Result<AddressObject, CardDavError> {
        let resp = self.client.get(&self.resource_url(href)?).await?;
        let mut object = AddressObject::pending(href.clone(), resp.etag());
        object.set_body(resp.body);
        Ok(object)
    }

    /// Creates a new card under a generated name.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::PreconditionFailed`] if the name is taken.
    pub async fn create_card(&self, card: &VCard) -> Result<AddressObject, CardDavError> {
        let href = Href::from_url(
            &self
                .url
                .join(&format!("{}.vcf", uuid::Uuid::new_v4()))?,
        );
        let body = card.to_string();
        let resp = self
            .client
            .put(
                &self.resource_url(&href)?,
                &body,
                HttpClient::if_none_match_any(HeaderMap::new()),
            )
            .await?;
        tracing::debug!(%href, "created card");
        Ok(AddressObject {
            href,
            etag: resp.etag(),
            body: Some(body),
            card: Some(card.clone()),
        })
    }

    /// Replaces a card if its current entity tag is `etag`. Returns the new
    /// entity tag when the server reports one.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::PreconditionFailed`] if the card changed on
    /// the server.
    pub async fn update_card(
        &self,
        href: &Href,
        card: &VCard,
        etag: &ETag,
    ) -> Result<Option<ETag>, CardDavError> {
        let resp = self
            .client
            .put(
                &self.resource_url(href)?,
                &card.to_string(),
                HttpClient::if_match(HeaderMap::new(), etag),
            )
            .await?;
        Ok(resp.etag())
    }

    /// Deletes a card, conditionally on `etag` if given.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::NotFound`] or
    /// [`CardDavError::PreconditionFailed`] accordingly.
    pub async fn delete_card(&self, href: &Href, etag: Option<&ETag>) -> Result<(), CardDavError> {
        self.client.delete(&self.resource_url(href)?, etag).await
    }

    /// Entity tags of all members, in server order.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    pub async fn member_etags(&self) -> Result<Vec<(Href, ETag)>, CardDavError> {
        let multistatus = self
            .client
            .propfind_minimal(&self.url, &[PropName::GetETag], Depth::One)
            .await?;
        let own = self.href();

        Ok(multistatus
            .resources()
            .filter_map(|(url, props)| {
                let href = Href::from_url(url);
                if href.same_resource(&own) {
                    return None;
                }
                let etag = props.text(PropName::GetETag)?;
                Some((href, ETag::from(etag)))
            })
            .collect())
    }

    /// Fetches several cards in one `addressbook-multiget` REPORT. Cards the
    /// server does not return are missing from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn multiget(
        &self,
        hrefs: &[Href],
        vcard_props: &[String],
    ) -> Result<Vec<AddressObject>, CardDavError> {
        let mut request = AddressbookMultiGetRequest::new().vcard_properties(vcard_props);
        for href in hrefs {
            request.add_href(href.clone());
        }
        let multistatus = self
            .client
            .report(&self.url, &request.build()?, Depth::Zero)
            .await?;
        Ok(self.objects(&multistatus))
    }

    /// Runs an `addressbook-query` REPORT. At most `limit` results are
    /// returned even if the server ignores the limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    #[tracing::instrument(skip_all, fields(url = %self.url))]
    pub async fn query(
        &self,
        filter: &Filter,
        vcard_props: &[String],
        limit: Option<u32>,
    ) -> Result<Vec<AddressObject>, CardDavError> {
        let body = AddressbookQueryRequest::new(filter)
            .vcard_properties(vcard_props)
            .limit(limit)
            .build()?;
        let multistatus = self.client.report(&self.url, &body, Depth::One).await?;
        let mut objects = self.objects(&multistatus);
        if let Some(limit) = limit.and_then(|l| usize::try_from(l).ok()) {
            if objects.len() > limit {
                tracing::debug!(returned = objects.len(), limit, "server ignored query limit");
                objects.truncate(limit);
            }
        }
        Ok(objects)
    }

    /// Runs a `sync-collection` REPORT from `token` (empty for a full
    /// synchronization). Returns the new token and the raw response.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails or the response carries no
    /// sync token.
    pub async fn sync_collection(
        &self,
        token: &str,
    ) -> Result<(String, MultiStatusResponse), CardDavError> {
        let body = SyncCollectionRequest::new(token).build()?;
        let multistatus = self.client.report(&self.url, &body, Depth::Zero).await?;
        let new_token = multistatus.sync_token.clone().ok_or_else(|| {
            CardDavError::Protocol(format!(
                "sync-collection response from {} has no sync-token",
                self.url
            ))
        })?;
        Ok((new_token, multistatus))
    }

    /// Address objects of a multiget or query response, excluding the
    /// collection itself.
    fn objects(&self, multistatus: &MultiStatusResponse) -> Vec<AddressObject> {
        let own = self.href();
        multistatus
            .resources()
            .filter_map(|(url, props)| {
                let href = Href::from_url(url);
                if href.same_resource(&own) {
                    return None;
                }
                let etag = props.text(PropName::GetETag).map(ETag::from);
                let mut object = AddressObject::pending(href, etag);
                if let Some(body) = props.raw_text(PropName::AddressData) {
                    object.set_body(body.to_string());
                }
                Some(object)
            })
            .collect()
    }
}

fn supports_report(props: &ResourceProperties, namespace: &str, local: &str) -> bool {
    props
        .names(PropName::SupportedReportSet)
        .iter()
        .any(|n| n.is(namespace, local))
}
