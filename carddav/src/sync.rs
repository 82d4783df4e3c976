// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Synchronization of a local cache with an address book.
//!
//! Each batch detects changes with the best mechanism the server offers:
//!
//! 1. a `sync-collection` REPORT (RFC 6578) if the collection advertises it,
//! 2. otherwise, or if that report fails, the collection's `sync-token` or
//!    `getctag` compared against the previous token, and
//! 3. if the token changed, a depth 1 PROPFIND of all member entity tags
//!    diffed against the local cache.
//!
//! Changed cards are then fetched with `addressbook-multiget` where
//! supported, falling back to individual GET requests.

use std::collections::HashMap;

use reqwest::StatusCode;

use crate::addressbook::{AddressObject, AddressbookCollection};
use crate::error::CardDavError;
use crate::response::{ResponseItem, parse_status_line};
use crate::types::{ETag, Href};
use crate::xml::PropName;

/// Maximum number of batches run by one [`synchronize`] call.
pub const MAX_SYNC_BATCHES: usize = 10;

/// Receives the results of a synchronization.
pub trait SyncHandler {
    /// Entity tags of the cards in the local cache. Only read when the
    /// server cannot report changes itself.
    fn existing_etags(&self) -> HashMap<Href, ETag>;

    /// Called for each new or modified card. `object.card` is `None` if the
    /// card could not be fetched or parsed.
    fn address_object_changed(&mut self, object: &AddressObject);

    /// Called for each card deleted on the server.
    fn address_object_deleted(&mut self, href: &Href);

    /// Called once at the end of every batch.
    fn finalize(&mut self);
}

/// Changes detected by one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatch {
    /// Token to start the next synchronization from.
    pub sync_token: String,
    /// Whether the server truncated the result and more batches follow.
    pub truncated: bool,
    /// New or modified cards.
    pub changed: Vec<AddressObject>,
    /// Deleted cards.
    pub deleted: Vec<Href>,
}

/// Synchronizes `handler` with the address book, starting from
/// `prev_token` (empty for a full synchronization), and returns the token
/// to use next time.
///
/// `vcard_props` restricts the fetched vCard properties; empty fetches full
/// cards.
///
/// # Errors
///
/// Returns an error if the collection properties or the member list cannot
/// be fetched. A failing `sync-collection` report is not an error.
#[tracing::instrument(skip_all, fields(url = %abook.url()))]
pub async fn synchronize<H: SyncHandler>(
    abook: &mut AddressbookCollection,
    handler: &mut H,
    vcard_props: &[String],
    prev_token: &str,
) -> Result<String, CardDavError> {
    let mut token = prev_token.to_string();

    for batch_no in 1..=MAX_SYNC_BATCHES {
        let batch = sync_batch(abook, handler, &token).await?;
        tracing::debug!(
            batch_no,
            changed = batch.changed.len(),
            deleted = batch.deleted.len(),
            truncated = batch.truncated,
            "sync batch finished"
        );
        let truncated = batch.truncated;
        token = deliver(abook, handler, batch, vcard_props).await;

        if !truncated {
            return Ok(token);
        }
    }

    tracing::warn!(
        max_batches = MAX_SYNC_BATCHES,
        "server still truncating after the batch limit, stopping"
    );
    Ok(token)
}

/// Detects the changes of one batch without fetching card bodies.
async fn sync_batch<H: SyncHandler>(
    abook: &mut AddressbookCollection,
    handler: &H,
    prev_token: &str,
) -> Result<SyncBatch, CardDavError> {
    abook.refresh_properties().await?;

    if abook.supports_sync_collection() {
        match sync_by_report(abook, prev_token).await {
            Ok(batch) => return Ok(batch),
            Err(e) => {
                tracing::warn!(err = %e, "sync-collection report failed, falling back");
            }
        }
    }

    let token = collection_token(abook);
    if !token.is_empty() && token == prev_token {
        tracing::debug!(%token, "collection unchanged");
        return Ok(SyncBatch {
            sync_token: token,
            ..SyncBatch::default()
        });
    }

    let (changed, deleted) = diff_etags(abook.member_etags().await?, handler.existing_etags());
    Ok(SyncBatch {
        sync_token: token,
        truncated: false,
        changed,
        deleted,
    })
}

async fn sync_by_report(
    abook: &AddressbookCollection,
    prev_token: &str,
) -> Result<SyncBatch, CardDavError> {
    let (sync_token, multistatus) = abook.sync_collection(prev_token).await?;
    let own = abook.href();
    let mut batch = SyncBatch {
        sync_token,
        ..SyncBatch::default()
    };

    for item in &multistatus.responses {
        match item {
            ResponseItem::Status { urls, status } => {
                let code = parse_status_line(status);
                for href in urls.iter().map(Href::from_url) {
                    if href.same_resource(&own) {
                        if code == Some(StatusCode::INSUFFICIENT_STORAGE) {
                            batch.truncated = true;
                        }
                    } else if code == Some(StatusCode::NOT_FOUND) {
                        batch.deleted.push(href);
                    } else {
                        tracing::debug!(%href, %status, "ignoring sync-collection status entry");
                    }
                }
            }
            ResponseItem::PropStat { url, prop_stats } => {
                let href = Href::from_url(url);
                if href.same_resource(&own) {
                    continue;
                }
                if let Some(props) = item.successful_props() {
                    let etag = props.text(PropName::GetETag).map(ETag::from);
                    batch.changed.push(AddressObject::pending(href, etag));
                } else if prop_stats
                    .iter()
                    .any(|p| parse_status_line(&p.status) == Some(StatusCode::NOT_FOUND))
                {
                    batch.deleted.push(href);
                }
            }
        }
    }

    Ok(batch)
}

/// The collection's `sync-token`, else its `getctag`, else empty.
fn collection_token(abook: &AddressbookCollection) -> String {
    let token = abook
        .sync_token()
        .filter(|t| !t.is_empty())
        .or_else(|| abook.ctag().filter(|t| !t.is_empty()));
    match token {
        Some(token) => token.to_string(),
        None => {
            tracing::info!("collection has neither sync-token nor getctag");
            String::new()
        }
    }
}

/// Compares remote entity tags against a copy of the local cache. Members
/// whose tag differs or that are not cached have changed; cached entries the
/// server no longer lists were deleted.
fn diff_etags(
    remote: Vec<(Href, ETag)>,
    mut local: HashMap<Href, ETag>,
) -> (Vec<AddressObject>, Vec<Href>) {
    let mut changed = Vec::new();
    for (href, etag) in remote {
        if local.remove(&href).as_ref() != Some(&etag) {
            changed.push(AddressObject::pending(href, Some(etag)));
        }
    }

    let mut deleted: Vec<Href> = local.into_keys().collect();
    deleted.sort();
    (changed, deleted)
}

/// Fetches missing bodies and hands the batch to `handler`. Returns the
/// batch token.
async fn deliver<H: SyncHandler>(
    abook: &AddressbookCollection,
    handler: &mut H,
    batch: SyncBatch,
    vcard_props: &[String],
) -> String {
    for href in &batch.deleted {
        handler.address_object_deleted(href);
    }

    let mut changed = batch.changed;
    fetch_bodies(abook, &mut changed, vcard_props).await;
    for object in &changed {
        handler.address_object_changed(object);
    }

    handler.finalize();
    batch.sync_token
}

async fn fetch_bodies(
    abook: &AddressbookCollection,
    changed: &mut [AddressObject],
    vcard_props: &[String],
) {
    if changed.is_empty() {
        return;
    }

    if abook.supports_multiget() {
        let hrefs: Vec<Href> = changed.iter().map(|o| o.href.clone()).collect();
        match abook.multiget(&hrefs, vcard_props).await {
            Ok(fetched) => {
                let mut fetched: HashMap<Href, AddressObject> = fetched
                    .into_iter()
                    .map(|o| (o.href.clone(), o))
                    .collect();
                for object in changed.iter_mut() {
                    if let Some(remote) = fetched.remove(&object.href) {
                        if remote.etag.is_some() {
                            object.etag = remote.etag;
                        }
                        object.body = remote.body;
                        object.card = remote.card;
                    }
                }
            }
            Err(e) => tracing::warn!(err = %e, "addressbook-multiget failed"),
        }
    }

    for object in changed.iter_mut().filter(|o| o.body.is_none()) {
        match abook.get_card(&object.href).await {
            Ok(fetched) => {
                if fetched.etag.is_some() {
                    object.etag = fetched.etag;
                }
                object.body = fetched.body;
                object.card = fetched.card;
            }
            Err(e) => tracing::warn!(href = %object.href, err = %e, "failed to fetch card"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn href(s: &str) -> Href {
        Href::from(s)
    }

    #[test]
    fn diff_etags_reports_changed_new_and_deleted() {
        let remote = vec![
            (href("/ab/same.vcf"), ETag::from("\"1\"")),
            (href("/ab/modified.vcf"), ETag::from("\"3\"")),
            (href("/ab/new.vcf"), ETag::from("\"1\"")),
        ];
        let local = HashMap::from([
            (href("/ab/same.vcf"), ETag::from("\"1\"")),
            (href("/ab/modified.vcf"), ETag::from("\"2\"")),
            (href("/ab/gone-b.vcf"), ETag::from("\"1\"")),
            (href("/ab/gone-a.vcf"), ETag::from("\"1\"")),
        ]);

        let (changed, deleted) = diff_etags(remote, local);

        let changed: Vec<_> = changed.iter().map(|o| o.href.as_str()).collect();
        assert_eq!(changed, vec!["/ab/modified.vcf", "/ab/new.vcf"]);
        assert_eq!(deleted, vec![href("/ab/gone-a.vcf"), href("/ab/gone-b.vcf")]);
    }

    #[test]
    fn diff_etags_with_primed_cache_is_empty() {
        let remote = vec![(href("/ab/a.vcf"), ETag::from("\"1\""))];
        let local = HashMap::from([(href("/ab/a.vcf"), ETag::from("\"1\""))]);

        let (changed, deleted) = diff_etags(remote, local);
        assert!(changed.is_empty());
        assert!(deleted.is_empty());
    }
}
