// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CardDAV` client for discovering, synchronizing and querying address books
//! on `CardDAV` servers (RFC 6352).

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::match_bool
)]

mod addressbook;
mod client;
mod config;
mod discovery;
mod error;
mod filter;
mod http;
mod request;
mod response;
mod sync;
mod types;
pub mod vcard;
mod xml;

pub use crate::addressbook::{AddressObject, AddressbookCollection};
pub use crate::client::CardDavClient;
pub use crate::config::{AuthMethod, CardDavConfig};
pub use crate::discovery::{
    DEFAULT_CONTEXT_PATHS, Discovery, DnsResolver, KNOWN_PROVIDERS, Scheme, ServerCandidate,
    SrvRecord, SystemResolver, Target, parse_target, sort_srv_records, txt_paths,
};
pub use crate::error::CardDavError;
pub use crate::filter::{
    COLLATION, Condition, ConditionGroup, ConditionSpec, Filter, FilterSpec, MatchType,
    ParamFilter, PropFilter, SimpleCondition, TestType, TextMatch,
};
pub use crate::http::{DavResponse, Depth, HttpClient, MAX_REDIRECTS};
pub use crate::request::{
    AddressbookMultiGetRequest, AddressbookQueryRequest, PropFindRequest, SyncCollectionRequest,
};
pub use crate::response::{
    MultiStatusResponse, PropStat, ResponseItem, check_and_parse_single_doc, parse_multistatus,
    parse_status_line,
};
pub use crate::sync::{MAX_SYNC_BATCHES, SyncBatch, SyncHandler, synchronize};
pub use crate::types::{AddressDataType, AddressbookInfo, ETag, Href};
pub use crate::vcard::{VCard, VCardError, VCardParameter, VCardProperty};
pub use crate::xml::{Element, PropName, PropValue, QName, ResourceProperties, ns};
