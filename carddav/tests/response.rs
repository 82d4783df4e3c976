// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsing tests.

use cardamom_carddav::{
    CardDavError, MultiStatusResponse, PropName, ResponseItem, ns, parse_status_line,
};
use reqwest::StatusCode;
use url::Url;

fn base() -> Url {
    Url::parse("https://dav.example.com/addressbooks/jane/contacts/").unwrap()
}

#[test]
fn response_parse_propstat_entries() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<d:multistatus xmlns:d=\"DAV:\" xmlns:card=\"urn:ietf:params:xml:ns:carddav\">
  <d:response>
    <d:href>/addressbooks/jane/contacts/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Contacts</d:displayname>
        <d:resourcetype><d:collection/><card:addressbook/></d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
    <d:propstat>
      <d:prop>
        <card:addressbook-description/>
      </d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>a.vcf</d:href>
    <d:propstat>
      <d:prop><d:getetag>\"a-1\"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>";

    let multistatus = MultiStatusResponse::from_xml(xml, &base()).expect("Failed to parse");

    assert_eq!(multistatus.responses.len(), 2);
    assert_eq!(multistatus.sync_token, None);

    let ResponseItem::PropStat { url, prop_stats } = &multistatus.responses[0] else {
        panic!("expected a propstat entry");
    };
    assert_eq!(url.path(), "/addressbooks/jane/contacts/");
    assert_eq!(prop_stats.len(), 2);
    assert!(prop_stats[0].is_success());
    assert!(!prop_stats[1].is_success());
    assert!(prop_stats[1].props.is_empty());

    let props = multistatus.props_for(&base()).expect("collection props");
    assert_eq!(props.text(PropName::DisplayName), Some("Contacts"));
    assert!(props.has_resource_type(ns::CARDDAV, "addressbook"));
    assert_eq!(props.get(PropName::AddressbookDescription), None);

    let card_url = base().join("a.vcf").unwrap();
    let props = multistatus.props_for(&card_url).expect("card props");
    assert_eq!(props.text(PropName::GetETag), Some("\"a-1\""));
}

#[test]
fn response_parse_sync_collection_result() {
    let xml = r#"<?xml version="1.0" encoding="utf-8" ?>
<multistatus xmlns="DAV:">
  <response>
    <href>/addressbooks/jane/contacts/new.vcf</href>
    <propstat>
      <prop><getetag>"n-1"</getetag></prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
  <response>
    <href>/addressbooks/jane/contacts/old-1.vcf</href>
    <href>/addressbooks/jane/contacts/old-2.vcf</href>
    <status>HTTP/1.1 404 Not Found</status>
  </response>
  <sync-token>http://example.com/sync/7</sync-token>
</multistatus>"#;

    let multistatus = MultiStatusResponse::from_xml(xml, &base()).expect("Failed to parse");

    assert_eq!(
        multistatus.sync_token.as_deref(),
        Some("http://example.com/sync/7")
    );
    assert_eq!(multistatus.responses.len(), 2);
    match &multistatus.responses[1] {
        ResponseItem::Status { urls, status } => {
            assert_eq!(urls.len(), 2);
            assert_eq!(urls[1].path(), "/addressbooks/jane/contacts/old-2.vcf");
            assert_eq!(status, "HTTP/1.1 404 Not Found");
        }
        other => panic!("expected a status entry, got {other:?}"),
    }
    assert_eq!(
        multistatus.responses[1].status_code(),
        Some(StatusCode::NOT_FOUND)
    );
}

#[test]
fn response_parse_address_data_with_entities() {
    let xml = r#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:response>
    <D:href>/addressbooks/jane/contacts/a.vcf</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>&quot;a-2&quot;</D:getetag>
        <C:address-data>BEGIN:VCARD
VERSION:3.0
FN:Smith &amp; Sons
END:VCARD
</C:address-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    let multistatus = MultiStatusResponse::from_xml(xml, &base()).expect("Failed to parse");
    let (_, props) = multistatus.resources().next().expect("one resource");

    assert_eq!(props.text(PropName::GetETag), Some("\"a-2\""));
    let data = props.raw_text(PropName::AddressData).expect("address data");
    assert!(data.contains("FN:Smith & Sons"));
}

#[test]
fn response_rejects_other_root_and_malformed_xml() {
    assert!(matches!(
        MultiStatusResponse::from_xml("<D:error xmlns:D=\"DAV:\"/>", &base()),
        Err(CardDavError::Xml(_))
    ));
    assert!(matches!(
        MultiStatusResponse::from_xml("<D:multistatus xmlns:D=\"DAV:\">", &base()),
        Err(CardDavError::Xml(_))
    ));
}

#[test]
fn response_status_line() {
    assert_eq!(
        parse_status_line("HTTP/1.1 507 Insufficient Storage"),
        Some(StatusCode::INSUFFICIENT_STORAGE)
    );
    assert_eq!(parse_status_line("HTTP/1.1 200"), Some(StatusCode::OK));
    assert_eq!(parse_status_line("garbage"), None);
    assert_eq!(parse_status_line(""), None);
}
