// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request executor tests with wiremock.

use cardamom_carddav::{AuthMethod, CardDavConfig, CardDavError, Depth, HttpClient, MAX_REDIRECTS};
use reqwest::Method;
use reqwest::header::HeaderMap;
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> HttpClient {
    HttpClient::new(CardDavConfig {
        auth: AuthMethod::Basic {
            username: "jane".to_string(),
            password: "secret".to_string(),
        },
        ..Default::default()
    })
    .expect("Failed to create client")
}

fn url(server: &MockServer, path: &str) -> Url {
    Url::parse(&server.uri()).unwrap().join(path).unwrap()
}

#[tokio::test]
async fn http_follows_redirect_to_location() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/final"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let resp = client()
        .send(Method::GET, &url(&mock_server, "/start"), HeaderMap::new(), None)
        .await
        .expect("Failed to send");

    assert_eq!(resp.status, 200);
    assert!(resp.redirected);
    assert_eq!(resp.url, url(&mock_server, "/final"));
    assert_eq!(resp.body, "done");
}

#[tokio::test]
async fn http_resends_method_body_and_auth_after_redirect() {
    let mock_server = MockServer::start().await;
    let body = "<D:propfind xmlns:D=\"DAV:\"/>";

    Mock::given(method("PROPFIND"))
        .and(path("/old/"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "../new/"))
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/new/"))
        .and(header("Authorization", "Basic amFuZTpzZWNyZXQ="))
        .and(header("Depth", "0"))
        .and(body_string(body))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            "<D:multistatus xmlns:D=\"DAV:\"/>",
            "application/xml; charset=utf-8",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut headers = HeaderMap::new();
    headers.insert("Depth", Depth::Zero.as_str().parse().unwrap());
    let resp = client()
        .send(
            Method::from_bytes(b"PROPFIND").unwrap(),
            &url(&mock_server, "/old/"),
            headers,
            Some(body),
        )
        .await
        .expect("Failed to send");

    assert_eq!(resp.status, 207);
    assert!(resp.redirected);
    assert!(resp.is_xml());
    assert_eq!(resp.url.path(), "/new/");
}

#[tokio::test]
async fn http_drops_auth_on_cross_origin_redirect() {
    let mock_server = MockServer::start().await;
    let other_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/start"))
        .and(header("Authorization", "Basic amFuZTpzZWNyZXQ="))
        .respond_with(
            ResponseTemplate::new(307).insert_header("Location", url(&other_server, "/final").as_str()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .expect(1)
        .mount(&other_server)
        .await;

    let resp = client()
        .send(Method::GET, &url(&mock_server, "/start"), HeaderMap::new(), None)
        .await
        .expect("Failed to send");

    assert_eq!(resp.status, 200);
    assert!(resp.redirected);
    assert_eq!(resp.url, url(&other_server, "/final"));

    let requests = other_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests.iter().all(|r| r.headers.get("authorization").is_none()));
}

#[tokio::test]
async fn http_stops_after_redirect_limit() {
    let mock_server = MockServer::start().await;

    for hop in 0..=MAX_REDIRECTS {
        Mock::given(method("GET"))
            .and(path(format!("/r{hop}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("/r{}", hop + 1)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/r{}", MAX_REDIRECTS + 1)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let resp = client()
        .send(Method::GET, &url(&mock_server, "/r0"), HeaderMap::new(), None)
        .await
        .expect("exceeding the limit is not an error");

    assert_eq!(resp.status, 302);
    assert!(resp.redirected);
    assert_eq!(resp.url.path(), format!("/r{MAX_REDIRECTS}"));
}

#[tokio::test]
async fn http_redirect_without_location_is_returned() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(307))
        .mount(&mock_server)
        .await;

    let resp = client()
        .send(Method::GET, &url(&mock_server, "/moved"), HeaderMap::new(), None)
        .await
        .expect("Failed to send");

    assert_eq!(resp.status, 307);
    assert!(!resp.redirected);
}

#[tokio::test]
async fn http_maps_error_statuses() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing.vcf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/stale.vcf"))
        .respond_with(ResponseTemplate::new(412).insert_header("ETag", "\"current\""))
        .mount(&mock_server)
        .await;

    let client = client();
    let missing = client
        .send(Method::GET, &url(&mock_server, "/missing.vcf"), HeaderMap::new(), None)
        .await
        .expect("Failed to send")
        .error_for_status();
    assert!(matches!(missing, Err(CardDavError::NotFound(href)) if href.as_str() == "/missing.vcf"));

    let stale = client
        .send(Method::PUT, &url(&mock_server, "/stale.vcf"), HeaderMap::new(), Some("x"))
        .await
        .expect("Failed to send")
        .error_for_status();
    assert!(matches!(stale, Err(CardDavError::PreconditionFailed(_))));
}

#[tokio::test]
async fn http_unreachable_server_is_network_error() {
    let mock_server = MockServer::start().await;
    let unreachable = url(&mock_server, "/");
    drop(mock_server);

    let result = client()
        .send(Method::GET, &unreachable, HeaderMap::new(), None)
        .await;

    assert!(matches!(result, Err(CardDavError::Network(_))));
}
