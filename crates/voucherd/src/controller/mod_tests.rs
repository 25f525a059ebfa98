// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::test_support::{credential_for, MemoryCredentialStore};

async fn controller(server: &MockServer) -> anyhow::Result<(Controller, Arc<TokenCache>)> {
    let store = Arc::new(MemoryCredentialStore::with(credential_for(&server.uri())));
    let credentials = CredentialHandle::load(store).await?;
    let api = Arc::new(ApiClient::new(
        Duration::from_secs(2),
        Duration::from_secs(1),
        Duration::from_secs(1),
        "USD",
    )?);
    let tokens = Arc::new(TokenCache::new(api.clone(), credentials.clone(), Duration::from_secs(60)));
    Ok((Controller::new(api, tokens.clone(), credentials), tokens))
}

async fn mount_tokens(server: &MockServer, tokens: &[&str]) {
    for (i, token) in tokens.iter().enumerate() {
        Mock::given(method("POST"))
            .and(path("/openapi/authorize/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errorCode": 0,
                "result": { "accessToken": token, "tokenType": "bearer", "expiresIn": 7200 }
            })))
            .up_to_n_times(1)
            .with_priority(u8::try_from(i + 1).unwrap_or(u8::MAX))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn expired_token_is_refreshed_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_tokens(&server, &["stale", "fresh"]).await;
    Mock::given(method("GET"))
        .and(path("/openapi/v1/T1/sites"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": -44112, "msg": "The access token has expired."
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/openapi/v1/T1/sites"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0, "result": { "totalRows": 1, "data": [{ "siteId": "s1", "name": "Lobby" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, tokens) = controller(&server).await?;
    let sites = controller.list_sites().await?;
    assert_eq!(sites.len(), 1);
    assert_eq!(tokens.status().await.refreshes, 2);
    Ok(())
}

#[tokio::test]
async fn repeated_rejection_surfaces_and_clears_cache() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_tokens(&server, &["one", "two"]).await;
    Mock::given(method("GET"))
        .and(path("/openapi/v1/T1/sites"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let (controller, tokens) = controller(&server).await?;
    let err = controller.list_sites().await.err();
    assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Credential));
    assert!(!tokens.status().await.has_token);
    Ok(())
}

#[tokio::test]
async fn not_found_is_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_tokens(&server, &["only"]).await;
    Mock::given(method("GET"))
        .and(path("/openapi/v1/T1/sites/gone/hotspot/vouchers"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, tokens) = controller(&server).await?;
    let err = controller.list_vouchers("gone").await.err();
    assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotFound));
    assert!(tokens.status().await.has_token);
    Ok(())
}
