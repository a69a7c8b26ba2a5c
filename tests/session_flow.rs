//! End-to-end session scenarios against a mocked backend.
//!
//! Each test starts its own wiremock server and in-memory token jar.

use futures::future::join_all;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsline::api::{ApiClient, Credentials};
use newsline::config::BackendConfig;
use newsline::session::{AuthPhase, Session, TokenJar};

fn client(server: &MockServer, tokens: Arc<TokenJar>) -> ApiClient {
    let backend = BackendConfig {
        base_url: url::Url::parse(&server.uri()).unwrap(),
        api_key: SecretString::from("integration-key".to_string()),
        timeout: Duration::from_secs(5),
    };
    ApiClient::new(backend, tokens).unwrap()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "acc-1",
            "refresh_token": "ref-1",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Login, lose the access token, recover silently
// ============================================================================

#[tokio::test]
async fn test_login_then_silent_refresh_after_access_token_loss() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(query_param("refresh_token", "ref-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "access_token": "acc-2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(TokenJar::in_memory());
    let session = Session::new(client(&server, Arc::clone(&tokens)));

    session
        .backend()
        .login(&Credentials {
            email: "a@b.com".to_string(),
            password: "secret1".to_string(),
        })
        .await
        .unwrap();
    assert!(session.backend().auth_status().is_authenticated);

    tokens.clear_access();
    assert_eq!(session.state().phase(), AuthPhase::Loading);

    let state = session.check_auth().await;
    assert!(state.is_authenticated);
    assert!(!state.is_loading);
    assert!(state.has_refresh_token, "refresh token is kept when not rotated");
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "access_token": "acc-2" }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(TokenJar::in_memory());
    tokens.store_refresh("ref-1".to_string());
    let client = client(&server, tokens);

    let clones: Vec<ApiClient> = (0..5).map(|_| client.clone()).collect();
    let outcomes = join_all(clones.iter().map(|c| c.refresh())).await;
    assert_eq!(outcomes, vec![true; 5]);
    assert!(!client.refresh_in_flight());
}

#[tokio::test]
async fn test_rejected_refresh_token_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({ "detail": "Refresh token expired" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(TokenJar::in_memory());
    tokens.store_refresh("stale".to_string());
    let session = Session::new(client(&server, tokens));

    // The failed attempt settles as "refresh available"; the next probe sees
    // the jar emptied by the rejection and makes no further refresh call.
    assert_eq!(session.check_auth().await.phase(), AuthPhase::RefreshAvailable);
    assert!(!session.backend().auth_status().has_refresh_token);
    assert_eq!(session.check_auth().await.phase(), AuthPhase::SignedOut);
}

#[tokio::test]
async fn test_refresh_outage_keeps_refresh_available() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let tokens = Arc::new(TokenJar::in_memory());
    tokens.store_refresh("ref-1".to_string());
    let session = Session::new(client(&server, tokens));

    assert_eq!(session.check_auth().await.phase(), AuthPhase::RefreshAvailable);
}

#[tokio::test]
async fn test_logout_clears_even_when_backend_fails() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::new(client(&server, Arc::new(TokenJar::in_memory())));
    session
        .backend()
        .login(&Credentials {
            email: "a@b.com".to_string(),
            password: "secret1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(session.check_auth().await.phase(), AuthPhase::Authenticated);

    session.logout().await;
    assert_eq!(session.state().phase(), AuthPhase::SignedOut);
    assert!(!session.backend().auth_status().has_refresh_token);
}

#[tokio::test]
async fn test_session_survives_restart_through_session_file() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let dir = std::env::temp_dir().join(format!("newsline_session_flow_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let session_file = dir.join("session.toml");
    let _ = std::fs::remove_file(&session_file);

    let first = client(&server, Arc::new(TokenJar::persistent(&session_file)));
    first
        .login(&Credentials {
            email: "a@b.com".to_string(),
            password: "secret1".to_string(),
        })
        .await
        .unwrap();
    drop(first);

    let restarted = Session::new(client(&server, Arc::new(TokenJar::persistent(&session_file))));
    assert_eq!(restarted.check_auth().await.phase(), AuthPhase::Authenticated);

    let _ = std::fs::remove_dir_all(&dir);
}
