//! HTTP server end to end, with in-process fakes for the device API and the
//! SmartThings token endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use nestlink_api::{router, serve, AppState, HandlerConfig, SchemaHandler, ServerConfig};
use nestlink_devices::{Device, SdmCommand, SdmError, SmartDeviceManagement, TraitSet};
use nestlink_oauth::{OAuthClient, OAuthClientConfig, StateFile};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::Span;

struct OneThermostat;

#[async_trait]
impl SmartDeviceManagement for OneThermostat {
    async fn list_devices(&self, _token: &str) -> Result<Vec<Device>, SdmError> {
        Ok(vec![Device {
            id: "DEV1".to_string(),
            device_type: "sdm.devices.types.THERMOSTAT".to_string(),
            traits: TraitSet::parse(br#"{"sdm.devices.traits.Info": {"customName": "Den"}}"#)?,
        }])
    }

    async fn get_device(&self, _token: &str, device_id: &str) -> Result<Device, SdmError> {
        Err(SdmError::Api {
            status: 404,
            message: format!("{} not found", device_id),
            reasons: vec![],
        })
    }

    async fn send_command(&self, _token: &str, _device_id: &str, _command: &SdmCommand) -> Result<(), SdmError> {
        Ok(())
    }
}

struct Server {
    base: String,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn start(state_file: PathBuf) -> Server {
    let mut config = HandlerConfig::new("proj-1");
    config.oauth_state_file = state_file;

    let handler = SchemaHandler::new(
        Arc::new(OneThermostat),
        OAuthClient::new(OAuthClientConfig::new("st-secret")),
        config,
        Span::none(),
    );
    let app = router(AppState {
        handler: Arc::new(handler),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        serve(listener, app, &ServerConfig::default(), server_cancel).await
    });

    Server {
        base,
        cancel,
        handle,
    }
}

async fn token_endpoint(ok: bool) -> String {
    let reply = move |Json(body): Json<Value>| async move {
        assert_eq!(body["callbackAuthentication"]["code"], "auth-code");
        if !ok {
            return (StatusCode::UNAUTHORIZED, Json(json!({})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "headers": { "schema": "st-schema", "version": "1.0", "interactionType": "accessTokenResponse", "requestId": "x" },
                "callbackAuthentication": { "tokenType": "Bearer", "accessToken": "st-access", "refreshToken": "st-refresh", "expiresIn": 86400 }
            })),
        )
    };
    let app = Router::new().route("/oauth/token", post(reply));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/oauth/token", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    url
}

fn envelope(interaction_type: &str) -> Value {
    json!({
        "headers": {
            "schema": "st-schema",
            "version": "1.0",
            "interactionType": interaction_type,
            "requestId": "req-42"
        },
        "authentication": { "tokenType": "Bearer", "token": "google-token" }
    })
}

fn grant(token_url: &str) -> Value {
    let mut body = envelope("grantCallbackAccess");
    body["callbackAuthentication"] = json!({
        "grantType": "authorization_code",
        "scope": "callbacks",
        "code": "auth-code",
        "clientId": "st-client"
    });
    body["callbackUrls"] = json!({
        "oauthToken": token_url,
        "stateCallback": "https://c2c.smartthings.invalid/callback"
    });
    body
}

#[tokio::test]
async fn test_discovery_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path().join("oauth.json")).await;

    let response = reqwest::Client::new()
        .post(format!("{}/nest", server.base))
        .json(&envelope("discoveryRequest"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["headers"]["interactionType"], "discoveryResponse");
    assert_eq!(body["headers"]["requestId"], "req-42");
    assert_eq!(body["devices"][0]["externalDeviceId"], "DEV1");
    assert_eq!(body["devices"][0]["friendlyName"], "Den");

    server.cancel.cancel();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_rejected_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path().join("oauth.json")).await;
    let client = reqwest::Client::new();
    let url = format!("{}/nest", server.base);

    let response = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "unable to parse JSON");

    let response = client
        .post(&url)
        .header("content-type", "text/plain")
        .body(envelope("discoveryRequest").to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let mut missing_token = envelope("discoveryRequest");
    missing_token.as_object_mut().unwrap().remove("authentication");
    let response = client.post(&url).json(&missing_token).send().await.unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "input validation failed");

    let oversized = "x".repeat(200 * 1024);
    let response = client
        .post(&url)
        .header("content-type", "application/json")
        .body(oversized)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    server.cancel.cancel();
}

#[tokio::test]
async fn test_downstream_failure_is_bad_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path().join("oauth.json")).await;

    let mut body = envelope("stateRefreshRequest");
    body["devices"] = json!([{ "externalDeviceId": "GONE" }]);
    let response = reqwest::Client::new()
        .post(format!("{}/nest", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    server.cancel.cancel();
}

#[tokio::test]
async fn test_grant_callback_access_persists_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oauth.json");
    let server = start(path.clone()).await;
    let token_url = token_endpoint(true).await;

    let response = reqwest::Client::new()
        .post(format!("{}/nest", server.base))
        .json(&grant(&token_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().is_empty());

    let state = StateFile::new(&path).load().await.unwrap();
    assert_eq!(state.client_id, "st-client");
    assert_eq!(state.scope, "callbacks");
    assert_eq!(state.token_url, token_url);
    assert_eq!(state.state_callback_url, "https://c2c.smartthings.invalid/callback");
    assert_eq!(state.access_token(), "st-access");
    assert_eq!(state.refresh_token(), "st-refresh");

    server.cancel.cancel();
}

#[tokio::test]
async fn test_grant_failure_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oauth.json");
    let server = start(path.clone()).await;
    let token_url = token_endpoint(false).await;

    let response = reqwest::Client::new()
        .post(format!("{}/nest", server.base))
        .json(&grant(&token_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert!(!path.exists());

    server.cancel.cancel();
}

#[tokio::test]
async fn test_oauth_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path().join("oauth.json")).await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/oauth?client_id=abc&state=s1", server.base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 301);
    assert_eq!(
        response.headers()["location"],
        "https://nestservices.google.com/partnerconnections/proj-1/auth?client_id=abc&state=s1&access_type=offline&prompt=consent"
    );

    server.cancel.cancel();
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path().join("oauth.json")).await;

    let body: Value = reqwest::get(format!("{}/api/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "nestlink");
    assert_eq!(body["version"], nestlink_core::VERSION);

    server.cancel.cancel();
    server.handle.await.unwrap().unwrap();
}
