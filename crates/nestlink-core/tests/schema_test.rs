//! Wire format tests against captured ST-Schema payloads.

use nestlink_core::{
    DiscoveryDevice, GlobalErrorKind, InteractionType, SchemaRequest, SchemaResponse,
};
use serde_json::json;

#[test]
fn test_interaction_result_request_decodes() {
    let request: SchemaRequest = serde_json::from_value(json!({
        "headers": {
            "schema": "st-schema",
            "version": "1.0",
            "interactionType": "interactionResult",
            "requestId": "abc-123"
        },
        "authentication": { "tokenType": "Bearer", "token": "token" },
        "originatingInteractionType": "stateRefreshResponse",
        "globalError": { "errorEnum": "BAD-REQUEST", "detail": "missing states" },
        "deviceState": [{
            "externalDeviceId": "dev-1",
            "deviceError": [{ "errorEnum": "SOMETHING-NEW", "detail": "odd" }]
        }]
    }))
    .unwrap();

    assert!(request.validate().is_ok());
    assert_eq!(
        request.originating_interaction_type,
        Some(InteractionType::StateRefreshResponse)
    );
    assert_eq!(
        request.global_error.as_ref().map(|e| e.error_enum),
        Some(GlobalErrorKind::BadRequest)
    );
    assert_eq!(request.device_state[0].device_error.len(), 1);
}

#[test]
fn test_grant_callback_access_decodes() {
    let request: SchemaRequest = serde_json::from_value(json!({
        "headers": {
            "schema": "st-schema",
            "version": "1.0",
            "interactionType": "grantCallbackAccess",
            "requestId": "grant-1"
        },
        "callbackAuthentication": {
            "grantType": "authorization_code",
            "scope": "callbacks",
            "code": "xyz",
            "clientId": "st-client"
        },
        "callbackUrls": {
            "oauthToken": "https://example.invalid/token",
            "stateCallback": "https://example.invalid/state"
        }
    }))
    .unwrap();

    assert!(request.validate().is_ok());
    let urls = request.callback_urls.unwrap();
    assert_eq!(urls.oauth_token, "https://example.invalid/token");
    assert_eq!(urls.state_callback, "https://example.invalid/state");
}

#[test]
fn test_discovery_response_shape() {
    let request: SchemaRequest = serde_json::from_value(json!({
        "headers": {
            "schema": "st-schema",
            "version": "1.0",
            "interactionType": "discoveryRequest",
            "requestId": "disc-1"
        },
        "authentication": { "tokenType": "Bearer", "token": "token" }
    }))
    .unwrap();

    let response = SchemaResponse::discovery(
        &request.headers,
        vec![DiscoveryDevice::thermostat("dev-1", Some("Hallway".into()))],
    );
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["headers"]["interactionType"], "discoveryResponse");
    assert_eq!(value["headers"]["requestId"], "disc-1");
    let device = &value["devices"][0];
    assert_eq!(device["externalDeviceId"], "dev-1");
    assert_eq!(device["deviceUniqueId"], "dev-1");
    assert_eq!(device["friendlyName"], "Hallway");
    assert_eq!(
        device["deviceHandlerType"],
        "bd2e8c4a-0e4b-475f-b8ff-273fb5f5cef5"
    );
    assert_eq!(device["manufacturerInfo"]["manufacturerName"], "Google");
    assert_eq!(device["manufacturerInfo"]["modelName"], "Nest Thermostat");
}

#[test]
fn test_empty_discovery_keeps_devices_array() {
    let request = SchemaRequest::default();
    let response = SchemaResponse::discovery(&request.headers, vec![]);
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["devices"], json!([]));
}
