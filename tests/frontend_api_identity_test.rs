//! Integration tests for the frontend-API identity provider over real HTTP.

use idmirror::adapters::FrontendApiIdentity;
use idmirror::traits::{IdentityError, IdentityProvider, SignupAttributes, VerificationStatus};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn attributes() -> SignupAttributes {
    SignupAttributes {
        username: "cool_fox42".to_string(),
        first_name: "Fox".to_string(),
        last_name: "Mulder".to_string(),
        email_address: "fox@example.com".to_string(),
        password: "trustno1".to_string(),
    }
}

#[tokio::test]
async fn test_acquire_credential_for_template() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sessions/sess_1/tokens/supabase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jwt": "eyJ.payload.sig" })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = FrontendApiIdentity::new(server.uri()).with_session("sess_1");
    let token = identity.acquire_credential("supabase").await.unwrap();
    assert_eq!(token.as_deref(), Some("eyJ.payload.sig"));
}

#[tokio::test]
async fn test_acquire_without_session_makes_no_request() {
    let server = MockServer::start().await;
    let identity = FrontendApiIdentity::new(server.uri());

    assert_eq!(identity.acquire_credential("supabase").await.unwrap(), None);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ended_session_yields_no_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sessions/sess_1/tokens/supabase"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{ "code": "resource_not_found", "message": "not found" }]
        })))
        .mount(&server)
        .await;

    let identity = FrontendApiIdentity::new(server.uri()).with_session("sess_1");
    assert_eq!(identity.acquire_credential("supabase").await.unwrap(), None);
}

#[tokio::test]
async fn test_signup_creates_and_prepares_email_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sign_ups"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=cool_fox42"))
        .and(body_string_contains("email_address=fox%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "id": "sua_1", "status": "missing_requirements" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sign_ups/sua_1/prepare_verification"))
        .and(body_string_contains("strategy=email_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "id": "sua_1", "status": "missing_requirements" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = FrontendApiIdentity::new(server.uri());
    let signup_id = identity.create_pending_signup(&attributes()).await.unwrap();
    assert_eq!(signup_id, "sua_1");
}

#[tokio::test]
async fn test_signup_rejection_surfaces_long_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sign_ups"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": [{
                "code": "form_identifier_exists",
                "message": "taken",
                "long_message": "That email address is taken. Please try another."
            }]
        })))
        .mount(&server)
        .await;

    let identity = FrontendApiIdentity::new(server.uri());
    let err = identity.create_pending_signup(&attributes()).await.unwrap_err();
    assert!(matches!(err, IdentityError::Rejected { .. }));
    assert_eq!(
        err.user_message(),
        "That email address is taken. Please try another."
    );
}

#[tokio::test]
async fn test_verify_code_complete_then_activate_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sign_ups/sua_1/attempt_verification"))
        .and(body_string_contains("code=424242"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "id": "sua_1",
                "status": "complete",
                "created_user_id": "user_1",
                "created_session_id": "sess_9"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sessions/sess_9/touch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": { "id": "sess_9" } })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = FrontendApiIdentity::new(server.uri());
    let outcome = identity.verify_code("sua_1", "424242").await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Complete);
    assert_eq!(outcome.created_identity_id.as_deref(), Some("user_1"));

    identity
        .establish_session(outcome.created_session_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(identity.session_id().as_deref(), Some("sess_9"));
}

#[tokio::test]
async fn test_verify_code_incomplete_is_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sign_ups/sua_1/attempt_verification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "id": "sua_1", "status": "missing_requirements" }
        })))
        .mount(&server)
        .await;

    let identity = FrontendApiIdentity::new(server.uri());
    let outcome = identity.verify_code("sua_1", "000000").await.unwrap();
    assert!(!outcome.is_complete());
    assert!(outcome.created_identity_id.is_none());
}
