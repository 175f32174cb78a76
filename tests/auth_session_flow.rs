use std::collections::HashMap;

use bloggate::oauth::auth::{AuthSession, CallbackParams, OAuthConfig, Pkce};
use bloggate::oauth::storage::{FileStore, KeyValueStore};
use bloggate::oauth::{AuthError, Error, GoogleProvider};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REDIRECT_URI: &str = "http://localhost:1313/auth/callback/";
const ACCESS_TOKEN: &str = "ya29.test-access-token";

fn provider(server: &MockServer) -> GoogleProvider {
    let config = OAuthConfig::builder()
        .client_id("test-client.apps.googleusercontent.com")
        .auth_url(format!("{}/o/oauth2/v2/auth", server.uri()))
        .token_url(format!("{}/token", server.uri()))
        .userinfo_url(format!("{}/oauth2/v2/userinfo", server.uri()))
        .redirect_uri(REDIRECT_URI)
        .scopes(["openid", "email", "profile"])
        .build()
        .unwrap();
    GoogleProvider::new(config)
}

async fn open(server: &MockServer, dir: &TempDir) -> (AuthSession<GoogleProvider, FileStore>, FileStore) {
    let store = FileStore::new(dir.path().join("session.json")).unwrap();
    let auth = AuthSession::open(provider(server), store.clone()).await.unwrap();
    (auth, store)
}

fn query(url: &str) -> HashMap<String, String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

fn userinfo_body() -> serde_json::Value {
    json!({
        "id": "117426531234567890123",
        "email": "Parada.Writer@example.com",
        "verified_email": true,
        "name": "Parada Writer",
        "picture": "https://lh3.googleusercontent.com/a/photo"
    })
}

async fn mount_userinfo(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/oauth2/v2/userinfo"))
        .and(header("authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(userinfo_body()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_login_against_token_endpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=4%2F0AbCdEf"))
        .and(body_string_contains("client_id=test-client.apps.googleusercontent.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "openid email profile"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_userinfo(&server, 1).await;

    let (auth, store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();
    let params = query(&redirect.url);
    assert!(redirect.url.starts_with(&format!("{}/o/oauth2/v2/auth?", server.uri())));
    assert_eq!(params["redirect_uri"], REDIRECT_URI);

    let session = auth
        .complete_login(Some("4/0AbCdEf"), &redirect.state, None)
        .await
        .unwrap();

    assert_eq!(session.user.display_name, "Parada Writer");
    assert!(session.user.email_verified);
    assert!(auth.is_authenticated().await);
    assert_eq!(auth.current_user().await, Some(session.user.clone()));

    // The verifier sent to the token endpoint matches the challenge in the URL.
    let requests = server.received_requests().await.unwrap();
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == "/token")
        .unwrap();
    let form: HashMap<String, String> = url::form_urlencoded::parse(&token_request.body)
        .into_owned()
        .collect();
    assert_eq!(form["redirect_uri"], REDIRECT_URI);
    assert!(!form.contains_key("client_secret"));
    assert!(Pkce::verify(&form["code_verifier"], &params["code_challenge"]));

    // Persisted for the next process.
    assert!(store.contains("google:session").await.unwrap());
    assert!(!store.contains("google:oauth_attempt").await.unwrap());
    let (reopened, _) = open(&server, &dir).await;
    assert_eq!(reopened.access_token().await.as_deref(), Some(ACCESS_TOKEN));

    let record = reopened.registered_user().await.unwrap().unwrap();
    assert_eq!(record.blog_tenant, "paradawriter");
    assert_eq!(record.role, "blogger");
}

#[tokio::test]
async fn test_state_mismatch_never_reaches_token_endpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": 3599
        })))
        .expect(0)
        .mount(&server)
        .await;
    mount_userinfo(&server, 0).await;

    let (auth, store) = open(&server, &dir).await;
    auth.begin_login().await.unwrap();

    let err = auth
        .complete_login(Some("4/0AbCdEf"), "attacker-state", None)
        .await
        .unwrap_err();

    assert_eq!(err.auth(), Some(&AuthError::StateMismatch));
    assert!(!auth.is_authenticated().await);
    assert!(store.get("google:oauth_attempt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_token_endpoint_400_persists_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad Request"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_userinfo(&server, 0).await;

    let (auth, store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();

    let err = auth
        .complete_login(Some("expired-code"), &redirect.state, None)
        .await
        .unwrap_err();

    match err {
        Error::Auth(AuthError::TokenExchangeFailed(details)) => {
            assert!(details.contains("400"), "{details}");
            assert!(details.contains("invalid_grant: Bad Request"), "{details}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!auth.is_authenticated().await);
    assert!(store.get("google:session").await.unwrap().is_none());
    assert!(!dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_malformed_token_response() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .expect(1)
        .mount(&server)
        .await;
    mount_userinfo(&server, 0).await;

    let (auth, _store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();

    let err = auth
        .complete_login(Some("code"), &redirect.state, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.auth(),
        Some(AuthError::TokenExchangeFailed(_))
    ));
    assert!(!auth.is_authenticated().await);
}

#[tokio::test]
async fn test_userinfo_failure_discards_token() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v2/userinfo"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_token",
            "error_description": "Invalid Credentials"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (auth, store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();

    let err = auth
        .complete_login(Some("code"), &redirect.state, None)
        .await
        .unwrap_err();

    match err.auth() {
        Some(AuthError::ProfileFetchFailed(details)) => assert!(details.contains("401")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(auth.access_token().await.is_none());
    assert!(store.get("google:session").await.unwrap().is_none());
}

#[tokio::test]
async fn test_provider_denied_makes_no_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (auth, _store) = open(&server, &dir).await;
    auth.begin_login().await.unwrap();

    let err = auth
        .complete_login(None, "whatever", Some("access_denied"))
        .await
        .unwrap_err();

    assert_eq!(
        err.auth(),
        Some(&AuthError::ProviderDenied("access_denied".into()))
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_logout_after_login() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": 3599
        })))
        .mount(&server)
        .await;
    mount_userinfo(&server, 1).await;

    let (auth, store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();
    auth.complete_login(Some("code"), &redirect.state, None)
        .await
        .unwrap();

    auth.logout().await.unwrap();
    auth.logout().await.unwrap();

    assert!(!auth.is_authenticated().await);
    assert!(auth.current_user().await.is_none());
    assert!(store.get("google:session").await.unwrap().is_none());

    let (reopened, _) = open(&server, &dir).await;
    assert!(!reopened.is_authenticated().await);
}

#[tokio::test]
async fn test_huge_expires_in_is_exchange_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": 9_007_199_254_740_991i64
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_userinfo(&server, 0).await;

    let (auth, store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();

    let err = auth
        .complete_login(Some("code"), &redirect.state, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err.auth(),
        Some(AuthError::TokenExchangeFailed(_))
    ));
    assert!(!auth.is_authenticated().await);
    assert!(store.get("google:session").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_callbacks_exchange_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_userinfo(&server, 1).await;

    let (auth, _store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();

    let (first, second) = tokio::join!(
        auth.complete_login(Some("code"), &redirect.state, None),
        auth.complete_login(Some("code"), &redirect.state, None),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let rejected = outcomes.into_iter().find_map(|r| r.err()).unwrap();
    assert_eq!(rejected.auth(), Some(&AuthError::NoPendingAttempt));
    assert!(auth.is_authenticated().await);
}

#[tokio::test]
async fn test_denied_callback_keeps_error_code() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (auth, _store) = open(&server, &dir).await;
    let redirect = auth.begin_login().await.unwrap();

    let params = CallbackParams::from_url(&format!(
        "{REDIRECT_URI}?error=access_denied&error_description=The+user+denied+access&state={}",
        redirect.state
    ))
    .unwrap();
    let err = auth.complete_from_callback(&params).await.unwrap_err();

    assert_eq!(
        err.auth(),
        Some(&AuthError::ProviderDenied("access_denied".into()))
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}
