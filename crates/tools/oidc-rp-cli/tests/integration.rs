use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::Parser;
use oidc_rp_cli::cli::{Args, is_failure};
use oidc_rp_cli::error::ToolError;
use ras_identity_oidc::OidcError;
use serde_json::{Value, json};
use std::io::Write;
use tempfile::NamedTempFile;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(server: &MockServer) -> NamedTempFile {
    write_config_with(server, "")
}

/// Config file with extra keys appended to the `[rp]` table
fn write_config_with(server: &MockServer, extra_rp: &str) -> NamedTempFile {
    let uri = server.uri();
    let contents = format!(
        r#"
[rp]
client_id = "cli-client"
client_secret = "cli-secret"
redirect_uri = "http://localhost:8080/callback"
authorization_endpoint = "{uri}/authorize"
token_endpoint = "{uri}/token"
userinfo_endpoint = "{uri}/userinfo"
expected_issuer = "{uri}"
{extra_rp}

[logging]
level = "info"
"#
    );

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn id_token(issuer: &str, audience: &str, nonce: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let exp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "iss": issuer,
            "sub": "user-42",
            "aud": audience,
            "exp": exp,
            "iat": exp - 3600,
            "nonce": nonce
        })
        .to_string(),
    );
    format!("{header}.{payload}.")
}

async fn run(config: &NamedTempFile, command: &[&str]) -> Result<Value, ToolError> {
    let mut argv = vec!["oidc-rp", "--config", config.path().to_str().unwrap()];
    argv.extend_from_slice(command);
    Args::try_parse_from(argv).unwrap().run().await
}

#[tokio::test]
async fn test_authorize_prints_url_and_secrets() {
    let server = MockServer::start().await;
    let config = write_config(&server);

    let output = run(&config, &["authorize", "--pkce"]).await.unwrap();

    let url = output["authorization_url"].as_str().unwrap();
    let state = output["state"].as_str().unwrap();
    assert!(url.starts_with(&format!("{}/authorize?", server.uri())));
    assert!(url.contains(&format!("state={state}")));
    assert!(url.contains("code_challenge_method=S256"));
    assert!(output["code_verifier"].is_string());
    assert_eq!(output["secure"], json!(true));
}

#[tokio::test]
async fn test_callback_exchanges_code() {
    let server = MockServer::start().await;
    let config = write_config(&server);

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("client_secret=cli-secret"))
        .and(body_string_contains("code_verifier=kept-verifier"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "id_token": id_token(&server.uri(), "cli-client", "n-1")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(
        &config,
        &[
            "callback",
            "/callback?code=abc&state=s-1",
            "--state",
            "s-1",
            "--nonce",
            "n-1",
            "--code-verifier",
            "kept-verifier",
        ],
    )
    .await
    .unwrap();

    assert!(!is_failure(&output));
    assert_eq!(output["result"]["token_response"]["access_token"], "at-1");
    assert_eq!(output["id_token_valid"], json!(true));
}

#[tokio::test]
async fn test_configured_pkce_requires_verifier_on_callback() {
    let server = MockServer::start().await;
    let config = write_config_with(&server, "use_pkce = true");

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "token_type": "Bearer"
        })))
        .expect(0)
        .mount(&server)
        .await;

    let output = run(&config, &["authorize"]).await.unwrap();
    assert!(output["code_verifier"].is_string());
    assert!(
        output["authorization_url"]
            .as_str()
            .unwrap()
            .contains("code_challenge_method=S256")
    );

    let err = run(
        &config,
        &["callback", "/callback?code=abc&state=s-1", "--state", "s-1", "--nonce", "n-1"],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ToolError::InvalidSetting(_)));
}

#[tokio::test]
async fn test_configured_verifier_is_sent_on_callback() {
    let server = MockServer::start().await;
    let config = write_config_with(
        &server,
        "use_pkce = true\ncode_verifier = \"persisted-verifier\"",
    );

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code_verifier=persisted-verifier"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(
        &config,
        &["callback", "/callback?code=abc&state=s-1", "--state", "s-1", "--nonce", "n-1"],
    )
    .await
    .unwrap();
    assert!(!is_failure(&output));
}

#[tokio::test]
async fn test_callback_state_mismatch_is_failure() {
    let server = MockServer::start().await;
    let config = write_config(&server);

    let output = run(
        &config,
        &["callback", "/callback?code=abc&state=forged", "--state", "s-1", "--nonce", "n-1"],
    )
    .await
    .unwrap();

    assert!(is_failure(&output));
    assert_eq!(output["result"]["error"], "invalid_state");
}

#[tokio::test]
async fn test_validate_reports_reason() {
    let server = MockServer::start().await;
    let config = write_config(&server);

    let good = id_token(&server.uri(), "cli-client", "n-1");
    let output = run(&config, &["validate", &good, "--nonce", "n-1"]).await.unwrap();
    assert_eq!(output["valid"], json!(true));
    assert_eq!(output["claims"]["sub"], "user-42");

    let foreign = id_token(&server.uri(), "someone-else", "n-1");
    let output = run(&config, &["validate", &foreign, "--nonce", "n-1"]).await.unwrap();
    assert_eq!(output["valid"], json!(false));
    assert!(output["reason"].as_str().unwrap().contains("audience"));
}

#[tokio::test]
async fn test_userinfo_and_refresh() {
    let server = MockServer::start().await;
    let config = write_config(&server);

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("Authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "user-42",
            "email": "user@example.com"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let output = run(&config, &["userinfo", "at-1"]).await.unwrap();
    assert_eq!(output["email"], "user@example.com");

    let output = run(&config, &["refresh", "rt-1"]).await.unwrap();
    assert_eq!(output["access_token"], "at-2");
}

#[tokio::test]
async fn test_discover_uses_configured_issuer() {
    let server = MockServer::start().await;
    let config = write_config(&server);
    let issuer = server.uri();

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/authorize"),
            "token_endpoint": format!("{issuer}/token"),
            "jwks_uri": format!("{issuer}/jwks"),
            "code_challenge_methods_supported": ["S256"]
        })))
        .mount(&server)
        .await;

    let output = run(&config, &["discover"]).await.unwrap();
    assert_eq!(output["pkce_s256_supported"], json!(true));
    assert_eq!(output["rp"]["use_pkce"], json!(true));
    assert_eq!(output["metadata"]["issuer"], issuer);
    assert_eq!(output["rp"]["client_id"], "cli-client");
    assert_eq!(output["rp"]["jwks_uri"], format!("{issuer}/jwks"));
}

#[tokio::test]
async fn test_incomplete_configuration() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(b"[rp]\nclient_id = \"cli-client\"\n").unwrap();

    let err = run(&file, &["authorize"]).await.unwrap_err();
    assert!(matches!(
        err,
        ToolError::Oidc(OidcError::MissingConfigField("redirect_uri"))
    ));
}
