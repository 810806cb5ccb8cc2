//! reCAPTCHA widget verification against a local stand-in for the verify endpoint.

use std::collections::BTreeMap;

use axum::extract::Form;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use jcu_common::error::WidgetError;
use jcu_common::identity::RequestContext;
use jcu_common::settings::Settings;
use jcu_common::widgets::{RecaptchaWidget, RECAPTCHA_PRIVATE_KEY, RECAPTCHA_PUBLIC_KEY, RECAPTCHA_TIMEOUT};

// Accepts the answer "reef" for private key "priv"; anything else is wrong.
async fn verify(Form(form): Form<BTreeMap<String, String>>) -> (StatusCode, String) {
    if form.get("privatekey").map(String::as_str) != Some("priv") {
        return (StatusCode::OK, "false\ninvalid-site-private-key".into());
    }
    if form.get("remoteip").map(String::as_str) != Some("10.0.0.7") {
        return (StatusCode::OK, "false\n'missing remote ip'".into());
    }
    match form.get("response").map(String::as_str) {
        Some("reef") => (StatusCode::OK, "true\nsuccess".into()),
        Some("boom") => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
        _ => (StatusCode::OK, "false\nincorrect-captcha-sol".into()),
    }
}

async fn spawn_verifier() -> String {
    let app = Router::new().route("/verify", post(verify));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/verify")
}

fn widget(url: &str) -> RecaptchaWidget {
    let settings = Settings::from_pairs([
        (RECAPTCHA_PUBLIC_KEY, "pub"),
        (RECAPTCHA_PRIVATE_KEY, "priv"),
        (RECAPTCHA_TIMEOUT, "2"),
    ]);
    let request = RequestContext { remote_addr: Some("10.0.0.7".into()), ..RequestContext::anonymous() };
    RecaptchaWidget::for_request(&settings, &request).unwrap().with_verify_url(url)
}

fn submission(response: &str) -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from([
        ("recaptcha_challenge_field".to_string(), "challenge-token".to_string()),
        ("recaptcha_response_field".to_string(), response.to_string()),
    ]))
}

#[tokio::test]
async fn correct_answer_passes_through() {
    let url = spawn_verifier().await;
    let out = widget(&url).deserialize(submission("reef")).await.unwrap();
    assert_eq!(out, submission("reef"));
}

#[tokio::test]
async fn wrong_answer_asks_to_retry() {
    let url = spawn_verifier().await;
    let err = widget(&url).deserialize(submission("coral")).await.unwrap_err();
    assert_eq!(err, WidgetError::Invalid("Please retry and enter the characters you see below.".into()));
}

#[tokio::test]
async fn server_error_is_reported_with_status() {
    let url = spawn_verifier().await;
    let err = widget(&url).deserialize(submission("boom")).await.unwrap_err();
    assert_eq!(err, WidgetError::Invalid("There was an error talking to the reCAPTCHA server503".into()));
}

#[tokio::test]
async fn unreachable_service_is_reported() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = widget(&format!("http://{addr}/verify")).deserialize(submission("reef")).await.unwrap_err();
    assert_eq!(err, WidgetError::Invalid("Could not connect to the CAPTCHA service.".into()));
}
