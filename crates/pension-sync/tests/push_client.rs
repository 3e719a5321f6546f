//! 모의 백엔드를 상대로 한 전송 클라이언트 테스트.

use mockito::Matcher;
use pension_core::{AssetForecast, PushMethod, SyncConfig};
use pension_sync::{PredictionSink, PushClient};
use serde_json::json;

fn forecast(id: &str, value: f64) -> AssetForecast {
    AssetForecast {
        asset_id: id.to_string(),
        predicted_return: value,
        sequence: Some(value),
        trend: Some(value),
        lower: None,
        upper: None,
        clamped: false,
    }
}

fn config(base_url: String) -> SyncConfig {
    SyncConfig {
        enabled: true,
        base_url,
        token: Some("test-token".to_string()),
        timeout_secs: 5,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_push_sends_profit_array_with_auth() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/pension/update-profit")
        .match_header("authorization", "A103 test-token")
        .match_body(Matcher::Json(json!([
            {"id": "etf_1", "profit": 0.05},
            {"id": "fund_2", "profit": -0.01}
        ])))
        .with_status(200)
        .create_async()
        .await;

    let client = PushClient::new(&config(server.url())).unwrap();
    let outcome = client
        .push(&[forecast("etf_1", 0.05), forecast("fund_2", -0.01)])
        .await;

    mock.assert_async().await;
    assert!(outcome.success);
    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.sent, 2);
}

#[tokio::test]
async fn test_post_method() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/pension/update-profit")
        .with_status(201)
        .create_async()
        .await;

    let mut cfg = config(server.url());
    cfg.method = PushMethod::Post;
    let outcome = PushClient::new(&cfg)
        .unwrap()
        .publish(&[forecast("etf_1", 0.02)])
        .await;

    mock.assert_async().await;
    assert!(outcome.success);
    assert_eq!(outcome.status, Some(201));
}

#[tokio::test]
async fn test_server_error_is_soft_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("PUT", "/pension/update-profit")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let client = PushClient::new(&config(server.url())).unwrap();
    let outcome = client.push(&[forecast("etf_1", 0.05)]).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, Some(500));
    assert!(outcome.message.contains("boom"));
    assert_eq!(outcome.sent, 0);
}

#[tokio::test]
async fn test_unreachable_backend_is_soft_failure() {
    // 사용되지 않는 포트
    let client = PushClient::new(&config("http://127.0.0.1:9".to_string())).unwrap();
    let outcome = client.push(&[forecast("etf_1", 0.05)]).await;

    assert!(!outcome.success);
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn test_disabled_and_empty_skip_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/pension/update-profit")
        .expect(0)
        .create_async()
        .await;

    let mut cfg = config(server.url());
    let client = PushClient::new(&cfg).unwrap();
    let outcome = client.push(&[]).await;
    assert!(outcome.success);
    assert_eq!(outcome.sent, 0);

    cfg.enabled = false;
    let disabled = PushClient::new(&cfg).unwrap();
    assert!(!disabled.is_enabled());
    assert!(!disabled.push(&[forecast("etf_1", 0.05)]).await.success);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_health_check() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/").with_status(200).create_async().await;

    let client = PushClient::new(&config(server.url())).unwrap();
    assert!(client.health_check().await);
}
