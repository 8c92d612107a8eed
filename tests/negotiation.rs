//! End-to-end negotiation over a real connection.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use response_pipeline::config::SelectionPolicy;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_gzip_json_round_trip() {
    let media = tempfile::tempdir().unwrap();
    let server = common::start_server(media.path(), |_| {}).await;

    let res = common::client()
        .get(server.url("/api/echo?q=1"))
        .header(ACCEPT, "application/json")
        .header(ACCEPT_ENCODING, "gzip")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(res.headers()[CONTENT_ENCODING], "gzip");
    assert!(res.headers().contains_key("x-request-id"));

    let body = res.bytes().await.unwrap();
    let mut plain = Vec::new();
    GzDecoder::new(&body[..]).read_to_end(&mut plain).unwrap();
    let echo: Value = serde_json::from_slice(&plain).unwrap();
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["path"], "/api/echo");
    assert_eq!(echo["query"], "q=1");
}

#[tokio::test]
async fn test_video_stream_is_exact_and_uncompressed() {
    let media = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..1_000_000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::File::create(media.path().join("motion.mp4"))
        .unwrap()
        .write_all(&data)
        .unwrap();
    let server = common::start_server(media.path(), |_| {}).await;

    let res = common::client()
        .get(server.url("/media/motion.mp4"))
        .header(ACCEPT, "video/mp4")
        .header(ACCEPT_ENCODING, "gzip, deflate")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(res.headers()[CONTENT_LENGTH], "1000000");
    assert_eq!(res.headers()["content-disposition"], "inline; filename=motion.mpeg4");
    assert!(!res.headers().contains_key(CONTENT_ENCODING));

    let body = res.bytes().await.unwrap();
    assert_eq!(body.len(), data.len());
    assert!(body[..] == data[..]);
}

#[tokio::test]
async fn test_stream_request_for_structured_content_aborts() {
    let media = tempfile::tempdir().unwrap();
    let server = common::start_server(media.path(), |_| {}).await;

    let res = common::client()
        .get(server.url("/health"))
        .header(ACCEPT, "video/mp4")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_no_preferences_serves_plain_text() {
    let media = tempfile::tempdir().unwrap();
    let server = common::start_server(media.path(), |_| {}).await;

    let res = common::client().get(server.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "text/plain");
    assert!(!res.headers().contains_key(CONTENT_ENCODING));
    let text = res.text().await.unwrap();
    assert!(text.starts_with("response-pipeline"));
}

#[tokio::test]
async fn test_last_match_policy_follows_token_order() {
    let media = tempfile::tempdir().unwrap();
    let server = common::start_server(media.path(), |config| {
        config.compression.policy = SelectionPolicy::LastMatch;
    })
    .await;

    let res = common::client()
        .get(server.url("/health"))
        .header(ACCEPT, "application/json")
        .header(ACCEPT_ENCODING, "gzip")
        .header(ACCEPT_ENCODING, "deflate")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_ENCODING], "deflate");
}
