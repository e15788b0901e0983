use futures::future::join_all;
use httpmock::prelude::*;
use reqwest::StatusCode;
use serde_json::json;

use unique_counter::store::DedupStore;

mod common;
use common::ServerHandle;

#[tokio::test]
async fn it_counts_distinct_ids_per_window() -> anyhow::Result<()> {
    let server = ServerHandle::new().await;

    for id in ["a", "a", "b"] {
        let res = server.accept(&[("id", id)]).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await?, "ok");
    }

    let message = server.aggregator.rotate().await.expect("rotation failed");
    assert_eq!(message.unique_count, 2);

    let published = server.publisher.messages();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key(), "1700000060");
    assert_eq!(published[0].payload(), "Unique requests in last minute: 2");

    // The next window starts empty, ids from the last one count again
    server.accept(&[("id", "a")]).await;
    server.aggregator.rotate().await;
    assert_eq!(server.publisher.messages()[1].unique_count, 1);

    Ok(())
}

#[tokio::test]
async fn it_counts_concurrent_submissions_once() -> anyhow::Result<()> {
    let server = ServerHandle::new().await;

    let ids: Vec<String> = (0..50).map(|i| format!("id-{}", i % 10)).collect();
    let handle = &server;
    let responses = join_all(
        ids.iter()
            .map(|id| async move { handle.accept(&[("id", id.as_str())]).await }),
    )
    .await;
    assert!(responses.iter().all(|r| r.status() == StatusCode::OK));

    let message = server.aggregator.rotate().await.expect("rotation failed");
    assert_eq!(message.unique_count, 10);

    Ok(())
}

#[tokio::test]
async fn it_rejects_requests_without_an_id() -> anyhow::Result<()> {
    let mock = MockServer::start_async().await;
    let hook = mock
        .mock_async(|when, then| {
            when.path("/hook");
            then.status(200);
        })
        .await;
    let server = ServerHandle::new().await;

    let endpoint = mock.url("/hook");
    let res = server
        .accept(&[("endpoint", endpoint.as_str()), ("method", "POST")])
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.store.cardinality().await?, 0);
    assert_eq!(hook.hits_async().await, 0);
    server.aggregator.rotate().await;
    assert_eq!(server.publisher.messages()[0].unique_count, 0);

    Ok(())
}

#[tokio::test]
async fn it_posts_the_live_count_to_the_endpoint() -> anyhow::Result<()> {
    let mock = MockServer::start_async().await;
    let hook = mock
        .mock_async(|when, then| {
            when.method(POST)
                .path("/hook")
                .json_body(json!({"unique_count": 1}));
            then.status(200);
        })
        .await;
    let server = ServerHandle::new().await;

    let endpoint = mock.url("/hook");
    let res = server
        .accept(&[("id", "x"), ("endpoint", endpoint.as_str()), ("method", "POST")])
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await?, "ok");

    hook.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn it_forwards_duplicates_with_get() -> anyhow::Result<()> {
    let mock = MockServer::start_async().await;
    let hook = mock
        .mock_async(|when, then| {
            when.method(GET).path("/hook").query_param("count", "1");
            then.status(204);
        })
        .await;
    let server = ServerHandle::new().await;

    let endpoint = mock.url("/hook");
    server.accept(&[("id", "x")]).await;
    let res = server
        .accept(&[("id", "x"), ("endpoint", endpoint.as_str())])
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    hook.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn it_acknowledges_when_the_endpoint_is_down() -> anyhow::Result<()> {
    let server = ServerHandle::new().await;

    // Nothing listens on port 1
    let res = server
        .accept(&[
            ("id", "x"),
            ("endpoint", "http://127.0.0.1:1/hook"),
            ("method", "POST"),
        ])
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await?, "ok");
    assert!(server.store.contains("x"));

    Ok(())
}

#[tokio::test]
async fn it_acknowledges_when_the_store_is_down() -> anyhow::Result<()> {
    let server = ServerHandle::new().await;
    server.store.set_unavailable(true);

    let res = server.accept(&[("id", "x")]).await;
    assert_eq!(res.status(), StatusCode::OK);

    // The window's count is lost, nothing is published
    assert!(server.aggregator.rotate().await.is_none());
    assert!(server.publisher.messages().is_empty());

    Ok(())
}
