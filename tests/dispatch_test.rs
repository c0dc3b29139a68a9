mod common;

use asyncnet::http::transport::{BodyReader, Executing, PreparedRequest, Transport, TransportResponse};
use asyncnet::{AsyncHttpClient, HttpError, NetError, Owner, ResponseEvent};
use bytes::Bytes;
use common::{assert_lifecycle, scripted, wait_done, PendingTransport, Recorder};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn canned(status: StatusCode, content_length: Option<u64>, body: Vec<u8>) -> AsyncHttpClient {
    let transport = scripted(move |_| {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=GBK"),
        );
        let reader = Box::pin(std::io::Cursor::new(body.clone())) as BodyReader;
        Ok(TransportResponse::new(status, headers, content_length, Some(reader)))
    });
    AsyncHttpClient::builder()
        .transport(transport)
        .worker_threads(2)
        .build()
}

#[tokio::test]
async fn test_streams_body_in_chunks() {
    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let client = canned(StatusCode::OK, Some(10_000), body.clone());
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/data").send(recorder.clone()).unwrap();
    wait_done(&handle).await;

    let events = recorder.events();
    assert_lifecycle(&events);
    assert_eq!(recorder.receive_start(), Some((10_000, Some("GBK".into()))));
    let lens = recorder.segment_lens();
    assert_eq!(lens.len(), 10);
    assert!(lens[..9].iter().all(|&n| n == 1024));
    assert_eq!(lens[9], 10_000 - 9 * 1024);
    assert_eq!(recorder.success_body(), Some(Bytes::from(body)));
    assert!(handle.is_done());
}

#[tokio::test]
async fn test_custom_chunk_size() {
    let transport = scripted(|_| {
        let reader = Box::pin(std::io::Cursor::new(vec![b'x'; 1000])) as BodyReader;
        Ok(TransportResponse::new(StatusCode::OK, HeaderMap::new(), Some(1000), Some(reader)))
    });
    let client = AsyncHttpClient::builder()
        .transport(transport)
        .chunk_size(300)
        .build();
    let recorder = Recorder::unbuffered();

    let handle = client.get("http://example.test/").send(recorder.clone()).unwrap();
    wait_done(&handle).await;

    assert_eq!(recorder.segment_lens(), vec![300, 300, 300, 100]);
    // Nothing aggregated for a handler that consumes segments itself.
    assert_eq!(recorder.success_body(), Some(Bytes::new()));
}

#[tokio::test]
async fn test_status_failure_carries_body() {
    let client = canned(StatusCode::NOT_FOUND, Some(9), b"not found".to_vec());
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/missing").send(recorder.clone()).unwrap();
    wait_done(&handle).await;

    assert_eq!(
        recorder.events(),
        vec![
            ResponseEvent::Start,
            ResponseEvent::Failure {
                error: HttpError::Status {
                    status: StatusCode::NOT_FOUND,
                    body: "not found".into()
                },
                body: Some("not found".into())
            },
            ResponseEvent::Finish,
        ]
    );
    let (error, _) = recorder.failure().unwrap();
    assert_eq!(error.to_string(), "http error-statusCode:404,responseBody:not found");
}

#[tokio::test]
async fn test_transport_error_reported() {
    let transport = scripted(|_| Err(NetError::NameNotResolved));
    let client = AsyncHttpClient::builder().transport(transport).build();
    let recorder = Recorder::new();

    let handle = client.get("http://nowhere.test/").send(recorder.clone()).unwrap();
    wait_done(&handle).await;

    assert_eq!(
        recorder.events(),
        vec![
            ResponseEvent::Start,
            ResponseEvent::Failure {
                error: HttpError::Net(NetError::NameNotResolved),
                body: None
            },
            ResponseEvent::Finish,
        ]
    );
}

#[tokio::test]
async fn test_forced_cancel_interrupts_connect() {
    let client = AsyncHttpClient::builder()
        .transport(Arc::new(PendingTransport))
        .build();
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/slow").send(recorder.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.cancel(true));
    wait_done(&handle).await;

    assert_eq!(
        recorder.events(),
        vec![
            ResponseEvent::Start,
            ResponseEvent::Failure {
                error: HttpError::Interrupted,
                body: None
            },
            ResponseEvent::Finish,
        ]
    );
    assert!(handle.is_cancelled());
    assert!(!handle.cancel(true));
}

/// Body served from a duplex pipe the test writes into.
fn piped(content_length: u64) -> (AsyncHttpClient, tokio::io::DuplexStream) {
    let (writer, reader) = tokio::io::duplex(64 * 1024);
    let reader = Mutex::new(Some(reader));
    let transport = scripted(move |_| {
        let body = reader
            .lock()
            .unwrap()
            .take()
            .map(|r| Box::pin(r) as BodyReader);
        Ok(TransportResponse::new(StatusCode::OK, HeaderMap::new(), Some(content_length), body))
    });
    let client = AsyncHttpClient::builder().transport(transport).build();
    (client, writer)
}

async fn wait_for_segments(recorder: &Recorder, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while recorder.segment_lens().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("segments did not arrive");
}

#[tokio::test]
async fn test_soft_cancel_stops_before_next_read() {
    let (client, mut writer) = piped(8192);
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/").send(recorder.clone()).unwrap();
    writer.write_all(&[1u8; 1024]).await.unwrap();
    wait_for_segments(&recorder, 1).await;

    assert!(handle.cancel(false));
    // The read already in progress completes, then the cancel is observed.
    writer.write_all(&[2u8; 100]).await.unwrap();
    wait_done(&handle).await;

    let events = recorder.events();
    assert_lifecycle(&events);
    assert_eq!(recorder.segment_lens(), vec![1024]);
    assert_eq!(recorder.failure(), Some((HttpError::Interrupted, None)));
    assert!(!events.contains(&ResponseEvent::ReceiveEnd));
}

#[tokio::test]
async fn test_forced_cancel_interrupts_blocked_read() {
    let (client, mut writer) = piped(8192);
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/").send(recorder.clone()).unwrap();
    writer.write_all(&[1u8; 1024]).await.unwrap();
    wait_for_segments(&recorder, 1).await;

    assert!(handle.cancel(true));
    wait_done(&handle).await;

    assert_eq!(recorder.failure(), Some((HttpError::Interrupted, None)));
    assert_lifecycle(&recorder.events());
    drop(writer);
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let client = canned(StatusCode::OK, Some(3), b"abc".to_vec());
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/").send(recorder.clone()).unwrap();
    wait_done(&handle).await;
    let before = recorder.events();

    assert!(!handle.cancel(true));
    assert!(!handle.is_cancelled());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.events(), before);
}

#[tokio::test]
async fn test_cancel_all_for_owner() {
    let client = AsyncHttpClient::builder()
        .transport(Arc::new(PendingTransport))
        .build();
    let owner = Owner::new();
    let other = Owner::new();

    let first = Recorder::new();
    let second = Recorder::new();
    let bystander = Recorder::new();
    let h1 = client.get("http://example.test/1").owner(&owner).send(first.clone()).unwrap();
    let h2 = client.get("http://example.test/2").owner(&owner).send(second.clone()).unwrap();
    let h3 = client.get("http://example.test/3").owner(&other).send(bystander.clone()).unwrap();

    assert_eq!(client.cancel_all(&owner, true), 2);
    wait_done(&h1).await;
    wait_done(&h2).await;

    for recorder in [&first, &second] {
        assert_eq!(recorder.failure(), Some((HttpError::Interrupted, None)));
        assert_lifecycle(&recorder.events());
    }
    assert!(!h3.is_done());
    assert!(bystander.failure().is_none());

    // The owner was forgotten.
    assert_eq!(client.cancel_all(&owner, true), 0);
    assert_eq!(client.cancel_all(&other, true), 1);
    wait_done(&h3).await;
}

#[tokio::test]
async fn test_cancel_all_skips_completed() {
    let client = canned(StatusCode::OK, Some(2), b"ok".to_vec());
    let owner = Owner::new();
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/").owner(&owner).send(recorder.clone()).unwrap();
    wait_done(&handle).await;

    assert_eq!(client.cancel_all(&owner, false), 0);
    assert!(recorder.failure().is_none());
}

/// Answers with `body` after a delay, without blocking the worker.
struct SlowTransport {
    delay: Duration,
    body: &'static [u8],
}

impl Transport for SlowTransport {
    fn execute<'a>(&'a self, _request: &'a PreparedRequest) -> Executing<'a> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            let reader = Box::pin(std::io::Cursor::new(self.body.to_vec())) as BodyReader;
            let length = Some(self.body.len() as u64);
            Ok(TransportResponse::new(StatusCode::OK, HeaderMap::new(), length, Some(reader)))
        })
    }
}

#[tokio::test]
async fn test_dropping_client_keeps_request_running() {
    let client = AsyncHttpClient::builder()
        .transport(Arc::new(SlowTransport {
            delay: Duration::from_millis(200),
            body: b"still here",
        }))
        .worker_threads(1)
        .build();
    let recorder = Recorder::new();

    let handle = client.get("http://example.test/").direct().send(recorder.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(client);
    wait_done(&handle).await;

    assert_lifecycle(&recorder.events());
    assert_eq!(recorder.success_body(), Some(Bytes::from_static(b"still here")));
    assert!(handle.is_done());
    assert!(!handle.is_cancelled());
}

#[test]
fn test_temporary_client_delivers_finish() {
    let recorder = Recorder::new();
    let handle = AsyncHttpClient::builder()
        .transport(Arc::new(SlowTransport {
            delay: Duration::from_millis(50),
            body: b"ok",
        }))
        .build()
        .get("http://example.test/")
        .direct()
        .send(recorder.clone())
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !recorder.is_finished() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_lifecycle(&recorder.events());
    assert!(handle.is_done());
}
