//! Shared helpers for integration tests.
#![allow(dead_code)]

use asyncnet::http::transport::{Executing, PreparedRequest, Transport, TransportResponse};
use asyncnet::{HttpError, NetError, ResponseEvent, ResponseHandler};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Records every callback as a `ResponseEvent`, with the thread it ran on.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<ResponseEvent>>,
    threads: Mutex<Vec<Option<String>>>,
    unbuffered: bool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unbuffered() -> Arc<Self> {
        Arc::new(Self {
            unbuffered: true,
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<ResponseEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn thread_names(&self) -> Vec<Option<String>> {
        self.threads.lock().unwrap().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.events.lock().unwrap().contains(&ResponseEvent::Finish)
    }

    pub fn segment_lens(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::ReceiveSegment(b) => Some(b.len()),
                _ => None,
            })
            .collect()
    }

    pub fn success_body(&self) -> Option<Bytes> {
        self.events().into_iter().find_map(|e| match e {
            ResponseEvent::Success(body) => Some(body),
            _ => None,
        })
    }

    pub fn failure(&self) -> Option<(HttpError, Option<String>)> {
        self.events().into_iter().find_map(|e| match e {
            ResponseEvent::Failure { error, body } => Some((error, body)),
            _ => None,
        })
    }

    pub fn receive_start(&self) -> Option<(u64, Option<String>)> {
        self.events().into_iter().find_map(|e| match e {
            ResponseEvent::ReceiveStart {
                content_length,
                charset,
            } => Some((content_length, charset)),
            _ => None,
        })
    }

    fn push(&self, event: ResponseEvent) {
        self.threads
            .lock()
            .unwrap()
            .push(std::thread::current().name().map(str::to_string));
        self.events.lock().unwrap().push(event);
    }
}

impl ResponseHandler for Recorder {
    fn on_start(&self) {
        self.push(ResponseEvent::Start);
    }
    fn on_receive_start(&self, content_length: u64, charset: Option<&str>) {
        self.push(ResponseEvent::ReceiveStart {
            content_length,
            charset: charset.map(str::to_string),
        });
    }
    fn on_receive_segment(&self, segment: &Bytes) {
        self.push(ResponseEvent::ReceiveSegment(segment.clone()));
    }
    fn on_receive_end(&self) {
        self.push(ResponseEvent::ReceiveEnd);
    }
    fn on_success(&self, body: &Bytes) {
        self.push(ResponseEvent::Success(body.clone()));
    }
    fn on_failure(&self, error: &HttpError, body: Option<&str>) {
        self.push(ResponseEvent::Failure {
            error: error.clone(),
            body: body.map(str::to_string),
        });
    }
    fn on_finish(&self) {
        self.push(ResponseEvent::Finish);
    }
    fn buffer_body(&self) -> bool {
        !self.unbuffered
    }
}

/// Check the ordering guarantees every completed request must satisfy.
pub fn assert_lifecycle(events: &[ResponseEvent]) {
    assert_eq!(events.first(), Some(&ResponseEvent::Start), "{events:?}");
    assert_eq!(events.last(), Some(&ResponseEvent::Finish), "{events:?}");
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1, "{events:?}");
    assert_eq!(
        events.iter().filter(|e| **e == ResponseEvent::Finish).count(),
        1,
        "{events:?}"
    );
    assert!(events[events.len() - 2].is_terminal(), "{events:?}");

    let pos = |name: &str| events.iter().position(|e| e.name() == name);
    if let Some(success) = pos("success") {
        let start = pos("receive_start").expect("receive_start before success");
        let end = pos("receive_end").expect("receive_end before success");
        assert!(start < end && end < success, "{events:?}");
        for (i, e) in events.iter().enumerate() {
            if matches!(e, ResponseEvent::ReceiveSegment(_)) {
                assert!(start < i && i < end, "{events:?}");
            }
        }
    }
}

/// Wait until `handle` has emitted its last event.
pub async fn wait_done(handle: &asyncnet::RequestHandle) {
    tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("request did not finish in time");
}

/// Transport that answers from a closure.
pub struct FnTransport<F>(F);

pub fn scripted<F>(respond: F) -> Arc<dyn Transport>
where
    F: Fn(&PreparedRequest) -> Result<TransportResponse, NetError> + Send + Sync + 'static,
{
    Arc::new(FnTransport(respond))
}

impl<F> Transport for FnTransport<F>
where
    F: Fn(&PreparedRequest) -> Result<TransportResponse, NetError> + Send + Sync + 'static,
{
    fn execute<'a>(&'a self, request: &'a PreparedRequest) -> Executing<'a> {
        let result = (self.0)(request);
        Box::pin(async move { result })
    }
}

/// Transport whose connect never completes.
pub struct PendingTransport;

impl Transport for PendingTransport {
    fn execute<'a>(&'a self, _request: &'a PreparedRequest) -> Executing<'a> {
        Box::pin(futures::future::pending())
    }
}

/// Read one request (head and `Content-Length` body) from `socket`.
pub async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some(head_end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..head_end]).to_string();
            let body_len = head
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + body_len {
                break;
            }
        }
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&data).to_string()
}

/// Loopback HTTP server answering each request with `respond(request)`.
pub async fn serve<F>(respond: F) -> SocketAddr
where
    F: Fn(&str) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let response = respond(&request);
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        }
    });
    addr
}

pub fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}
