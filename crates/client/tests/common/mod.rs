//! An in-memory HTTP/1.1 server the client connects to through
//! [`Connector`], one `tokio::io::duplex` pipe per connection.

#![allow(dead_code, reason = "each test binary uses a different part")]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::Method;
use micro_client::layers::CookieJar;
use micro_client::transport::BoxedIo;
use micro_client::{Client, ClientConfig, ConnectionKey, Connector, Headers};
use micro_http1::codec::Parser;
use micro_http1::protocol::{PayloadItem, StartLine};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub target: String,
    pub headers: Headers,
    pub body: Bytes,
    /// 1-based number of the connection it arrived on.
    pub connection: usize,
    pub at: Instant,
}

pub enum Action {
    Respond(String),
    RespondAndClose(String),
    /// Close the connection without answering.
    Close,
    /// Keep the connection open and never answer.
    Hang,
}

type Handler = dyn Fn(&Received) -> Action + Send + Sync;

#[derive(Clone)]
pub struct TestServer {
    inner: Arc<Inner>,
}

struct Inner {
    handler: Box<Handler>,
    /// Answer right after the head, without reading the body.
    early: bool,
    connections: AtomicUsize,
    received: Mutex<Vec<Received>>,
}

impl TestServer {
    pub fn new(handler: impl Fn(&Received) -> Action + Send + Sync + 'static) -> Self {
        Self::with_mode(handler, false)
    }

    /// Answers every request as soon as its head arrived.
    pub fn early(handler: impl Fn(&Received) -> Action + Send + Sync + 'static) -> Self {
        Self::with_mode(handler, true)
    }

    fn with_mode(handler: impl Fn(&Received) -> Action + Send + Sync + 'static, early: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler: Box::new(handler),
                early,
                connections: AtomicUsize::new(0),
                received: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn client(&self, config: ClientConfig) -> Client {
        Client::builder().config(config).connector(self.clone()).build()
    }

    pub fn client_with_jar(&self, config: ClientConfig, jar: Arc<dyn CookieJar>) -> Client {
        Client::builder().config(config).connector(self.clone()).cookie_jar(jar).build()
    }

    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.inner.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for TestServer {
    async fn connect(&self, _key: &ConnectionKey) -> io::Result<BoxedIo> {
        let id = self.inner.connections.fetch_add(1, Ordering::SeqCst) + 1;
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(Arc::clone(&self.inner), server, id));
        Ok(Box::new(client))
    }
}

async fn serve(inner: Arc<Inner>, mut io: DuplexStream, connection: usize) {
    let mut buffer = BytesMut::new();
    let mut parser = Parser::new();

    loop {
        parser.reset();
        let head = loop {
            match parser.parse_head(&mut buffer) {
                Ok(Some(head)) => break head,
                Ok(None) => {}
                Err(_) => return,
            }
            if io.read_buf(&mut buffer).await.unwrap_or(0) == 0 {
                return;
            }
        };

        let mut body = BytesMut::new();
        while !inner.early && !parser.is_complete() {
            match parser.parse_body(&mut buffer) {
                Ok(Some(PayloadItem::Chunk(bytes))) => body.extend_from_slice(&bytes),
                Ok(Some(PayloadItem::Eof)) => break,
                Ok(None) => {
                    if io.read_buf(&mut buffer).await.unwrap_or(0) == 0 {
                        return;
                    }
                }
                Err(_) => return,
            }
        }

        let StartLine::Request { method, target } = head.start_line else {
            return;
        };
        let received =
            Received { method, target, headers: head.headers, body: body.freeze(), connection, at: Instant::now() };
        inner.received.lock().unwrap().push(received.clone());

        match (inner.handler)(&received) {
            Action::Respond(raw) => {
                if io.write_all(raw.as_bytes()).await.is_err() {
                    return;
                }
            }
            Action::RespondAndClose(raw) => {
                let _ = io.write_all(raw.as_bytes()).await;
                return;
            }
            Action::Close => return,
            Action::Hang => std::future::pending::<()>().await,
        }
    }
}

/// A complete response with a `Content-Length` body.
pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> Action {
    let reason = http::StatusCode::from_u16(status).ok().and_then(|s| s.canonical_reason()).unwrap_or("Unknown");
    let mut raw = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    Action::Respond(raw)
}

pub fn ok(body: &str) -> Action {
    response(200, &[], body)
}
