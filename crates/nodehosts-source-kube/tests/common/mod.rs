//! A scripted stand-in for the Kubernetes API server
//!
//! Every request gets its own connection and the next scripted reply for
//! its kind (list or watch). Request targets are recorded in arrival
//! order so tests can check the resource version a watch resumed from.

#![allow(dead_code)]

use nodehosts_core::traits::{WatchEvent, WatchStream};
use nodehosts_source_kube::{ClientSettings, KubeClient, KubeEventSource};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

/// How long a test waits for any single informer reaction
pub const REACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Relist delay used by test sources
pub const RELIST_DELAY: Duration = Duration::from_millis(20);

/// One scripted response
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with a JSON body
    Json(Value),
    /// Watch body, one chunk per line, then the connection closes
    Lines(Vec<String>),
    /// 200 with an empty body
    Empty,
    /// Chunked headers, then silence
    Stall,
    /// Error status with a JSON body
    Status(u16, Value),
}

#[derive(Default)]
struct Script {
    lists: VecDeque<Reply>,
    watches: VecDeque<Reply>,
}

pub struct FakeApiServer {
    url: String,
    script: Arc<Mutex<Script>>,
    requests: mpsc::UnboundedReceiver<String>,
}

impl FakeApiServer {
    /// Bind a local port and start serving
    ///
    /// Once a script runs out, lists fail with 500 and watches stall.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let script = Arc::new(Mutex::new(Script::default()));
        let (tx, requests) = mpsc::unbounded_channel();

        let shared = Arc::clone(&script);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&shared), tx.clone()));
            }
        });

        Self {
            url,
            script,
            requests,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn on_list(&self, reply: Reply) -> &Self {
        self.script.lock().unwrap().lists.push_back(reply);
        self
    }

    pub fn on_watch(&self, reply: Reply) -> &Self {
        self.script.lock().unwrap().watches.push_back(reply);
        self
    }

    /// A source pointed at this server
    pub fn source(&self) -> KubeEventSource {
        let client = KubeClient::new(&ClientSettings {
            api_server: self.url.clone(),
            ..ClientSettings::default()
        })
        .unwrap();
        KubeEventSource::new(client, RELIST_DELAY)
    }

    /// Target of the next request, e.g. `/api/v1/nodes?watch=true&...`
    pub async fn next_request(&mut self) -> String {
        tokio::time::timeout(REACTION_TIMEOUT, self.requests.recv())
            .await
            .expect("no request arrived in time")
            .expect("server stopped")
    }

    /// Every request target that arrives within `window`
    pub async fn requests_within(&mut self, window: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + window;
        let mut seen = Vec::new();
        while let Ok(Some(target)) = tokio::time::timeout_at(deadline, self.requests.recv()).await {
            seen.push(target);
        }
        seen
    }
}

async fn serve(mut socket: TcpStream, script: Arc<Mutex<Script>>, tx: mpsc::UnboundedSender<String>) {
    let Some(target) = read_request_target(&mut socket).await else {
        return;
    };

    let reply = {
        let mut script = script.lock().unwrap();
        if is_watch(&target) {
            script.watches.pop_front().unwrap_or(Reply::Stall)
        } else {
            script.lists.pop_front().unwrap_or_else(|| {
                Reply::Status(500, json!({"kind": "Status", "code": 500, "message": "unscripted"}))
            })
        }
    };
    let _ = tx.send(target);

    let _ = write_reply(&mut socket, reply).await;
}

async fn read_request_target(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

async fn write_reply(socket: &mut TcpStream, reply: Reply) -> std::io::Result<()> {
    const CHUNKED: &str = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";

    match reply {
        Reply::Json(body) => write_body(socket, 200, &body.to_string()).await,
        Reply::Status(code, body) => write_body(socket, code, &body.to_string()).await,
        Reply::Empty => write_body(socket, 200, "").await,
        Reply::Lines(lines) => {
            socket.write_all(CHUNKED.as_bytes()).await?;
            for line in lines {
                let data = format!("{}\n", line);
                socket
                    .write_all(format!("{:x}\r\n{}\r\n", data.len(), data).as_bytes())
                    .await?;
                socket.flush().await?;
            }
            socket.write_all(b"0\r\n\r\n").await?;
            socket.shutdown().await
        }
        Reply::Stall => {
            socket.write_all(CHUNKED.as_bytes()).await?;
            socket.flush().await?;
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

async fn write_body(socket: &mut TcpStream, code: u16, body: &str) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        code,
        body.len()
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body.as_bytes()).await?;
    socket.shutdown().await
}

pub fn is_watch(target: &str) -> bool {
    target.contains("watch=true")
}

/// Value of `resourceVersion` in a request target
pub fn resource_version(target: &str) -> Option<&str> {
    target
        .split_once('?')?
        .1
        .split('&')
        .find_map(|pair| pair.strip_prefix("resourceVersion="))
}

pub fn node(name: &str, rv: &str, ip: &str) -> Value {
    json!({
        "metadata": {"name": name, "resourceVersion": rv},
        "status": {"addresses": [{"type": "InternalIP", "address": ip}]}
    })
}

pub fn node_list(rv: &str, items: Vec<Value>) -> Reply {
    Reply::Json(json!({
        "kind": "NodeList",
        "apiVersion": "v1",
        "metadata": {"resourceVersion": rv},
        "items": items
    }))
}

pub fn watch_line(kind: &str, object: Value) -> String {
    json!({"type": kind, "object": object}).to_string()
}

pub fn bookmark(rv: &str) -> String {
    watch_line("BOOKMARK", json!({"kind": "Node", "metadata": {"resourceVersion": rv}}))
}

pub fn expired() -> String {
    watch_line(
        "ERROR",
        json!({
            "kind": "Status",
            "status": "Failure",
            "message": "too old resource version: 100 (150)",
            "reason": "Expired",
            "code": 410
        }),
    )
}

/// Next event from the source
pub async fn next_event(events: &mut WatchStream) -> WatchEvent {
    tokio::time::timeout(REACTION_TIMEOUT, events.next())
        .await
        .expect("no event arrived in time")
        .expect("event stream ended")
}

/// Assert the next event adds `name`
pub async fn expect_added(events: &mut WatchStream, name: &str) {
    match next_event(events).await {
        WatchEvent::Added(node) => assert_eq!(node.name, name),
        other => panic!("expected Added({}), got {:?}", name, other),
    }
}

/// Assert the next event is the initial sync marker
pub async fn expect_synced(events: &mut WatchStream) {
    let event = next_event(events).await;
    assert_eq!(event, WatchEvent::Synced);
}
