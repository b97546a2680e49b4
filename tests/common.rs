// tests/common.rs

//! Shared test helpers: tracing setup and a canned HTTP peer that stands in
//! for a remote hive.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// One request observed by the canned peer.
#[derive(Debug, Clone)]
pub struct Recorded {
  pub method: String,
  pub path: String,
  pub body: Vec<u8>,
}

/// A minimal HTTP/1.1 responder standing in for a remote hive. Every
/// request is recorded; the `reply` function picks the status and body from
/// the method and path.
pub struct CannedPeer {
  pub addr: String,
  pub requests: Arc<Mutex<Vec<Recorded>>>,
  accept_task: JoinHandle<()>,
}

impl CannedPeer {
  pub async fn spawn<F>(reply: F) -> CannedPeer
  where
    F: Fn(&Recorded) -> (u16, Vec<u8>) + Send + Sync + 'static,
  {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind canned peer");
    let addr: SocketAddr = listener.local_addr().expect("peer addr");
    let requests: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(reply);

    let requests_clone = requests.clone();
    let accept_task = tokio::spawn(async move {
      loop {
        let (stream, _) = match listener.accept().await {
          Ok(conn) => conn,
          Err(_) => return,
        };
        let requests = requests_clone.clone();
        let reply = reply.clone();
        tokio::spawn(async move {
          let _ = serve_one(stream, requests, reply).await;
        });
      }
    });

    CannedPeer {
      addr: addr.to_string(),
      requests,
      accept_task,
    }
  }

  pub fn recorded(&self) -> Vec<Recorded> {
    self.requests.lock().unwrap().clone()
  }

  /// Waits until the peer has seen `n` requests, failing after 2 seconds.
  pub async fn wait_for_requests(&self, n: usize) -> Vec<Recorded> {
    for _ in 0..200 {
      let seen = self.recorded();
      if seen.len() >= n {
        return seen;
      }
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("canned peer saw {} requests, expected {}", self.recorded().len(), n);
  }
}

impl Drop for CannedPeer {
  fn drop(&mut self) {
    self.accept_task.abort();
  }
}

async fn serve_one<F>(
  mut stream: tokio::net::TcpStream,
  requests: Arc<Mutex<Vec<Recorded>>>,
  reply: Arc<F>,
) -> std::io::Result<()>
where
  F: Fn(&Recorded) -> (u16, Vec<u8>) + Send + Sync + 'static,
{
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];

  // Read until the end of the headers.
  let header_end = loop {
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
      return Ok(());
    }
    buf.extend_from_slice(&chunk[..n]);
    if let Some(pos) = find_header_end(&buf) {
      break pos;
    }
  };

  let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
  let mut lines = headers.lines();
  let request_line = lines.next().unwrap_or_default();
  let mut parts = request_line.split_whitespace();
  let method = parts.next().unwrap_or_default().to_string();
  let path = parts.next().unwrap_or_default().to_string();

  let mut content_length = 0usize;
  for line in lines {
    if let Some((name, value)) = line.split_once(':') {
      if name.eq_ignore_ascii_case("content-length") {
        content_length = value.trim().parse().unwrap_or(0);
      }
    }
  }

  // Read the rest of the body.
  let mut body: Vec<u8> = buf[header_end + 4..].to_vec();
  while body.len() < content_length {
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
      break;
    }
    body.extend_from_slice(&chunk[..n]);
  }

  let recorded = Recorded { method, path, body };
  let (status, response_body) = reply(&recorded);
  requests.lock().unwrap().push(recorded);

  let reason = match status {
    200 => "OK",
    500 => "Internal Server Error",
    _ => "Status",
  };
  let head = format!(
    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
    response_body.len()
  );
  stream.write_all(head.as_bytes()).await?;
  stream.write_all(&response_body).await?;
  stream.flush().await?;
  Ok(())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
  buf.windows(4).position(|w| w == b"\r\n\r\n")
}
