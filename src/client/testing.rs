//! In-process fake camera for tests
//!
//! Speaks just enough HTTP/1.1 to serve a `multipart/x-mixed-replace`
//! stream. Counts accepted connections, and connections the client closed
//! before the camera did.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub(crate) const TEST_BOUNDARY: &str = "cam";

/// Encode one part under [`TEST_BOUNDARY`]
pub(crate) fn multipart_part(body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        TEST_BOUNDARY,
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
    out
}

/// Small JPEG-looking payload tagged with `n`
pub(crate) fn jpeg(n: u32) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend_from_slice(&n.to_be_bytes());
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

#[derive(Debug, Clone)]
enum Behavior {
    Stream {
        parts: Vec<Vec<u8>>,
        interval: Duration,
        close: bool,
    },
    Status(u16),
    Silent,
}

pub(crate) struct FakeCamera {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl FakeCamera {
    /// Serve `parts` at once on every connection, then hold it open
    pub(crate) async fn start(parts: Vec<Vec<u8>>) -> Self {
        Self::spawn(Behavior::Stream {
            parts,
            interval: Duration::ZERO,
            close: false,
        })
        .await
    }

    /// Serve `parts` spaced by `interval`; close the connection afterwards
    /// when `close` is set, otherwise hold it open
    pub(crate) async fn paced(parts: Vec<Vec<u8>>, interval: Duration, close: bool) -> Self {
        Self::spawn(Behavior::Stream {
            parts,
            interval,
            close,
        })
        .await
    }

    /// Answer every request with an empty response of the given status
    pub(crate) async fn with_status(code: u16) -> Self {
        Self::spawn(Behavior::Status(code)).await
    }

    /// Accept connections but never send a byte
    pub(crate) async fn silent() -> Self {
        Self::spawn(Behavior::Silent).await
    }

    async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let accepted = Arc::clone(&connections);
        let hung_up = Arc::clone(&closed);
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, behavior.clone(), Arc::clone(&hung_up)));
            }
        });

        Self {
            addr,
            connections,
            closed,
            accept_task,
        }
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}/stream0.mjpg", self.addr)
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Connections the client closed before the camera did
    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for `count` client-side closes
    pub(crate) async fn wait_closed(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.closed() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Read until the client closes the connection, then count it
async fn hold_open(socket: &mut TcpStream, closed: &AtomicUsize) {
    let mut buf = [0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
    closed.fetch_add(1, Ordering::SeqCst);
}

async fn serve(mut socket: TcpStream, behavior: Behavior, closed: Arc<AtomicUsize>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => {
                closed.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    match behavior {
        Behavior::Status(code) => {
            let head = format!(
                "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            );
            let _ = socket.write_all(head.as_bytes()).await;
        }
        Behavior::Silent => hold_open(&mut socket, &closed).await,
        Behavior::Stream {
            parts,
            interval,
            close,
        } => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nConnection: close\r\n\r\n",
                TEST_BOUNDARY
            );
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for part in parts {
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                if socket.write_all(&part).await.is_err() {
                    return;
                }
            }
            let trailer = format!("--{}\r\n", TEST_BOUNDARY);
            if socket.write_all(trailer.as_bytes()).await.is_err() {
                return;
            }
            if !close {
                hold_open(&mut socket, &closed).await;
            }
        }
    }
}
