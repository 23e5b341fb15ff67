//! Netstring framing (`<len>:<bytes>,`) and a back-pressure-bounded
//! writer over an authenticated stream (spec §4.C, §4.I). Used both for
//! live cluster links and for replay-log segment files, which share the
//! same wire shape.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Hard ceiling on a single message's payload size; a peer claiming more
/// is almost certainly lying about its length prefix.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// How many outbound messages may queue ahead of the writer task before
/// `send` starts blocking the caller — the back-pressure knob.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 256;

#[derive(Debug)]
pub enum FramedError {
    Io(io::Error),
    FrameTooLarge(usize),
    MalformedLength,
    Closed,
}

impl std::fmt::Display for FramedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramedError::Io(e) => write!(f, "io error: {e}"),
            FramedError::FrameTooLarge(n) => write!(f, "netstring frame of {n} bytes exceeds limit"),
            FramedError::MalformedLength => write!(f, "malformed netstring length prefix"),
            FramedError::Closed => write!(f, "connection closed"),
        }
    }
}
impl std::error::Error for FramedError {}
impl From<io::Error> for FramedError {
    fn from(e: io::Error) -> Self {
        FramedError::Io(e)
    }
}

/// Read one `<len>:<bytes>,` frame. Returns `Ok(None)` on a clean EOF
/// between frames.
pub async fn read_netstring<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, FramedError> {
    let mut len_digits = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match reader.read_exact(&mut byte).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && len_digits.is_empty() => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        if byte[0] == b':' {
            break;
        }
        if !byte[0].is_ascii_digit() || len_digits.len() > 9 {
            return Err(FramedError::MalformedLength);
        }
        len_digits.push(byte[0]);
    }
    if len_digits.is_empty() {
        return Err(FramedError::MalformedLength);
    }
    let len: usize = std::str::from_utf8(&len_digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(FramedError::MalformedLength)?;
    if len > MAX_FRAME_BYTES {
        return Err(FramedError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let mut comma = [0u8; 1];
    reader.read_exact(&mut comma).await?;
    if comma[0] != b',' {
        return Err(FramedError::MalformedLength);
    }
    Ok(Some(payload))
}

pub async fn write_netstring<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), FramedError> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FramedError::FrameTooLarge(payload.len()));
    }
    writer.write_all(format!("{}:", payload.len()).as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.write_all(b",").await?;
    writer.flush().await?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct TrafficCounters {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    closed: AtomicBool,
}

impl TrafficCounters {
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// A framed, back-pressure-bounded connection over any split-capable
/// duplex stream (a `tokio_rustls::TlsStream`, or a `tokio::io::duplex`
/// pair in tests).
pub struct FramedConnection {
    read_half: Option<ReadHalf<Box<dyn AsyncReadWriteUnpin>>>,
    write_tx: mpsc::Sender<Vec<u8>>,
    writer_task: JoinHandle<()>,
    counters: Arc<TrafficCounters>,
}

/// Object-safe alias so `FramedConnection` doesn't need to be generic —
/// every caller hands it a boxed `tokio_rustls::TlsStream<TcpStream>`.
pub trait AsyncReadWriteUnpin: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWriteUnpin for T {}

impl FramedConnection {
    pub fn new(stream: Box<dyn AsyncReadWriteUnpin>, write_queue_depth: usize) -> Self {
        let (read_half, mut write_half): (ReadHalf<_>, WriteHalf<_>) = tokio::io::split(stream);
        let counters = Arc::new(TrafficCounters::default());
        let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(write_queue_depth.max(1));
        let writer_counters = counters.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(payload) = write_rx.recv().await {
                let len = payload.len() as u64;
                if write_netstring(&mut write_half, &payload).await.is_err() {
                    writer_counters.closed.store(true, Ordering::Relaxed);
                    break;
                }
                writer_counters.bytes_out.fetch_add(len + 2, Ordering::Relaxed);
            }
        });

        FramedConnection {
            read_half: Some(read_half),
            write_tx,
            writer_task,
            counters,
        }
    }

    /// Enqueue a message; blocks once `write_queue_depth` messages are
    /// already in flight (the back-pressure boundary).
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), FramedError> {
        self.write_tx.send(payload).await.map_err(|_| FramedError::Closed)
    }

    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, FramedError> {
        let read_half = self.read_half.as_mut().ok_or(FramedError::Closed)?;
        match read_netstring(read_half).await {
            Ok(Some(payload)) => {
                self.counters
                    .bytes_in
                    .fetch_add(payload.len() as u64 + 2, Ordering::Relaxed);
                Ok(Some(payload))
            }
            Ok(None) => {
                self.counters.closed.store(true, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                self.counters.closed.store(true, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn counters(&self) -> Arc<TrafficCounters> {
        self.counters.clone()
    }

    pub fn closed(&self) -> bool {
        self.counters.closed()
    }

    pub async fn shutdown(mut self) {
        self.read_half.take();
        drop(self.write_tx);
        let _ = self.writer_task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn netstring_round_trips_through_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_netstring(&mut a, b"hello world").await.unwrap();
        let got = read_netstring(&mut b).await.unwrap().unwrap();
        assert_eq!(got, b"hello world");
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        a.write_all(b"99999999999:x,").await.unwrap();
        let err = read_netstring(&mut b).await.unwrap_err();
        assert!(matches!(err, FramedError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn malformed_separator_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        a.write_all(b"5:helloX").await.unwrap();
        let err = read_netstring(&mut b).await.unwrap_err();
        assert!(matches!(err, FramedError::MalformedLength));
    }

    #[tokio::test]
    async fn framed_connection_tracks_bytes_in_and_out() {
        let (client, server) = tokio::io::duplex(8192);
        let mut conn_a = FramedConnection::new(Box::new(client), 8);
        let mut conn_b = FramedConnection::new(Box::new(server), 8);

        conn_a.send(b"ping".to_vec()).await.unwrap();
        let got = conn_b.recv().await.unwrap().unwrap();
        assert_eq!(got, b"ping");
        assert!(conn_b.counters().bytes_in() > 0);

        conn_a.shutdown().await;
        assert!(conn_b.recv().await.unwrap().is_none());
        assert!(conn_b.closed());
    }
}
