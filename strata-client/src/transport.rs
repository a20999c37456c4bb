//! Async byte transports.
//!
//! The [`Transport`] trait is the boundary between the sender task and the
//! network.  [`TcpTransport`] implements it over tokio's TCP stream using one
//! of the MTProto stream framings from `strata_mtproto::transport`.

use std::future::Future;
use std::io;

use strata_mtproto::{Abridged, Framing, Full, Intermediate};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A reliable, ordered, frame-oriented connection that can be re-established.
pub trait Transport: Send + 'static {
    /// Open (or reopen) the connection.
    fn connect(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Close the connection.  Calling it while disconnected is a no-op.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

    /// Write one frame.
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Read the next frame.
    ///
    /// Must be cancel-safe: if the future is dropped before completing, no
    /// bytes are lost and the next call picks up where this one stopped.
    fn recv(&mut self) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

// ─── TransportKind ────────────────────────────────────────────────────────────

/// Which MTProto transport framing to use.
///
/// | Variant | Init bytes | Notes |
/// |---------|-----------|-------|
/// | `Abridged` | `0xef` | Default, smallest overhead |
/// | `Intermediate` | `0xeeeeeeee` | Better proxy compat |
/// | `Full` | none | Adds seqno + CRC32 |
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TransportKind {
    /// MTProto [Abridged] transport: length prefix is 1 or 4 bytes.
    ///
    /// [Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
    #[default]
    Abridged,
    /// MTProto [Intermediate] transport: 4-byte LE length prefix.
    ///
    /// [Intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate
    Intermediate,
    /// MTProto [Full] transport: 4-byte length + seqno + CRC32.
    ///
    /// [Full]: https://core.telegram.org/mtproto/mtproto-transports#full
    Full,
}

impl TransportKind {
    fn framing(&self) -> Box<dyn Framing> {
        match self {
            Self::Abridged => Box::new(Abridged),
            Self::Intermediate => Box::new(Intermediate),
            Self::Full => Box::new(Full::default()),
        }
    }
}

// ─── TcpTransport ─────────────────────────────────────────────────────────────

/// [`Transport`] over TCP.
pub struct TcpTransport {
    addr: String,
    framing: Box<dyn Framing>,
    stream: Option<TcpStream>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl TcpTransport {
    /// A transport that will connect to `addr` (e.g. `"149.154.167.51:443"`).
    pub fn new(addr: impl Into<String>, kind: &TransportKind) -> Self {
        Self {
            addr: addr.into(),
            framing: kind.framing(),
            stream: None,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
        }
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self) -> io::Result<()> {
        self.stream = None;
        self.read_buf.clear();
        self.framing.reset();

        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        let init = self.framing.init();
        if !init.is_empty() {
            stream.write_all(init).await?;
        }
        tracing::info!("[strata] connected to {}", self.addr);
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.read_buf.clear();
    }

    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_buf.clear();
        self.framing.pack(frame, &mut self.write_buf);
        let stream = self.stream.as_mut().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stream.write_all(&self.write_buf).await
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        loop {
            let unpacked = self
                .framing
                .unpack(&self.read_buf)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if let Some(off) = unpacked {
                let frame = self.read_buf[off.data_start..off.data_end].to_vec();
                self.read_buf.drain(..off.next_offset);
                return Ok(frame);
            }
            let stream = self.stream.as_mut().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
            if stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "server closed the connection"));
            }
        }
    }
}
