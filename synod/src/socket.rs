//! # Summary
//!
//! This module abstracts over byte streams to peers and the framing on top of them.
//!
//! Every frame is an 8-byte big-endian length followed by the payload.
//! Consensus traffic uses `tokio-util`'s length-delimited codec with bincode
//! payloads; the one-shot rendezvous handshake reads and writes single JSON
//! frames directly so that no bytes past the handshake are ever buffered
//! and lost.

use std::marker::PhantomData;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::constants::{LENGTH_FIELD, LOOPBACK_BUFFER, MAX_FRAME};
use crate::error::{Error, Result};

type BoxRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Raw bidirectional connection to a single peer.
pub struct Link {
    reader: BoxRead,
    writer: BoxWrite,
}

impl Link {
    pub fn tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Link {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Connection from this process to itself. Bytes written are read back
    /// in order without touching the network.
    pub fn loopback() -> Self {
        let (near, far) = tokio::io::duplex(LOOPBACK_BUFFER);
        Link {
            reader: Box::new(far),
            writer: Box::new(near),
        }
    }

    pub fn new<R, W>(reader: R, writer: W) -> Self
    where R: AsyncRead + Send + Unpin + 'static,
          W: AsyncWrite + Send + Unpin + 'static,
    {
        Link {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("Link")
    }
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_FIELD)
        .big_endian()
        .max_frame_length(MAX_FRAME)
        .new_codec()
}

/// Receiving half of a link. Yields whole bincode-encoded values of type `T`.
pub struct Rx<T> {
    inner: FramedRead<BoxRead, LengthDelimitedCodec>,
    _marker: PhantomData<fn() -> T>,
}

/// Transmitting half of a link. Sends length-delimited, bincode-encoded `T`.
pub struct Tx<T> {
    inner: FramedWrite<BoxWrite, LengthDelimitedCodec>,
    _marker: PhantomData<fn(T)>,
}

/// Split a `Link` into a pair of receiving and transmitting channels.
pub fn split<R, T>(link: Link) -> (Rx<R>, Tx<T>)
where R: serde::de::DeserializeOwned,
      T: serde::Serialize,
{
    let rx = Rx {
        inner: FramedRead::new(link.reader, codec()),
        _marker: PhantomData,
    };
    let tx = Tx {
        inner: FramedWrite::new(link.writer, codec()),
        _marker: PhantomData,
    };
    (rx, tx)
}

impl<T: serde::de::DeserializeOwned> Rx<T> {
    /// Waits for the next complete frame. Returns `None` on a clean close.
    /// Cancel-safe: a partial frame stays buffered for the next call.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        match self.inner.next().await? {
        | Ok(frame) => Some(bincode::deserialize(&frame).map_err(Error::from)),
        | Err(error) => Some(Err(Error::from(error))),
        }
    }
}

impl<T: serde::Serialize> Tx<T> {
    pub async fn send(&mut self, item: &T) -> Result<()> {
        let payload = bincode::serialize(item)?;
        self.inner.send(Bytes::from(payload)).await?;
        Ok(())
    }
}

/// Writes exactly one JSON-encoded frame.
pub async fn write_json<W, T>(writer: &mut W, item: &T) -> Result<()>
where W: AsyncWrite + Unpin,
      T: serde::Serialize,
{
    let payload = serde_json::to_vec(item)?;
    writer.write_u64(payload.len() as u64).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly one JSON-encoded frame and nothing beyond it.
pub async fn read_json<R, T>(reader: &mut R) -> Result<T>
where R: AsyncRead + Unpin,
      T: serde::de::DeserializeOwned,
{
    let len = reader.read_u64().await?;
    if len > MAX_FRAME as u64 {
        return Err(Error::Malformed(format!("frame of {} bytes", len)))
    }
    let mut payload = vec![0; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_loopback_delivers_in_order() {
        let (mut rx, mut tx) = split::<u32, u32>(Link::loopback());
        for n in 0..10 {
            tx.send(&n).await.unwrap();
        }
        for n in 0..10 {
            assert_eq!(rx.recv().await.unwrap().unwrap(), n);
        }
    }

    #[tokio::test]
    async fn test_partial_frame_is_not_delivered() {
        let (reader, mut writer) = tokio::io::duplex(1024);
        let (sink, _) = tokio::io::duplex(16);
        let (mut rx, _tx) = split::<String, String>(Link::new(reader, sink));

        let payload = bincode::serialize(&"east".to_string()).unwrap();
        writer.write_u64(payload.len() as u64).await.unwrap();
        writer.write_all(&payload[..3]).await.unwrap();
        writer.flush().await.unwrap();
        let early = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await;
        assert!(early.is_err());

        writer.write_all(&payload[3..]).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "east");
    }

    #[tokio::test]
    async fn test_header_is_eight_byte_big_endian() {
        let (mut reader, writer) = tokio::io::duplex(1024);
        let (source, _) = tokio::io::duplex(16);
        let (_rx, mut tx) = split::<u8, u8>(Link::new(source, writer));
        tx.send(&7u8).await.unwrap();

        let mut header = [0u8; 8];
        reader.read_exact(&mut header).await.unwrap();
        assert_eq!(u64::from_be_bytes(header), 1);
        assert_eq!(reader.read_u8().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_closed_stream_ends_receiver() {
        let (reader, writer) = tokio::io::duplex(64);
        let (sink, _) = tokio::io::duplex(16);
        let (mut rx, _tx) = split::<u8, u8>(Link::new(reader, sink));
        drop(writer);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_json_frame_leaves_trailing_bytes() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_json(&mut a, &vec![1, 2, 3]).await.unwrap();
        a.write_all(b"tail").await.unwrap();

        let decoded: Vec<u32> = read_json(&mut b).await.unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
        let mut tail = [0u8; 4];
        b.read_exact(&mut tail).await.unwrap();
        assert_eq!(&tail, b"tail");
    }

    #[tokio::test]
    async fn test_oversized_json_frame_is_malformed() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u64(u64::MAX).await.unwrap();
        let result: Result<Vec<u32>> = read_json(&mut b).await;
        assert!(matches!(result, Err(Error::Malformed(_))));
    }
}
