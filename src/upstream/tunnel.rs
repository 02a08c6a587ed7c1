//! Byte tunnel for upgraded connections (`101 Switching Protocols`).

use std::io;

use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::ratelimit::AdmissionGuard;

/// Wait for both sides to finish upgrading, then copy bytes between them
/// until either side closes. `admission` is held until the tunnel ends.
pub fn spawn(
    client: OnUpgrade,
    upstream: OnUpgrade,
    buffers: BufferPool,
    admission: Option<AdmissionGuard>,
) {
    tokio::spawn(async move {
        let _admission = admission;
        let (client, upstream) = match tokio::try_join!(client, upstream) {
            Ok(upgraded) => upgraded,
            Err(e) => {
                tracing::warn!(error = %e, "Connection upgrade failed");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match copy_bidirectional(&mut client, &mut upstream, &buffers).await {
            Ok((sent, received)) => tracing::debug!(sent, received, "Tunnel closed"),
            Err(e) => tracing::debug!(error = %e, "Tunnel closed with error"),
        }
    });
}

/// Copy `a → b` and `b → a` concurrently, one pooled buffer per direction.
/// Returns the byte counts of each direction.
pub async fn copy_bidirectional<A, B>(
    a: &mut A,
    b: &mut B,
    buffers: &BufferPool,
) -> io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);
    tokio::try_join!(
        copy(&mut a_read, &mut b_write, buffers.checkout()),
        copy(&mut b_read, &mut a_write, buffers.checkout()),
    )
}

async fn copy<R, W>(reader: &mut R, writer: &mut W, mut buf: PooledBuffer) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf[..]).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copies_both_directions_and_returns_buffers() {
        let pool = BufferPool::new(8, 4);
        let (mut client, mut proxy_client) = tokio::io::duplex(64);
        let (mut proxy_upstream, mut upstream) = tokio::io::duplex(64);

        let tunnel_pool = pool.clone();
        let tunnel = tokio::spawn(async move {
            copy_bidirectional(&mut proxy_client, &mut proxy_upstream, &tunnel_pool).await
        });

        client
            .write_all(b"hello upstream, longer than one buffer")
            .await
            .unwrap();
        let mut got = vec![0u8; 38];
        upstream.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"hello upstream, longer than one buffer");

        upstream.write_all(b"hi client").await.unwrap();
        let mut got = vec![0u8; 9];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"hi client");

        drop(client);
        drop(upstream);
        let (sent, received) = tunnel.await.unwrap().unwrap();
        assert_eq!(sent, 38);
        assert_eq!(received, 9);
        assert_eq!(pool.idle(), 2);
    }
}
