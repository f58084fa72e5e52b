//! TCP stream to the server.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use ed2k_client::transport::connect;
//!
//! let stream = connect("176.103.48.36", 4184, Duration::from_secs(10)).await?;
//! let (reader, writer) = stream.into_split();
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{Ed2kError, Result};

/// Connected server stream.
#[derive(Debug)]
pub struct ServerStream {
    stream: TcpStream,
}

impl ServerStream {
    /// Split into read and write halves.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Get a reference to the underlying stream.
    pub fn inner(&self) -> &TcpStream {
        &self.stream
    }
}

/// Open a TCP connection, failing with `ConnectTimeout` when `timeout`
/// elapses first.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<ServerStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Ed2kError::ConnectTimeout)??;
    stream.set_nodelay(true)?;
    Ok(ServerStream { stream })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_split() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let stream = connect("127.0.0.1", port, Duration::from_secs(5)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
        assert!(stream.inner().nodelay().unwrap());

        let (_reader, mut writer) = stream.into_split();
        writer.write_all(b"ping").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect("127.0.0.1", port, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Ed2kError::Io(_)));
    }
}
