//! TCP peer fetcher.

use super::wire::{read_frame, write_frame, FragmentRequest, FragmentResponse, WireError};
use crate::fragment::ContentHash;
use crate::retrieval::{FetchError, PeerFetcher};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Fetches fragments from peers' [`super::FragmentServer`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPeerFetcher;

impl TcpPeerFetcher {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(
        hash: &ContentHash,
        peer_address: &str,
    ) -> Result<FragmentResponse, WireError> {
        let mut stream = TcpStream::connect(peer_address).await?;
        write_frame(&mut stream, &FragmentRequest { content_hash: *hash }).await?;
        read_frame(&mut stream).await
    }
}

#[async_trait]
impl PeerFetcher for TcpPeerFetcher {
    async fn fetch(
        &self,
        hash: &ContentHash,
        peer_address: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        let response = tokio::time::timeout(timeout, Self::exchange(hash, peer_address))
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
            .map_err(|e| FetchError::Network(format!("{peer_address}: {e}")))?;

        if response.content_hash != *hash {
            return Err(FetchError::Network(format!(
                "{peer_address} answered for {} instead of {}",
                response.content_hash.short(),
                hash.short()
            )));
        }

        match response.data {
            Some(data) if response.found => Ok(data),
            _ => Err(FetchError::NotFound {
                hash: *hash,
                peer: peer_address.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use crate::registry::FragmentRegistry;
    use crate::transport::FragmentServer;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fetch_from_server() {
        let registry = FragmentRegistry::new();
        let fragment = Fragment::new("f", 0, 1, vec![9u8; 300_000]);
        registry.insert(fragment.clone());

        let handle = FragmentServer::bind("127.0.0.1:0", registry)
            .await
            .unwrap()
            .spawn()
            .unwrap();

        let data = TcpPeerFetcher::new()
            .fetch(&fragment.content_hash, &handle.address().to_string(), TIMEOUT)
            .await
            .unwrap();

        assert!(fragment.content_hash.matches(&data));
        assert_eq!(data.len(), 300_000);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let handle = FragmentServer::bind("127.0.0.1:0", FragmentRegistry::new())
            .await
            .unwrap()
            .spawn()
            .unwrap();

        let hash = ContentHash::digest(b"nope");
        let result = TcpPeerFetcher::new()
            .fetch(&hash, &handle.address().to_string(), TIMEOUT)
            .await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_network_error() {
        // Bind then drop so the port is known to be closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpPeerFetcher::new()
            .fetch(&ContentHash::digest(b"x"), &address, TIMEOUT)
            .await;

        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        // Accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _accept = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let timeout = Duration::from_millis(100);
        let result = TcpPeerFetcher::new()
            .fetch(&ContentHash::digest(b"x"), &address, timeout)
            .await;

        assert_eq!(result, Err(FetchError::Timeout(timeout)));
    }
}
