//! HTTP client side of the wire protocol.
//!
//! Every operation on a remote file maps to one request against the
//! server's single resource: the absolute file path, with the operation
//! selected by the `action` query parameter. Block requests reuse
//! persistent connections from a pool sized to the transfer concurrency,
//! so connection setup cost does not dominate small block sizes.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pdiffcopy::errors::{Result, TransferError};
use crate::pdiffcopy::hashing::{HashEntry, HashMethod};
use crate::pdiffcopy::BlockRef;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client shared by every worker of a transfer. Pool size
/// matches the concurrency so each in-flight block operation can hold a
/// persistent connection.
pub fn build_http_client(concurrency: usize) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(concurrency.max(1))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    Ok(client)
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    size: u64,
}

/// A file served by a remote pdiffcopy server.
#[derive(Clone, Debug)]
pub struct RemoteFile {
    http: reqwest::Client,
    host: String,
    port: u16,
    path: String,
}

impl RemoteFile {
    pub fn new(http: reqwest::Client, host: String, port: u16, path: String) -> Self {
        Self { http, host, port, path }
    }

    fn url(&self, query: &str) -> String {
        format!("http://{}:{}{}?{query}", self.host, self.port, self.path)
    }

    /// Size of the remote file, or `None` when it does not exist.
    pub async fn file_size(&self) -> Result<Option<u64>> {
        let url = self.url("action=info");
        tracing::debug!("requesting {url}");
        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let info: FileInfo = response.json().await?;
                Ok(Some(info.size))
            }
            status => Err(TransferError::Protocol(format!(
                "unexpected status {status} from info request"
            ))),
        }
    }

    /// Stream the hash entries of the remote file. The server computes the
    /// digests with its own worker pool and streams one `offset\tdigest`
    /// line per block; out-of-order entries are rejected here so the delta
    /// merge can rely on ascending offsets.
    pub fn hash_stream(
        &self,
        block_size: u64,
        method: HashMethod,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Result<HashEntry>> {
        let (tx, rx) = mpsc::channel(concurrency.max(1));
        let url = self.url(&format!(
            "action=hashes&block_size={block_size}&method={method}&concurrency={concurrency}"
        ));
        let http = self.http.clone();
        let path = self.path.clone();

        tokio::spawn(async move {
            if let Err(e) = stream_hashes(&http, &url, &path, block_size, method, &tx, &cancel).await {
                cancel.cancel();
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    /// Fetch one block. A body shorter or longer than the requested window
    /// is a protocol error.
    pub async fn read_block(&self, block: BlockRef) -> Result<Bytes> {
        let url = self.url(&format!(
            "action=block&offset={}&length={}",
            block.offset, block.length
        ));
        tracing::debug!("requesting {url}");
        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::OK => {
                let data = response.bytes().await?;
                if data.len() as u64 != block.length {
                    return Err(TransferError::Protocol(format!(
                        "truncated block response at offset {}: expected {} bytes, got {}",
                        block.offset,
                        block.length,
                        data.len()
                    )));
                }
                Ok(data)
            }
            StatusCode::NOT_FOUND => Err(TransferError::NotFound(self.path.clone())),
            status => Err(TransferError::Protocol(format!(
                "unexpected status {status} reading block at offset {}",
                block.offset
            ))),
        }
    }

    /// Write one block in place on the remote file.
    pub async fn write_block(&self, offset: u64, data: Bytes) -> Result<()> {
        let url = self.url(&format!("action=block&offset={offset}"));
        tracing::debug!("posting {} bytes to {url}", data.len());
        let response = self.http.put(url).body(data).send().await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(TransferError::NotFound(self.path.clone())),
            status => Err(TransferError::Protocol(format!(
                "unexpected status {status} writing block at offset {offset}"
            ))),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn stream_hashes(
    http: &reqwest::Client,
    url: &str,
    path: &str,
    block_size: u64,
    method: HashMethod,
    tx: &mpsc::Sender<Result<HashEntry>>,
    cancel: &CancellationToken,
) -> Result<()> {
    tracing::debug!("requesting {url}");
    let response = http.get(url).send().await?;
    match response.status() {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => {
            return Err(TransferError::NotFound(path.to_string()));
        }
        StatusCode::BAD_REQUEST => {
            return Err(TransferError::UnknownHash(method.to_string()));
        }
        status => {
            return Err(TransferError::Protocol(format!(
                "unexpected status {status} from hash request"
            )));
        }
    }

    let body = response.bytes_stream();
    tokio::pin!(body);
    let mut buf = BytesMut::new();
    let mut next_offset = 0u64;

    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            chunk = body.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        buf.extend_from_slice(&chunk?);

        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line = buf.split_to(pos + 1);
            let entry = parse_hash_line(&line[..pos], method)?;
            if entry.offset != next_offset {
                return Err(TransferError::Protocol(format!(
                    "hash stream out of order: expected offset {next_offset}, got {}",
                    entry.offset
                )));
            }
            next_offset = entry.offset + block_size;
            if tx.send(Ok(entry)).await.is_err() {
                return Ok(());
            }
        }
    }

    if !buf.is_empty() {
        return Err(TransferError::Protocol(
            "hash stream ended mid-entry".to_string(),
        ));
    }
    Ok(())
}

fn parse_hash_line(line: &[u8], method: HashMethod) -> Result<HashEntry> {
    let text = std::str::from_utf8(line)
        .map_err(|_| TransferError::Protocol("hash stream entry is not UTF-8".to_string()))?;
    let (offset, digest) = text.split_once('\t').ok_or_else(|| {
        TransferError::Protocol(format!("malformed hash stream entry: {text:?}"))
    })?;
    let offset = offset.parse().map_err(|_| {
        TransferError::Protocol(format!("malformed offset in hash stream entry: {text:?}"))
    })?;
    if digest.len() != method.digest_width() {
        return Err(TransferError::Protocol(format!(
            "digest width mismatch in hash stream entry: {text:?}"
        )));
    }
    Ok(HashEntry { offset, digest: digest.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() -> anyhow::Result<()> {
        let digest = "a".repeat(40);
        let line = format!("1048576\t{digest}");
        let entry = parse_hash_line(line.as_bytes(), HashMethod::Sha1)?;
        assert_eq!(entry.offset, 1_048_576);
        assert_eq!(entry.digest, digest);
        Ok(())
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(parse_hash_line(b"1024 deadbeef", HashMethod::Xxh64).is_err());
    }

    #[test]
    fn rejects_bad_offset() {
        let line = format!("banana\t{}", "a".repeat(40));
        assert!(parse_hash_line(line.as_bytes(), HashMethod::Sha1).is_err());
    }

    #[test]
    fn rejects_wrong_digest_width() {
        assert!(parse_hash_line(b"0\tdeadbeef", HashMethod::Sha1).is_err());
    }
}
