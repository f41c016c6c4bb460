//! Parallel block hashing.
//!
//! A file is split into fixed-size blocks which are digested concurrently
//! on the blocking thread pool; because hashing is CPU bound, each
//! in-flight block gets its own OS thread. The pool yields digests in
//! completion order, so a small min-heap keyed on offset re-establishes
//! ascending order before entries are emitted. The heap never grows beyond
//! the completion skew of the workers.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::fs::File;
use std::hash::Hasher;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use twox_hash::XxHash64;

use crate::pdiffcopy::errors::{Result, TransferError};
use crate::pdiffcopy::{block_refs, pool, BlockRef};

/// Content digest used to compare blocks across endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashMethod {
    Sha1,
    Sha256,
    Md5,
    Blake3,
    Xxh64,
}

impl HashMethod {
    /// Hex digest of `data`.
    pub fn digest_hex(self, data: &[u8]) -> String {
        match self {
            Self::Sha1 => hex::encode(Sha1::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Md5 => hex::encode(Md5::digest(data)),
            Self::Blake3 => blake3::hash(data).to_hex().to_string(),
            Self::Xxh64 => {
                let mut hasher = XxHash64::with_seed(0);
                hasher.write(data);
                format!("{:016x}", hasher.finish())
            }
        }
    }

    /// Width of the hex digest in characters.
    pub const fn digest_width(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 | Self::Blake3 => 64,
            Self::Md5 => 32,
            Self::Xxh64 => 16,
        }
    }
}

impl FromStr for HashMethod {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "md5" => Ok(Self::Md5),
            "blake3" => Ok(Self::Blake3),
            "xxh64" => Ok(Self::Xxh64),
            other => Err(TransferError::UnknownHash(other.to_string())),
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
            Self::Blake3 => "blake3",
            Self::Xxh64 => "xxh64",
        };
        f.write_str(name)
    }
}

/// One entry of a hash stream: the digest of the block at `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashEntry {
    pub offset: u64,
    pub digest: String,
}

/// Digest one block of a file. Opens its own descriptor so concurrent
/// workers never share file state.
pub fn hash_block(path: &Path, offset: u64, length: u64, method: HashMethod) -> Result<String> {
    let file = File::open(path)?;
    #[allow(clippy::cast_possible_truncation)]
    let mut buf = vec![0u8; length as usize];
    file.read_exact_at(&mut buf, offset)?;
    Ok(method.digest_hex(&buf))
}

/// Stream the hash entries of a local file in strictly ascending offset
/// order. The sequence is lazy, finite and single-pass; an empty file
/// yields an empty stream.
pub fn local_hash_stream(
    path: PathBuf,
    size: u64,
    block_size: u64,
    method: HashMethod,
    concurrency: usize,
    cancel: CancellationToken,
) -> mpsc::Receiver<Result<HashEntry>> {
    let (tx, rx) = mpsc::channel(concurrency.max(1));

    tokio::spawn(async move {
        let blocks: Vec<BlockRef> = block_refs(size, block_size).collect();
        let worker = move |block: BlockRef| {
            let path = path.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    hash_block(&path, block.offset, block.length, method)
                })
                .await
                .map_err(|e| TransferError::Protocol(format!("hash worker died: {e}")))?
            }
        };

        let mut results = pool::run(blocks, concurrency, worker, cancel.clone());
        let mut reorder: BinaryHeap<Reverse<(u64, String)>> = BinaryHeap::new();
        let mut next_offset = 0u64;

        while let Some((block, result)) = results.recv().await {
            match result {
                Ok(digest) => {
                    reorder.push(Reverse((block.offset, digest)));
                    while reorder
                        .peek()
                        .is_some_and(|Reverse((offset, _))| *offset == next_offset)
                    {
                        if let Some(Reverse((offset, digest))) = reorder.pop() {
                            if tx.send(Ok(HashEntry { offset, digest })).await.is_err() {
                                cancel.cancel();
                                return;
                            }
                            next_offset = offset + block_size;
                        }
                    }
                }
                Err(e) => {
                    cancel.cancel();
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    });

    rx
}
