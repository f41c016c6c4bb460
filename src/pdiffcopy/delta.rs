//! Streaming delta computation.
//!
//! Both hash streams arrive in strictly ascending offset order, so the two
//! sides can be merged in lock-step without buffering either stream. The
//! offset sequences must be identical; the caller has already verified that
//! both files have the same size and block size.

use tokio::sync::mpsc;

use crate::pdiffcopy::errors::{Result, TransferError};
use crate::pdiffcopy::hashing::HashEntry;
use crate::pdiffcopy::{block_refs, BlockRef};

/// The outcome of comparing two hash streams: which blocks differ, out of
/// how many.
#[derive(Clone, Debug)]
pub struct Delta {
    pub differing: Vec<BlockRef>,
    pub total_blocks: usize,
}

impl Delta {
    /// Synthesize the delta used by whole-file mode: every block differs.
    pub fn whole(size: u64, block_size: u64) -> Self {
        let differing: Vec<BlockRef> = block_refs(size, block_size).collect();
        let total_blocks = differing.len();
        Self { differing, total_blocks }
    }

    /// `1 - differing / total`, or 1.0 for an empty file.
    pub fn similarity(&self) -> f64 {
        if self.total_blocks == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            1.0 - self.differing.len() as f64 / self.total_blocks as f64
        }
    }

    /// Total number of bytes that the transfer will move. The final block
    /// of a file may be short, so this sums the per-block lengths instead
    /// of multiplying by the block size.
    pub fn transfer_size(&self) -> u64 {
        self.differing.iter().map(|b| b.length).sum()
    }
}

/// Merge two ascending hash streams and collect the offsets whose digests
/// differ. Either stream ending early, or presenting an unexpected offset,
/// is a protocol error.
pub async fn compute(
    size: u64,
    block_size: u64,
    mut local: mpsc::Receiver<Result<HashEntry>>,
    mut remote: mpsc::Receiver<Result<HashEntry>>,
) -> Result<Delta> {
    let mut differing = Vec::new();
    let mut total_blocks = 0usize;

    for block in block_refs(size, block_size) {
        total_blocks += 1;
        let ours = next_entry(&mut local, block.offset, "local").await?;
        let theirs = next_entry(&mut remote, block.offset, "remote").await?;
        if ours.digest != theirs.digest {
            differing.push(block);
        }
    }

    expect_exhausted(&mut local, "local").await?;
    expect_exhausted(&mut remote, "remote").await?;

    Ok(Delta { differing, total_blocks })
}

async fn next_entry(
    stream: &mut mpsc::Receiver<Result<HashEntry>>,
    expected_offset: u64,
    side: &str,
) -> Result<HashEntry> {
    let entry = stream.recv().await.ok_or_else(|| {
        TransferError::Protocol(format!("{side} hash stream ended before offset {expected_offset}"))
    })??;
    if entry.offset != expected_offset {
        return Err(TransferError::Protocol(format!(
            "{side} hash stream out of order: expected offset {expected_offset}, got {}",
            entry.offset
        )));
    }
    Ok(entry)
}

async fn expect_exhausted(
    stream: &mut mpsc::Receiver<Result<HashEntry>>,
    side: &str,
) -> Result<()> {
    match stream.recv().await {
        None => Ok(()),
        Some(Err(e)) => Err(e),
        Some(Ok(entry)) => Err(TransferError::Protocol(format!(
            "{side} hash stream has a trailing entry at offset {}",
            entry.offset
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(entries: Vec<HashEntry>) -> mpsc::Receiver<Result<HashEntry>> {
        let (tx, rx) = mpsc::channel(entries.len().max(1));
        tokio::spawn(async move {
            for entry in entries {
                if tx.send(Ok(entry)).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn entry(offset: u64, digest: &str) -> HashEntry {
        HashEntry { offset, digest: digest.to_string() }
    }

    #[tokio::test]
    async fn identical_streams_have_empty_diff() -> anyhow::Result<()> {
        let local = stream(vec![entry(0, "aa"), entry(1024, "bb")]);
        let remote = stream(vec![entry(0, "aa"), entry(1024, "bb")]);

        let delta = compute(2048, 1024, local, remote).await?;
        assert!(delta.differing.is_empty());
        assert_eq!(delta.total_blocks, 2);
        assert!((delta.similarity() - 1.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn differing_block_is_reported_with_short_length() -> anyhow::Result<()> {
        let local = stream(vec![entry(0, "aa"), entry(1024, "bb"), entry(2048, "cc")]);
        let remote = stream(vec![entry(0, "aa"), entry(1024, "bb"), entry(2048, "XX")]);

        // 2500 bytes: the last block only covers 452 of them.
        let delta = compute(2500, 1024, local, remote).await?;
        assert_eq!(delta.differing, vec![BlockRef { offset: 2048, length: 452 }]);
        assert_eq!(delta.transfer_size(), 452);
        Ok(())
    }

    #[tokio::test]
    async fn early_termination_is_a_protocol_error() {
        let local = stream(vec![entry(0, "aa")]);
        let remote = stream(vec![entry(0, "aa"), entry(1024, "bb")]);

        let err = compute(2048, 1024, local, remote).await.unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[tokio::test]
    async fn out_of_order_entry_is_a_protocol_error() {
        let local = stream(vec![entry(1024, "bb"), entry(0, "aa")]);
        let remote = stream(vec![entry(0, "aa"), entry(1024, "bb")]);

        let err = compute(2048, 1024, local, remote).await.unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[tokio::test]
    async fn empty_file_has_empty_delta() -> anyhow::Result<()> {
        let delta = compute(0, 1024, stream(vec![]), stream(vec![])).await?;
        assert_eq!(delta.total_blocks, 0);
        assert!(delta.differing.is_empty());
        assert!((delta.similarity() - 1.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn whole_file_delta_covers_every_block() {
        let delta = Delta::whole(2500, 1024);
        assert_eq!(delta.total_blocks, 3);
        assert_eq!(delta.transfer_size(), 2500);
        assert!((delta.similarity() - 0.0).abs() < f64::EPSILON);
    }
}
