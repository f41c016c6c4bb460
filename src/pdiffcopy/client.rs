//! Client side of a transfer: describe both endpoints, hash them in
//! parallel, compute the delta and rewrite the differing blocks.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pdiffcopy::delta::{self, Delta};
use crate::pdiffcopy::errors::{Result, TransferError};
use crate::pdiffcopy::location::Location;
use crate::pdiffcopy::options::TransferOptions;
use crate::pdiffcopy::remote::{build_http_client, RemoteFile};
use crate::pdiffcopy::{hashing, operations, pool, BlockRef};

/// Direction of the block copies, seen from the local side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    /// The remote file is the source: download differing blocks.
    Pull,
    /// The local file is the source: upload differing blocks.
    Push,
}

impl Direction {
    const fn action(self) -> &'static str {
        match self {
            Self::Pull => "download",
            Self::Push => "upload",
        }
    }
}

/// What a finished transfer (or dry run) looked like.
#[derive(Clone, Copy, Debug)]
pub struct TransferSummary {
    pub total_blocks: usize,
    pub blocks_differing: usize,
    pub bytes_transferred: u64,
    pub similarity: f64,
    pub dry_run: bool,
}

/// A single file synchronization between a local path and a remote server.
#[derive(Clone, Debug)]
pub struct Transfer {
    pub source: Location,
    pub target: Location,
    pub options: TransferOptions,
}

impl Transfer {
    /// Run the transfer to completion. Cancelling `cancel` drains the
    /// workers and fails the transfer with [`TransferError::Cancelled`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<TransferSummary> {
        let opts = self.options;
        let (local_path, (host, port, path), direction) = self.split_endpoints()?;
        let http = build_http_client(opts.concurrency)?;
        let remote = Arc::new(RemoteFile::new(http, host, port, path));

        // Describe both endpoints before any hash work starts.
        let source_size = describe(&self.source, &remote).await?;
        let target_size = describe(&self.target, &remote).await?;
        if source_size != target_size {
            return Err(TransferError::SizeMismatch {
                source_size,
                target_size,
            });
        }
        let size = source_size;
        info!("synchronizing {} -> {} ({size} bytes)", self.source.label(), self.target.label());

        let delta = if opts.whole_file {
            info!("whole file mode: skipping hashing, copying every block");
            Delta::whole(size, opts.block_size)
        } else {
            info!("computing block hashes with {} workers", opts.concurrency);
            let local_entries = hashing::local_hash_stream(
                local_path.clone(),
                size,
                opts.block_size,
                opts.hash_method,
                opts.concurrency,
                cancel.child_token(),
            );
            let remote_entries = remote.hash_stream(
                opts.block_size,
                opts.hash_method,
                opts.concurrency,
                cancel.child_token(),
            );
            let delta =
                match delta::compute(size, opts.block_size, local_entries, remote_entries).await {
                    Ok(delta) => delta,
                    // A cancelled pipeline surfaces as a truncated stream;
                    // report the cancellation, not the symptom.
                    Err(_) if cancel.is_cancelled() => return Err(TransferError::Cancelled),
                    Err(e) => return Err(e),
                };
            info!(
                "computed {:.1}% similarity ({} of {} blocks differ)",
                delta.similarity() * 100.0,
                delta.differing.len(),
                delta.total_blocks
            );
            delta
        };

        let summary = TransferSummary {
            total_blocks: delta.total_blocks,
            blocks_differing: delta.differing.len(),
            bytes_transferred: 0,
            similarity: delta.similarity(),
            dry_run: opts.dry_run,
        };

        if opts.dry_run {
            info!(
                "dry run: would {} {} blocks ({} bytes)",
                direction.action(),
                delta.differing.len(),
                delta.transfer_size()
            );
            return Ok(summary);
        }
        if delta.differing.is_empty() {
            info!("nothing to do, file contents match");
            return Ok(summary);
        }

        let bytes_transferred = self
            .copy_blocks(&delta, direction, local_path, remote, cancel)
            .await?;

        Ok(TransferSummary {
            bytes_transferred,
            ..summary
        })
    }

    /// The parallel fetch-and-write loop over the differing blocks. Blocks
    /// land in any order; offsets are disjoint so concurrent positional
    /// writes never overlap.
    async fn copy_blocks(
        &self,
        delta: &Delta,
        direction: Direction,
        local_path: PathBuf,
        remote: Arc<RemoteFile>,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let opts = self.options;
        let bytes_total = delta.transfer_size();
        info!(
            "will {} {} blocks totaling {bytes_total} bytes",
            direction.action(),
            delta.differing.len()
        );
        let progress = progress_bar(bytes_total, direction.action());

        let worker = {
            let remote = Arc::clone(&remote);
            move |block: BlockRef| {
                let remote = Arc::clone(&remote);
                let local_path = local_path.clone();
                async move {
                    match direction {
                        Direction::Pull => {
                            let data = remote.read_block(block).await?;
                            tokio::task::spawn_blocking(move || {
                                operations::write_block(&local_path, block.offset, &data)
                            })
                            .await
                            .map_err(|e| {
                                TransferError::Protocol(format!("write worker died: {e}"))
                            })??;
                        }
                        Direction::Push => {
                            let data = tokio::task::spawn_blocking(move || {
                                operations::read_block(&local_path, block.offset, block.length)
                            })
                            .await
                            .map_err(|e| {
                                TransferError::Protocol(format!("read worker died: {e}"))
                            })??;
                            remote.write_block(block.offset, Bytes::from(data)).await?;
                        }
                    }
                    Ok(block.length)
                }
            }
        };

        let mut results = pool::run(
            delta.differing.clone(),
            opts.concurrency,
            worker,
            cancel.clone(),
        );

        let mut bytes_transferred = 0u64;
        let mut first_error = None;
        while let Some((block, result)) = results.recv().await {
            match result {
                Ok(length) => {
                    bytes_transferred += length;
                    progress.inc(length);
                }
                Err(e) => {
                    tracing::error!("block at offset {} failed: {e}", block.offset);
                    first_error = Some(e);
                    cancel.cancel();
                    break;
                }
            }
        }
        // Drain whatever was in flight when we stopped.
        while results.recv().await.is_some() {}

        if let Some(e) = first_error {
            progress.abandon();
            return Err(e);
        }
        if cancel.is_cancelled() {
            progress.abandon();
            return Err(TransferError::Cancelled);
        }
        progress.finish();
        info!(
            "{}ed {} blocks ({bytes_transferred} bytes)",
            direction.action(),
            delta.differing.len()
        );
        Ok(bytes_transferred)
    }

    /// Exactly one endpoint must be remote; returns the local path, the
    /// remote coordinates and the resulting direction.
    #[allow(clippy::type_complexity)]
    fn split_endpoints(&self) -> Result<(PathBuf, (String, u16, String), Direction)> {
        match (&self.source, &self.target) {
            (
                Location::Remote { host, port, path },
                Location::Local(local),
            ) => Ok((
                local.clone(),
                (host.clone(), *port, path.clone()),
                Direction::Pull,
            )),
            (
                Location::Local(local),
                Location::Remote { host, port, path },
            ) => Ok((
                local.clone(),
                (host.clone(), *port, path.clone()),
                Direction::Push,
            )),
            _ => Err(TransferError::Protocol(
                "exactly one of source and target must be remote".to_string(),
            )),
        }
    }
}

async fn describe(location: &Location, remote: &RemoteFile) -> Result<u64> {
    info!("getting size of {}", location.label());
    let size = match location {
        Location::Local(path) => operations::file_size(path)?,
        Location::Remote { .. } => remote.file_size().await?,
    };
    size.ok_or_else(|| TransferError::NotFound(location.to_string()))
}

fn progress_bar(total: u64, action: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "{msg:>10} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .map(|s| s.progress_chars("=>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let pb = ProgressBar::new(total);
    pb.set_style(style);
    pb.set_message(format!("{action}ing"));
    pb
}
