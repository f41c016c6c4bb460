use std::path::Path;

use pdiffcopy::pdiffcopy::client::{Transfer, TransferSummary};
use pdiffcopy::pdiffcopy::errors::TransferError;
use pdiffcopy::pdiffcopy::hashing::HashMethod;
use pdiffcopy::pdiffcopy::location::Location;
use pdiffcopy::pdiffcopy::options::TransferOptions;
use pdiffcopy::pdiffcopy::server::{serve, ServerState};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const MIB: u64 = 1024 * 1024;

/// Start a server on an ephemeral port and return the port.
async fn start_server() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(serve(listener, ServerState { concurrency: 2 }));
    Ok(port)
}

fn remote(port: u16, path: &Path) -> Location {
    Location::parse(&format!("127.0.0.1:{port}{}", path.display()))
}

fn options(block_size: u64, concurrency: usize) -> TransferOptions {
    TransferOptions {
        block_size,
        hash_method: HashMethod::Sha1,
        concurrency,
        whole_file: false,
        dry_run: false,
    }
}

/// Deterministic non-repeating-per-block test data.
fn patterned(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

async fn pull(
    port: u16,
    source: &Path,
    target: &Path,
    options: TransferOptions,
) -> Result<TransferSummary, TransferError> {
    let transfer = Transfer {
        source: remote(port, source),
        target: Location::Local(target.to_path_buf()),
        options,
    };
    transfer.run(CancellationToken::new()).await
}

#[tokio::test]
async fn full_match_pull_transfers_nothing() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let data = patterned(10 * MIB as usize);
    std::fs::write(&src_path, &data)?;
    std::fs::write(&dst_path, &data)?;

    let port = start_server().await?;
    let summary = pull(port, &src_path, &dst_path, options(MIB, 4)).await?;

    assert_eq!(summary.total_blocks, 10);
    assert_eq!(summary.blocks_differing, 0);
    assert_eq!(summary.bytes_transferred, 0);
    assert!((summary.similarity - 1.0).abs() < f64::EPSILON);
    assert_eq!(std::fs::read(&dst_path)?, data);
    Ok(())
}

#[tokio::test]
async fn single_changed_block_is_the_only_transfer() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let src_data = patterned(4 * MIB as usize);
    let mut dst_data = src_data.clone();
    let offset = 2 * MIB as usize;
    for byte in &mut dst_data[offset..offset + 16] {
        *byte ^= 0xFF;
    }
    std::fs::write(&src_path, &src_data)?;
    std::fs::write(&dst_path, &dst_data)?;

    let port = start_server().await?;
    let summary = pull(port, &src_path, &dst_path, options(MIB, 4)).await?;

    assert_eq!(summary.total_blocks, 4);
    assert_eq!(summary.blocks_differing, 1);
    assert_eq!(summary.bytes_transferred, MIB);
    assert_eq!(std::fs::read(&dst_path)?, src_data);
    Ok(())
}

#[tokio::test]
async fn short_final_block_transfers_its_exact_length() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let size = 3 * MIB as usize + 100;
    let src_data = patterned(size);
    let mut dst_data = src_data.clone();
    for byte in &mut dst_data[size - 50..] {
        *byte = 0;
    }
    std::fs::write(&src_path, &src_data)?;
    std::fs::write(&dst_path, &dst_data)?;

    let port = start_server().await?;
    // Degenerate parallelism must behave identically.
    let summary = pull(port, &src_path, &dst_path, options(MIB, 1)).await?;

    assert_eq!(summary.total_blocks, 4);
    assert_eq!(summary.blocks_differing, 1);
    assert_eq!(summary.bytes_transferred, 100);
    assert_eq!(std::fs::read(&dst_path)?, src_data);
    Ok(())
}

#[tokio::test]
async fn whole_file_mode_copies_every_block() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let src_data = patterned(5 * MIB as usize);
    let dst_data: Vec<u8> = src_data.iter().map(|b| b.wrapping_add(1)).collect();
    std::fs::write(&src_path, &src_data)?;
    std::fs::write(&dst_path, &dst_data)?;

    let port = start_server().await?;
    let summary = pull(
        port,
        &src_path,
        &dst_path,
        TransferOptions {
            whole_file: true,
            ..options(MIB, 3)
        },
    )
    .await?;

    assert_eq!(summary.total_blocks, 5);
    assert_eq!(summary.blocks_differing, 5);
    assert_eq!(summary.bytes_transferred, 5 * MIB);
    assert_eq!(std::fs::read(&dst_path)?, src_data);
    Ok(())
}

#[tokio::test]
async fn size_mismatch_fails_before_any_write() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    std::fs::write(&src_path, patterned(MIB as usize + 1))?;
    let dst_data = patterned(MIB as usize);
    std::fs::write(&dst_path, &dst_data)?;

    let port = start_server().await?;
    let err = pull(port, &src_path, &dst_path, options(MIB, 4))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::SizeMismatch { .. }));
    assert_eq!(std::fs::read(&dst_path)?, dst_data);
    Ok(())
}

#[tokio::test]
async fn dry_run_reports_but_never_writes() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let src_data = patterned(4 * MIB as usize);
    let mut dst_data = src_data.clone();
    let offset = 2 * MIB as usize;
    for byte in &mut dst_data[offset..offset + 16] {
        *byte ^= 0xFF;
    }
    std::fs::write(&src_path, &src_data)?;
    std::fs::write(&dst_path, &dst_data)?;
    let mtime_before = std::fs::metadata(&dst_path)?.modified()?;

    let port = start_server().await?;
    let summary = pull(
        port,
        &src_path,
        &dst_path,
        TransferOptions {
            dry_run: true,
            ..options(MIB, 4)
        },
    )
    .await?;

    assert!(summary.dry_run);
    assert_eq!(summary.blocks_differing, 1);
    assert_eq!(summary.bytes_transferred, 0);
    assert_eq!(std::fs::read(&dst_path)?, dst_data);
    assert_eq!(std::fs::metadata(&dst_path)?.modified()?, mtime_before);
    Ok(())
}

#[tokio::test]
async fn push_writes_changed_blocks_to_the_server() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let src_data = patterned(3 * MIB as usize);
    let mut dst_data = src_data.clone();
    dst_data[0] ^= 0xFF;
    dst_data[2 * MIB as usize] ^= 0xFF;
    std::fs::write(&src_path, &src_data)?;
    std::fs::write(&dst_path, &dst_data)?;

    let port = start_server().await?;
    let transfer = Transfer {
        source: Location::Local(src_path.clone()),
        target: remote(port, &dst_path),
        options: options(MIB, 4),
    };
    let summary = transfer.run(CancellationToken::new()).await?;

    assert_eq!(summary.blocks_differing, 2);
    assert_eq!(summary.bytes_transferred, 2 * MIB);
    assert_eq!(std::fs::read(&dst_path)?, src_data);
    Ok(())
}

#[tokio::test]
async fn second_run_is_idempotent() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let src_data = patterned(2 * MIB as usize);
    let dst_data: Vec<u8> = src_data.iter().map(|b| b.wrapping_add(1)).collect();
    std::fs::write(&src_path, &src_data)?;
    std::fs::write(&dst_path, &dst_data)?;

    let port = start_server().await?;
    let first = pull(port, &src_path, &dst_path, options(MIB, 2)).await?;
    assert_eq!(first.blocks_differing, 2);

    let second = pull(port, &src_path, &dst_path, options(MIB, 2)).await?;
    assert_eq!(second.blocks_differing, 0);
    assert_eq!(second.bytes_transferred, 0);
    assert_eq!(std::fs::read(&dst_path)?, src_data);
    Ok(())
}

#[tokio::test]
async fn empty_files_synchronize_trivially() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    std::fs::write(&src_path, b"")?;
    std::fs::write(&dst_path, b"")?;

    let port = start_server().await?;
    let summary = pull(port, &src_path, &dst_path, options(MIB, 4)).await?;

    assert_eq!(summary.total_blocks, 0);
    assert_eq!(summary.blocks_differing, 0);
    assert!((summary.similarity - 1.0).abs() < f64::EPSILON);
    Ok(())
}

#[tokio::test]
async fn missing_remote_file_is_not_found() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let dst_path = dir.path().join("target.bin");
    std::fs::write(&dst_path, patterned(MIB as usize))?;

    let port = start_server().await?;
    let err = pull(
        port,
        &dir.path().join("does-not-exist.bin"),
        &dst_path,
        options(MIB, 4),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TransferError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn tiny_blocks_still_converge() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let src_path = dir.path().join("source.bin");
    let dst_path = dir.path().join("target.bin");
    let src_data = patterned(1000);
    let mut dst_data = src_data.clone();
    dst_data[500] ^= 0xFF;
    std::fs::write(&src_path, &src_data)?;
    std::fs::write(&dst_path, &dst_data)?;

    let port = start_server().await?;
    // One-byte blocks: slow, but must not deadlock or misalign.
    let summary = pull(port, &src_path, &dst_path, options(1, 4)).await?;

    assert_eq!(summary.total_blocks, 1000);
    assert_eq!(summary.blocks_differing, 1);
    assert_eq!(summary.bytes_transferred, 1);
    assert_eq!(std::fs::read(&dst_path)?, src_data);
    Ok(())
}
