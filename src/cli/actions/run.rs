use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cli::actions::Action;
use crate::pdiffcopy::client::Transfer;
use crate::pdiffcopy::server::{self, ServerState};

/// Handle the parsed action: run a transfer or start the server.
#[instrument(skip(action))]
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Serve { addr, concurrency } => {
            let listener = TcpListener::bind(&addr).await?;
            info!("serving on http://{}", listener.local_addr()?);
            server::serve(listener, ServerState { concurrency }).await
        }
        Action::Sync {
            source,
            target,
            options,
        } => {
            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, draining workers");
                        cancel.cancel();
                    }
                });
            }

            let transfer = Transfer {
                source,
                target,
                options,
            };
            let summary = transfer.run(cancel).await?;

            if summary.dry_run {
                println!(
                    "Dry run: {} of {} blocks differ (similarity {:.1}%)",
                    summary.blocks_differing,
                    summary.total_blocks,
                    summary.similarity * 100.0
                );
            } else if summary.blocks_differing == 0 {
                println!("Nothing to do, file contents match");
            } else {
                println!(
                    "Synchronized {} of {} blocks ({} bytes, similarity {:.1}%)",
                    summary.blocks_differing,
                    summary.total_blocks,
                    summary.bytes_transferred,
                    summary.similarity * 100.0
                );
            }
            Ok(())
        }
    }
}
