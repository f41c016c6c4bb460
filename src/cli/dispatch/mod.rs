use anyhow::{bail, Result};

use crate::cli::actions::Action;
use crate::pdiffcopy::hashing::HashMethod;
use crate::pdiffcopy::location::Location;
use crate::pdiffcopy::options::TransferOptions;
use crate::pdiffcopy::{default_concurrency, BLOCK_SIZE, DEFAULT_PORT};

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let concurrency = matches
        .get_one::<usize>("concurrency")
        .copied()
        .unwrap_or_else(default_concurrency);

    let source = matches.get_one::<String>("source");
    let target = matches.get_one::<String>("target");

    match (source, target) {
        (None, None) => Ok(Action::Serve {
            addr: listen_address(matches.get_one::<String>("listen")),
            concurrency,
        }),
        (Some(source), Some(target)) => {
            let source = Location::parse(source);
            let target = Location::parse(target);
            match (source.is_remote(), target.is_remote()) {
                (true, true) => bail!("Only one of SOURCE and TARGET may be remote"),
                (false, false) => {
                    bail!("One of SOURCE and TARGET must be a HOST:PORT/PATH expression")
                }
                _ => {}
            }
            let options = TransferOptions {
                block_size: matches
                    .get_one::<u64>("block_size")
                    .copied()
                    .unwrap_or(BLOCK_SIZE),
                hash_method: matches
                    .get_one::<HashMethod>("hash_method")
                    .copied()
                    .unwrap_or(HashMethod::Sha1),
                concurrency,
                whole_file: matches.get_flag("whole_file"),
                dry_run: matches.get_flag("dry_run"),
            };
            Ok(Action::Sync {
                source,
                target,
                options,
            })
        }
        _ => bail!("Two positional arguments expected (SOURCE and TARGET)"),
    }
}

/// `--listen` accepts `HOST:PORT`, a bare `PORT` or a bare `HOST`.
fn listen_address(value: Option<&String>) -> String {
    match value {
        None => format!("0.0.0.0:{DEFAULT_PORT}"),
        Some(addr) if addr.chars().all(|c| c.is_ascii_digit()) => format!("0.0.0.0:{addr}"),
        Some(addr) if addr.contains(':') => addr.clone(),
        Some(host) => format!("{host}:{DEFAULT_PORT}"),
    }
}
