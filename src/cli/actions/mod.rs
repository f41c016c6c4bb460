pub mod run;

use crate::pdiffcopy::location::Location;
use crate::pdiffcopy::options::TransferOptions;

#[derive(Debug)]
pub enum Action {
    Sync {
        source: Location,
        target: Location,
        options: TransferOptions,
    },
    Serve {
        addr: String,
        concurrency: usize,
    },
}
