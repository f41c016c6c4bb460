use crate::pdiffcopy::hashing::HashMethod;
use crate::pdiffcopy::{default_concurrency, BLOCK_SIZE};

/// Parameters of a single transfer. Immutable once the transfer starts.
#[derive(Clone, Copy, Debug)]
pub struct TransferOptions {
    /// Size in bytes of the blocks being hashed and copied (must be >= 1).
    pub block_size: u64,
    /// Digest used to compare blocks; both endpoints must support it.
    pub hash_method: HashMethod,
    /// Maximum number of in-flight hash or block copy operations.
    pub concurrency: usize,
    /// Skip hashing and transfer every block unconditionally.
    pub whole_file: bool,
    /// Compute and report the diff but never write to the target.
    pub dry_run: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            hash_method: HashMethod::Sha1,
            concurrency: default_concurrency(),
            whole_file: false,
            dry_run: false,
        }
    }
}
