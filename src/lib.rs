//! Parallel, differential copy of very large files.
//!
//! One binary serves both roles: started with `--listen` it becomes a
//! long-running HTTP server exposing file metadata, block hashes and raw
//! block I/O; started with a SOURCE and TARGET it becomes the client that
//! hashes both sides in parallel and rewrites only the blocks that differ.

pub mod cli;
pub mod pdiffcopy;
