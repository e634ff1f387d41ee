use std::io;
use std::path::PathBuf;

use crate::rom::RomError;

/// Failures at the file and tool boundary. Per-line assembler problems are
/// diagnostics, see [`crate::cpu::assembler::Diagnostic`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("program file {} not found", .0.display())]
    ProgramNotFound(PathBuf),

    #[error("failed to read {}: {}", .path.display(), .source)]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {}", .path.display(), .source)]
    Write { path: PathBuf, source: io::Error },

    #[error("assembly failed with {0} error(s)")]
    Assembly(usize),

    #[error("{0} reference encoding(s) did not match")]
    VerificationFailed(usize),

    #[error(transparent)]
    Rom(#[from] RomError),
}
