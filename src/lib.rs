pub mod cpu;
pub mod error;
pub mod rom;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub use error::Error;

/// Read program text from `path`. A missing file is reported as
/// [`Error::ProgramNotFound`] rather than a generic read failure.
pub fn read_program<P: AsRef<Path>>(path: P) -> Result<String, Error> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::ProgramNotFound(path.to_path_buf()),
        _ => Error::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })
}
