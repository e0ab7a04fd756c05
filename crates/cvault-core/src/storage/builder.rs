//! Builder for temp artifact files.

use std::fs::File;
use std::io;
use std::path::Path;

use super::writer::StorageWriter;

/// Builder for a new temp artifact file. Call `build` to get a `StorageWriter`
/// the transfer callback writes into.
pub struct StorageWriterBuilder {
    file: File,
    temp_path: std::path::PathBuf,
}

impl StorageWriterBuilder {
    /// Create a new temp file at `temp_path` (e.g. `fig.png.part`).
    /// Overwrites if the path already exists, which discards leftovers of an interrupted run.
    pub fn create(temp_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        Ok(StorageWriterBuilder {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Finish building and return the writer.
    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.temp_path)
    }
}
