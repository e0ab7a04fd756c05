//! Disk I/O and file lifecycle for archive artifacts.
//!
//! Every artifact is written to a `.part` sibling first and renamed into place
//! only after the bytes are synced, so a file at its final name is always
//! complete. Also classifies out-of-space errors, which are run-fatal.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `render.png` → `render.png.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Writes `data` to `final_path` via temp file, fsync and rename.
/// On failure the temp file is removed and `final_path` is left as it was.
pub fn write_atomic(final_path: &Path, data: &[u8]) -> io::Result<()> {
    let tp = temp_path(final_path);
    let res = (|| {
        let mut f = std::fs::File::create(&tp)?;
        f.write_all(data)?;
        f.sync_all()?;
        drop(f);
        std::fs::rename(&tp, final_path)
    })();
    if res.is_err() {
        let _ = std::fs::remove_file(&tp);
    }
    res
}

/// True when `e` means the volume is out of space.
pub fn is_disk_full(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if e.raw_os_error() == Some(libc::ENOSPC) {
            return true;
        }
    }
    #[cfg(windows)]
    {
        // ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL
        if matches!(e.raw_os_error(), Some(39) | Some(112)) {
            return true;
        }
    }
    false
}
