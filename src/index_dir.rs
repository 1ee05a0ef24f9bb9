//! Creating and deleting index directories.

use std::{os::unix::fs::DirBuilderExt, path::Path};

use tracing::{debug, info};

use crate::{
    error::{Result, UsageError},
    library::{SearchLibrary, WriteIndex},
};

/// Permissions of a parent directory created for a new index.
const PARENT_DIR_MODE: u32 = 0o750;

fn require_absolute(path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(UsageError::RelativePath(path.to_path_buf()).into())
    }
}

/// Create an empty index at `path`. Its parent directory is created first
/// when missing; anything further up must already exist.
pub fn init_empty_index<L: SearchLibrary>(
    library: &L,
    path: &Path,
) -> Result<()> {
    require_absolute(path)?;
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        std::fs::DirBuilder::new()
            .mode(PARENT_DIR_MODE)
            .create(parent)?;
        debug!(path = %parent.display(), "Created index parent directory");
    }
    library.create_index(path)
}

/// Delete the index at `path` and, if asked, its parent directory when that
/// is left empty.
///
/// The index is first opened for writing, so a directory that is not an
/// index, or an index another writer holds, is left alone.
pub fn remove_index<L: SearchLibrary>(
    library: &L,
    path: &Path,
    remove_parent: bool,
) -> Result<()> {
    require_absolute(path)?;
    {
        let mut writer = library.open_writer(path)?;
        writer.close()?;
    }

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    std::fs::remove_dir(path)?;
    info!(path = %path.display(), "Removed index");

    if remove_parent
        && let Some(parent) = path.parent()
        && let Err(err) = std::fs::remove_dir(parent)
    {
        debug!(path = %parent.display(), error = %err, "Kept parent directory");
    }
    Ok(())
}
