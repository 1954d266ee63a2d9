//! RON file loading shared by the in-memory collaborators.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Load all .ron files from a directory, calling `loader` for each.
///
/// Files are visited in path order so later files override earlier ones
/// deterministically.
pub fn load_ron_files_from_dir<F, E>(dir: &Path, mut loader: F) -> Result<(), E>
where
    F: FnMut(&Path) -> Result<(), E>,
    E: From<std::io::Error>,
{
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();

    for path in &paths {
        loader(path.as_path())?;
    }
    Ok(())
}
