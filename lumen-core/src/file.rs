use std::fs::File;
use std::path::Path;
use anyhow::{bail, Context, Result};
use memmap2::Mmap;

/// Map a whole file into memory, read-only.
///
/// Empty files are rejected since they cannot be mapped on every platform.
pub fn load_with_memory_mapping(path: impl AsRef<Path>) -> Result<Mmap> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let len = file.metadata()?.len();
    if len == 0 {
        bail!("{} is empty", path.display());
    }

    // The mapping is only ever read, and the file is not expected to change while loaded.
    let mapping = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map {}", path.display()))?;
    Ok(mapping)
}

/// Load a text file through a memory mapping, validating it as UTF-8.
pub fn load_text(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mapping = load_with_memory_mapping(path)?;
    let text = std::str::from_utf8(&mapping)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(text.to_owned())
}
