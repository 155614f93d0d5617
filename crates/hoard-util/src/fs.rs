use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Reads a `.json` file from `path`.
///
/// ```ignore
/// let dataset: Dataset = hoard_util::read_json(path).await?;
/// ```
pub async fn read_json<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    trace!("reading file at path: {}", path.display());
    let file = tokio::fs::read(path).await?;
    let data: T = serde_json::from_slice(&file)?;
    Ok(data)
}

/// Writes `data` to `path` as pretty-printed `.json` (4-space indent).
///
/// The bytes land in a sibling `.tmp` file first, which is then renamed over
/// `path`; readers see either the old file or the new one, never half of it.
/// Parent directories are created as necessary.
pub async fn write_json<T: Serialize>(data: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut ser)?;

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &buf).await?;
    tokio::fs::rename(&tmp, path).await?;
    trace!("{} bytes written to {}", buf.len(), path.display());

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
