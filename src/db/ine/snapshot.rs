use std::path::{Path, PathBuf};

use log::info;
use tokio::fs;

use crate::api::ine::records::{IndicatorKind, Record};
use crate::error::{EtlError, Result};

/// File whose presence marks the root of the project.
pub const PROJECT_MARKER: &str = "Cargo.toml";

/// Walk up from `start` until a directory containing [`PROJECT_MARKER`] is
/// found.  Falls back to `start` itself.
pub fn find_repo_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .unwrap_or(start)
        .to_path_buf()
}

/// Return the json filename for one indicator and one year, e.g.
/// `<data_dir>/2022/CompanyData.json`.  Does not check if the file exists.
pub fn snapshot_path(data_dir: &Path, kind: IndicatorKind, year: i32) -> PathBuf {
    data_dir.join(year.to_string()).join(kind.file_name())
}

/// Write the records as an indented json array.  Overwrites the previous
/// snapshot for that year, if any.
pub async fn write_snapshot(
    data_dir: &Path,
    kind: IndicatorKind,
    year: i32,
    records: &[Record],
) -> Result<PathBuf> {
    let path = snapshot_path(data_dir, kind, year);
    let json = serde_json::to_string_pretty(records)?;

    let dir = data_dir.join(year.to_string());
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| EtlError::io(&dir, e))?;
    fs::write(&path, json)
        .await
        .map_err(|e| EtlError::io(&path, e))?;

    info!(
        "wrote {} {} records to {}",
        records.len(),
        kind,
        path.display()
    );
    Ok(path)
}
