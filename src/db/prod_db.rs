use std::env;
use std::path::PathBuf;

use crate::api::ine::indicator::INE_API_URL;
use crate::db::ine::archive::IneIndicatorArchive;
use crate::db::ine::snapshot::find_repo_root;

pub struct ProdDb {}

impl ProdDb {
    /// Snapshots live in `<repo>/Data/<year>`, next to the DuckDB file.
    /// `INE_DATA_DIR`, `INE_DUCKDB_PATH` and `INE_API_URL` override the defaults.
    pub fn ine_indicators() -> IneIndicatorArchive {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let data_dir = find_repo_root(&cwd).join("Data");
        IneIndicatorArchive {
            base_dir: env::var("INE_DATA_DIR")
                .unwrap_or_else(|_| data_dir.to_string_lossy().into_owned()),
            duckdb_path: env::var("INE_DUCKDB_PATH")
                .unwrap_or_else(|_| data_dir.join("ine.duckdb").to_string_lossy().into_owned()),
            api_url: env::var("INE_API_URL").unwrap_or_else(|_| INE_API_URL.to_string()),
        }
    }
}
