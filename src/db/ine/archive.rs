use std::path::{Path, PathBuf};

use duckdb::AccessMode;
use futures::future::join_all;
use log::{error, info};

use crate::api::ine::indicator::{fetch_indicator, Transport};
use crate::api::ine::records::IndicatorKind;
use crate::api::ine::regions::Region;
use crate::db::ine::loader::{load_year_range, Buffers, YearRange};
use crate::db::ine::snapshot::{snapshot_path, write_snapshot};
use crate::db::ine::upsert::{count_rows, upsert_all, UpsertReport, BATCH_SIZE};
use crate::error::Result;
use crate::utils::lib_duckdb::open;

#[derive(Clone)]
pub struct IneIndicatorArchive {
    /// Directory with one sub-directory of json snapshots per year.
    pub base_dir: String,
    pub duckdb_path: String,
    pub api_url: String,
}

impl IneIndicatorArchive {
    /// Return the json filename for the indicator and year.  Does not check if
    /// the file exists.
    pub fn filename(&self, kind: IndicatorKind, year: i32) -> PathBuf {
        snapshot_path(Path::new(&self.base_dir), kind, year)
    }

    /// Fetch the four indicators for the year and save one json file per
    /// indicator.  An indicator that fails to download or to save is logged
    /// and doesn't stop the others.
    pub async fn download_year<T: Transport>(
        &self,
        transport: &T,
        year: i32,
        regions: &[Region],
        sector_codes: &[&str],
    ) -> Vec<(IndicatorKind, Result<PathBuf>)> {
        let fetches = IndicatorKind::all().map(|kind| async move {
            let records =
                fetch_indicator(transport, &self.api_url, kind, year, regions, sector_codes).await;
            (kind, records)
        });
        let fetched = join_all(fetches).await;

        let writes = fetched.into_iter().map(|(kind, records)| async move {
            let res = match records {
                Ok(records) => {
                    write_snapshot(Path::new(&self.base_dir), kind, year, &records).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = &res {
                error!("Fetching {} for {} did not work: {}", kind, year, e);
            }
            (kind, res)
        });
        join_all(writes).await
    }

    /// Read the json snapshots for all the years in the range.
    pub fn load_years(&self, range: YearRange) -> Result<Buffers> {
        info!(
            "loading json files for years {} to {} ...",
            range.smaller, range.bigger
        );
        load_year_range(Path::new(&self.base_dir), range)
    }

    /// Load the snapshots for the years in the range and merge them into
    /// DuckDB, one transaction per indicator.
    pub async fn update_duckdb(
        &self,
        range: YearRange,
    ) -> Result<Vec<(IndicatorKind, Result<UpsertReport>)>> {
        let buffers = self.load_years(range)?;
        let conn = open(&self.duckdb_path, AccessMode::ReadWrite)?;
        let results = upsert_all(&conn, buffers, BATCH_SIZE).await;

        for (kind, result) in &results {
            if result.is_ok() {
                for year in range.years() {
                    info!(
                        "{} has {} rows for {}",
                        kind,
                        count_rows(&conn, *kind, Some(year))?,
                        year
                    );
                }
            }
        }
        Ok(results)
    }
}
