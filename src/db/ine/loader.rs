use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use duckdb::types::{ToSql, ToSqlOutput};
use itertools::Itertools;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::api::ine::records::IndicatorKind;
use crate::error::{EtlError, Result};
use crate::utils::lib_duckdb::{Column, ColumnType};

/// A snapshot record read back without knowing its kind.  Field names are the
/// union of the four record kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FieldBag {
    pub number_of_companies: Option<String>,
    pub number_of_people_working_for_companies: Option<String>,
    pub number_of_volume_of_business_for_companies: Option<String>,
    pub increased_value_for_companies: Option<String>,
    pub economic_activity_code: Option<String>,
    pub economic_activity_description: Option<String>,
    pub geographic_area_code: Option<String>,
    pub geographic_area_description: Option<String>,
    pub legal_form_code: Option<String>,
    pub legal_form_description: Option<String>,
    pub conv_signal: Option<String>,
    pub conv_signal_description: Option<String>,
}

impl FieldBag {
    /// Look a field up by its column name.
    pub fn field(&self, column: &str) -> Option<&String> {
        match column {
            "NumberOfCompanies" => self.number_of_companies.as_ref(),
            "NumberOfPeopleWorkingForCompanies" => {
                self.number_of_people_working_for_companies.as_ref()
            }
            "NumberOfVolumeOfBusinessForCompanies" => {
                self.number_of_volume_of_business_for_companies.as_ref()
            }
            "IncreasedValueForCompanies" => self.increased_value_for_companies.as_ref(),
            "EconomicActivityCode" => self.economic_activity_code.as_ref(),
            "EconomicActivityDescription" => self.economic_activity_description.as_ref(),
            "GeographicAreaCode" => self.geographic_area_code.as_ref(),
            "GeographicAreaDescription" => self.geographic_area_description.as_ref(),
            "LegalFormCode" => self.legal_form_code.as_ref(),
            "LegalFormDescription" => self.legal_form_description.as_ref(),
            "ConvSignal" => self.conv_signal.as_ref(),
            "ConvSignalDescription" => self.conv_signal_description.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    Int(i64),
    Text(Option<String>),
}

impl ToSql for Cell {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        match self {
            Cell::Int(v) => v.to_sql(),
            Cell::Text(v) => v.to_sql(),
        }
    }
}

/// Parse a count, unparsable values (suppressed observations) become 0.
pub fn parse_count(value: Option<&String>) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

/// In-memory rows for one indicator, laid out like its DuckDB table.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub kind: IndicatorKind,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(kind: IndicatorKind) -> Table {
        let mut columns = vec![
            Column::int("Year"),
            Column::int(kind.measurement_column()),
            Column::text("EconomicActivityCode"),
            Column::text("EconomicActivityDescription"),
            Column::text("GeographicAreaCode"),
            Column::text("GeographicAreaDescription"),
        ];
        if kind.has_legal_form() {
            columns.extend([
                Column::text("LegalFormCode"),
                Column::text("LegalFormDescription"),
            ]);
        }
        columns.extend([
            Column::text("ConvSignal"),
            Column::text("ConvSignalDescription"),
        ]);
        Table {
            kind,
            columns,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Columns identifying a row: year, activity, area and, for companies,
    /// the legal form.
    pub fn key_columns(&self) -> Vec<&'static str> {
        let mut keys = vec!["Year", "EconomicActivityCode", "GeographicAreaCode"];
        if self.kind.has_legal_form() {
            keys.push("LegalFormCode");
        }
        keys
    }

    pub fn push(&mut self, year: i32, bag: &FieldBag) {
        let row = self
            .columns
            .iter()
            .map(|c| match (c.name, c.column_type) {
                ("Year", _) => Cell::Int(year as i64),
                (name, ColumnType::Integer) => Cell::Int(parse_count(bag.field(name))),
                (name, ColumnType::Text) => Cell::Text(bag.field(name).cloned()),
            })
            .collect();
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One table per indicator, filled by [`load_year_range`].
#[derive(Clone, Debug, PartialEq)]
pub struct Buffers {
    pub company: Table,
    pub service: Table,
    pub business: Table,
    pub value: Table,
}

impl Default for Buffers {
    fn default() -> Self {
        Buffers {
            company: Table::new(IndicatorKind::Company),
            service: Table::new(IndicatorKind::Service),
            business: Table::new(IndicatorKind::Business),
            value: Table::new(IndicatorKind::Value),
        }
    }
}

impl Buffers {
    pub fn table_mut(&mut self, kind: IndicatorKind) -> &mut Table {
        match kind {
            IndicatorKind::Company => &mut self.company,
            IndicatorKind::Service => &mut self.service,
            IndicatorKind::Business => &mut self.business,
            IndicatorKind::Value => &mut self.value,
        }
    }

    pub fn into_tables(self) -> [Table; 4] {
        [self.company, self.service, self.business, self.value]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct YearRange {
    pub smaller: i32,
    pub bigger: i32,
}

impl YearRange {
    pub fn new(bigger: i32, smaller: i32) -> Result<YearRange> {
        if bigger < smaller {
            return Err(EtlError::ArgumentInvalid(format!(
                "expected <biggerYear> <smallerYear>, e.g. 2022 2017, got {} {}",
                bigger, smaller
            )));
        }
        Ok(YearRange { smaller, bigger })
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.smaller..=self.bigger
    }
}

/// Read one snapshot file.  Null entries are dropped.
pub fn read_snapshot(path: &Path) -> Result<Vec<FieldBag>> {
    let json = fs::read_to_string(path).map_err(|e| EtlError::io(path, e))?;
    let bags: Vec<Option<FieldBag>> = serde_json::from_str(&json)?;
    Ok(bags.into_iter().flatten().collect())
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| EtlError::io(dir, e))?;
    let files = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .sorted()
        .collect();
    Ok(files)
}

/// Read all the snapshots for the years in the range into one table per
/// indicator.  Years without a directory and unreadable files are skipped.
pub fn load_year_range(data_dir: &Path, range: YearRange) -> Result<Buffers> {
    let mut buffers = Buffers::default();
    for year in range.years() {
        let dir = data_dir.join(year.to_string());
        let files = match json_files(&dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("skipping year {}: {}", year, e);
                continue;
            }
        };
        for file in files {
            let file_name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let Some(kind) = IndicatorKind::from_file_name(file_name) else {
                warn!("skipping unknown file {}", file.display());
                continue;
            };
            let bags = match read_snapshot(&file) {
                Ok(bags) => bags,
                Err(e) => {
                    error!("Failed to read {}: {}", file.display(), e);
                    continue;
                }
            };
            let table = buffers.table_mut(kind);
            for bag in &bags {
                table.push(year, bag);
            }
            info!("loaded {} {} rows for {}", bags.len(), kind, year);
        }
    }
    Ok(buffers)
}
