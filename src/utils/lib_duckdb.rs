use duckdb::{AccessMode, Config, Connection};
use itertools::Itertools;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Text => "VARCHAR",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
}

impl Column {
    pub const fn int(name: &'static str) -> Column {
        Column {
            name,
            column_type: ColumnType::Integer,
        }
    }

    pub const fn text(name: &'static str) -> Column {
        Column {
            name,
            column_type: ColumnType::Text,
        }
    }
}

/// Use this function to open a DuckDB connection, e.g.
/// `open("/data/ine.duckdb", AccessMode::ReadWrite)`.
pub fn open(duckdb_path: &str, access_mode: AccessMode) -> Result<Connection, duckdb::Error> {
    let config = Config::default().access_mode(access_mode)?;
    Connection::open_with_flags(duckdb_path, config)
}

/// Quote an identifier so mixed case table and column names survive.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` statement for a list of columns.  Temporary tables are
/// created unconditionally, permanent ones only if missing.
pub fn create_table_sql(name: &str, columns: &[Column], temporary: bool) -> String {
    let columns = columns
        .iter()
        .map(|c| format!("    {} {}", quote_ident(c.name), c.column_type.sql_type()))
        .join(",\n");
    if temporary {
        format!("CREATE TEMPORARY TABLE {} (\n{}\n);", quote_ident(name), columns)
    } else {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            quote_ident(name),
            columns
        )
    }
}

/// `INSERT` statement with one positional parameter per column.
pub fn insert_sql(name: &str, columns: &[Column]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(name),
        columns.iter().map(|c| quote_ident(c.name)).join(", "),
        columns.iter().map(|_| "?").join(", ")
    )
}
