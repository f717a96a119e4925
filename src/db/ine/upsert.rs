use duckdb::{params_from_iter, Connection};
use itertools::Itertools;
use log::{error, info, warn};

use crate::api::ine::records::IndicatorKind;
use crate::db::ine::loader::{Buffers, Table};
use crate::error::{EtlError, Result};
use crate::utils::lib_duckdb::{create_table_sql, insert_sql, quote_ident};

pub const BATCH_SIZE: usize = 500;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Number of staging tables created (and dropped).
    pub batches: usize,
    pub rows: usize,
}

/// Create the permanent table for this indicator if it doesn't exist.
pub fn ensure_table(conn: &Connection, table: &Table) -> Result<()> {
    conn.execute_batch(&create_table_sql(table.name(), &table.columns, false))?;
    Ok(())
}

fn staging_name(table: &Table) -> String {
    format!("staging_{}", table.name())
}

fn distinct_keys(conn: &Connection, table: &Table, staging: &str) -> Result<i64> {
    let query = format!(
        "SELECT COUNT(*) FROM (SELECT DISTINCT {} FROM {});",
        table.key_columns().iter().map(|k| quote_ident(k)).join(", "),
        quote_ident(staging)
    );
    let n = conn.query_row(&query, [], |row| row.get::<usize, i64>(0))?;
    Ok(n)
}

/// Update the rows of the staging table that already exist in the target
/// table, then insert the others.  Rows are matched on the natural key.
fn merge_sql(table: &Table, staging: &str) -> String {
    let target = quote_ident(table.name());
    let keys = table.key_columns();
    let key_list = keys.iter().map(|k| quote_ident(k)).join(", ");
    let all_columns = table.columns.iter().map(|c| quote_ident(c.name)).join(", ");
    let order_list = table
        .columns
        .iter()
        .filter(|c| !keys.contains(&c.name))
        .map(|c| quote_ident(c.name))
        .join(", ");
    // rows repeating a key: the one with the smallest values wins
    let source = format!(
        "(SELECT DISTINCT ON ({keys}) * FROM {staging} ORDER BY {keys}, {order}) AS s",
        keys = key_list,
        staging = quote_ident(staging),
        order = order_list,
    );
    let set_list = table
        .columns
        .iter()
        .filter(|c| !keys.contains(&c.name))
        .map(|c| format!("{} = s.{}", quote_ident(c.name), quote_ident(c.name)))
        .join(",\n    ");
    let matched_by = |alias: &str| {
        keys.iter()
            .map(|k| format!("{}.{} IS NOT DISTINCT FROM s.{}", alias, quote_ident(k), quote_ident(k)))
            .join("\n    AND ")
    };

    format!(
        r#"
UPDATE {target}
SET
    {set_list}
FROM {source}
WHERE
    {update_match};

INSERT INTO {target} ({all_columns})
SELECT {source_columns}
FROM {source}
WHERE NOT EXISTS (
    SELECT 1 FROM {target} AS t
    WHERE
    {insert_match}
);
"#,
        target = target,
        set_list = set_list,
        source = source,
        update_match = matched_by(&target),
        all_columns = all_columns,
        source_columns = table
            .columns
            .iter()
            .map(|c| format!("s.{}", quote_ident(c.name)))
            .join(", "),
        insert_match = matched_by("t"),
    )
}

fn merge_batches(conn: &Connection, table: &Table, batch_size: usize) -> Result<UpsertReport> {
    let staging = staging_name(table);
    let mut report = UpsertReport::default();
    for batch in table.rows.chunks(batch_size.max(1)) {
        conn.execute_batch(&create_table_sql(&staging, &table.columns, true))?;
        {
            let mut stmt = conn.prepare(&insert_sql(&staging, &table.columns))?;
            for row in batch {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        let distinct = distinct_keys(conn, table, &staging)?;
        if distinct < batch.len() as i64 {
            warn!(
                "{}: {} rows share a key with another row of the batch",
                table.name(),
                batch.len() as i64 - distinct
            );
        }
        conn.execute_batch(&merge_sql(table, &staging))?;
        conn.execute_batch(&format!("DROP TABLE {};", quote_ident(&staging)))?;

        report.batches += 1;
        report.rows += batch.len();
    }
    Ok(report)
}

/// Merge all the rows of the table into DuckDB, in batches, inside a single
/// transaction.  Nothing is written if any batch fails.
pub fn upsert_table(conn: &mut Connection, table: &Table, batch_size: usize) -> Result<UpsertReport> {
    info!("inserting {} rows into {} ...", table.len(), table.name());
    ensure_table(conn, table)?;

    let tx = conn.transaction()?;
    match merge_batches(&tx, table, batch_size) {
        Ok(report) => {
            tx.commit()?;
            info!(
                "done {}: {} rows in {} batches",
                table.name(),
                report.rows,
                report.batches
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback() {
                error!("Failed to roll back {}: {}", table.name(), rollback);
            }
            Err(e)
        }
    }
}

/// Upsert the four indicators concurrently, each one on its own connection
/// and in its own transaction.  A failure only affects its own indicator.
pub async fn upsert_all(
    conn: &Connection,
    buffers: Buffers,
    batch_size: usize,
) -> Vec<(IndicatorKind, Result<UpsertReport>)> {
    let mut tasks = Vec::new();
    for table in buffers.into_tables() {
        let kind = table.kind;
        let conn = conn.try_clone();
        let task = tokio::task::spawn_blocking(move || -> Result<UpsertReport> {
            let mut conn = conn?;
            upsert_table(&mut conn, &table, batch_size)
        });
        tasks.push((kind, task));
    }

    let mut results = Vec::new();
    for (kind, task) in tasks {
        let result = task.await.map_err(EtlError::from).and_then(|r| r);
        if let Err(e) = &result {
            error!("Failed to upsert {}: {}", kind, e);
        }
        results.push((kind, result));
    }
    results
}

/// Number of rows of an indicator in DuckDB, optionally for one year only.
pub fn count_rows(conn: &Connection, kind: IndicatorKind, year: Option<i32>) -> Result<i64> {
    let mut query = format!("SELECT COUNT(*) FROM {}", quote_ident(kind.name()));
    if let Some(year) = year {
        query.push_str(&format!(" WHERE \"Year\" = {}", year));
    }
    query.push(';');
    let n = conn.query_row(&query, [], |row| row.get::<usize, i64>(0))?;
    Ok(n)
}
