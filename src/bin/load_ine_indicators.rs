use std::{error::Error, path::Path};

use clap::Parser;
use ine_etl::db::{ine::loader::YearRange, prod_db::ProdDb};
use log::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Merge the INE json files for a range of years into DuckDB, e.g. `load_ine_indicators 2022 2017`."
)]
struct Args {
    /// Last year to load
    bigger_year: i32,

    /// First year to load
    smaller_year: i32,

    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    let _ = dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str()));

    let range = YearRange::new(args.bigger_year, args.smaller_year)?;
    let archive = ProdDb::ine_indicators();
    info!("Starting to load years {} to {} into {}", range.smaller, range.bigger, archive.duckdb_path);

    let results = archive.update_duckdb(range).await?;
    let loaded = results.iter().filter(|(_, r)| r.is_ok()).count();
    info!("Finished inserting data into the database, {} of {} tables updated", loaded, results.len());

    Ok(())
}
