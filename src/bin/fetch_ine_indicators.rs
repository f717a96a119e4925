use std::{error::Error, path::Path};

use clap::Parser;
use ine_etl::{
    api::ine::{
        indicator::HttpTransport,
        regions::{REGIONS, SECTOR_CODES},
    },
    db::prod_db::ProdDb,
};
use log::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Download the INE company indicators for one year and save them as json files."
)]
struct Args {
    /// Year of the data, e.g. 2022
    year: i32,

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

    let archive = ProdDb::ine_indicators();
    info!("Fetching INE indicators for {} into {}", args.year, archive.base_dir);

    let results = archive
        .download_year(&HttpTransport::new(), args.year, &REGIONS, &SECTOR_CODES)
        .await;
    let saved = results.iter().filter(|(_, r)| r.is_ok()).count();
    info!("done, saved {} of {} indicators", saved, results.len());

    Ok(())
}
