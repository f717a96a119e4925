use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures::future::try_join_all;
use itertools::Itertools;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, USER_AGENT};

use crate::api::ine::records::{parse_response, IndicatorKind, Record};
use crate::api::ine::regions::Region;
use crate::error::{EtlError, Result};

pub const INE_API_URL: &str = "https://www.ine.pt/ine/json_indicador/pindica.jsp";

/// Number of regions handled by one concurrent unit of work.
pub const CHUNK_SIZE: usize = 5;

/// Something that can GET a url and hand back the body.
pub trait Transport: Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36")
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EtlError::RequestFailed {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Url for one indicator, one year and a list of region codes, e.g.
/// https://www.ine.pt/ine/json_indicador/pindica.jsp?op=2&varcd=0008511&Dim1=S7A2022&Dim2=16D,16D0105&Dim3=TOT,C&lang=PT
pub fn indicator_url(
    base_url: &str,
    kind: IndicatorKind,
    year: i32,
    region_codes: &str,
    sector_codes: &[&str],
) -> String {
    format!(
        "{}?op=2&varcd={}&Dim1=S7A{}&Dim2={}&Dim3={}&lang=PT",
        base_url,
        kind.indicator_id(),
        year,
        region_codes,
        sector_codes.join(",")
    )
}

/// Get all the records of an indicator for one year.
///
/// The regions are split in chunks of [`CHUNK_SIZE`] and the chunks are
/// processed concurrently.  Records that fail validation are skipped and
/// records repeating an (activity, area, legal form) key are kept once.  If any
/// request fails or comes back without data, the whole indicator fails.
pub async fn fetch_indicator<T: Transport>(
    transport: &T,
    base_url: &str,
    kind: IndicatorKind,
    year: i32,
    regions: &[Region],
    sector_codes: &[&str],
) -> Result<Vec<Record>> {
    let records: Mutex<Vec<Record>> = Mutex::new(Vec::new());
    let units = regions.chunks(CHUNK_SIZE).map(|chunk| {
        fetch_chunk(
            transport,
            base_url,
            kind,
            year,
            chunk,
            sector_codes,
            &records,
        )
    });
    try_join_all(units).await?;

    let records = records.into_inner().unwrap_or_else(PoisonError::into_inner);
    let fetched = records.len();
    let records: Vec<Record> = records.into_iter().unique_by(|r| r.key()).collect();
    if records.len() < fetched {
        warn!(
            "dropped {} duplicate {} records for {}",
            fetched - records.len(),
            kind,
            year
        );
    }
    info!("fetched {} {} records for {}", records.len(), kind, year);
    Ok(records)
}

async fn fetch_chunk<T: Transport>(
    transport: &T,
    base_url: &str,
    kind: IndicatorKind,
    year: i32,
    chunk: &[Region],
    sector_codes: &[&str],
    records: &Mutex<Vec<Record>>,
) -> Result<()> {
    for region in chunk {
        let url = indicator_url(base_url, kind, year, region.codes, sector_codes);
        let body = transport.get(&url).await?;

        let mut accepted: Vec<Record> = Vec::new();
        let mut skipped = 0;
        for raw in parse_response(&body)? {
            let raw = raw.ok_or(EtlError::NullRecord)?;
            match kind.project(&raw) {
                Some(record) => accepted.push(record),
                None => skipped += 1,
            }
        }
        debug!(
            "{} {}: {} records accepted, {} skipped",
            kind,
            region.name,
            accepted.len(),
            skipped
        );

        let mut records = records.lock().unwrap_or_else(PoisonError::into_inner);
        records.extend(accepted.into_iter().filter(|r| !r.is_legal_form_total()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::StatusCode;

    use super::*;
    use crate::api::ine::records::LEGAL_FORM_TOTAL;
    use crate::api::ine::regions::{region, REGIONS, SECTOR_CODES};

    /// Serves canned bodies keyed by the `Dim2` value of the request.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub bodies: HashMap<String, String>,
        pub requests: AtomicUsize,
    }

    impl FakeTransport {
        pub fn respond(mut self, region_codes: &str, body: &str) -> Self {
            self.bodies
                .insert(region_codes.to_string(), body.to_string());
            self
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, url: &str) -> impl Future<Output = Result<String>> + Send {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let dim2 = url
                .split('&')
                .find_map(|p| p.strip_prefix("Dim2="))
                .unwrap_or_default();
            let result = match self.bodies.get(dim2) {
                Some(body) => Ok(body.clone()),
                None => Err(EtlError::RequestFailed {
                    url: url.to_string(),
                    status: StatusCode::NOT_FOUND,
                }),
            };
            async move { result }
        }
    }

    pub(crate) fn company_row(geocod: &str, sector: &str, legal_form: &str, valor: &str) -> String {
        format!(
            r#"{{"geocod": "{}", "geodsg": "Aveiro", "dim_3": "{}", "dim_3_t": "Sector {}", "dim_4": "{}", "dim_4_t": "Forma {}", "valor": "{}", "sinal_conv": "", "sinal_conv_desc": ""}}"#,
            geocod, sector, sector, legal_form, legal_form, valor
        )
    }

    pub(crate) fn body(rows: &[String]) -> String {
        format!(r#"[{{"IndicadorCod": "0008511", "Dados": {{"2022": [{}]}}}}]"#, rows.join(","))
    }

    #[test]
    fn url() {
        let url = indicator_url(
            INE_API_URL,
            IndicatorKind::Company,
            2022,
            "16D,16D0105",
            &["TOT", "C"],
        );
        assert_eq!(
            url,
            "https://www.ine.pt/ine/json_indicador/pindica.jsp?op=2&varcd=0008511&Dim1=S7A2022&Dim2=16D,16D0105&Dim3=TOT,C&lang=PT"
        );
    }

    #[tokio::test]
    async fn fetch_all_regions() -> Result<(), Box<dyn Error>> {
        let mut transport = FakeTransport::default();
        for r in REGIONS.iter() {
            transport = transport.respond(r.codes, &body(&[company_row(r.name, "C", "1", "10")]));
        }
        let records = fetch_indicator(
            &transport,
            INE_API_URL,
            IndicatorKind::Company,
            2022,
            &REGIONS,
            &SECTOR_CODES,
        )
        .await?;
        assert_eq!(transport.requests.load(Ordering::SeqCst), REGIONS.len());
        assert_eq!(records.len(), REGIONS.len());
        Ok(())
    }

    #[tokio::test]
    async fn every_area_once() -> Result<(), Box<dyn Error>> {
        // one row for each area code of the request
        let mut transport = FakeTransport::default();
        for r in REGIONS.iter() {
            let rows: Vec<String> = r
                .codes
                .split(',')
                .map(|code| company_row(code, "C", "1", "10"))
                .collect();
            transport = transport.respond(r.codes, &body(&rows));
        }
        let records = fetch_indicator(
            &transport,
            INE_API_URL,
            IndicatorKind::Company,
            2022,
            &REGIONS,
            &["C"],
        )
        .await?;
        let codes: Vec<&str> = records
            .iter()
            .map(|r| r.dimensions().geographic_area_code.as_str())
            .sorted()
            .collect();
        let expected: Vec<&str> = REGIONS
            .iter()
            .flat_map(|r| r.codes.split(','))
            .sorted()
            .collect();
        assert_eq!(codes, expected);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_rows_are_kept_once() -> Result<(), Box<dyn Error>> {
        let aveiro = region("Aveiro").unwrap();
        let coimbra = region("Coimbra").unwrap();
        let row = company_row("16D", "C", "1", "10");
        let transport = FakeTransport::default()
            .respond(aveiro.codes, &body(&[row.clone(), company_row("16D", "C", "2", "5")]))
            .respond(coimbra.codes, &body(&[row]));
        let records = fetch_indicator(
            &transport,
            INE_API_URL,
            IndicatorKind::Company,
            2022,
            &[aveiro, coimbra],
            &["C"],
        )
        .await?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn legal_form_total_is_dropped() -> Result<(), Box<dyn Error>> {
        let aveiro = region("Aveiro").unwrap();
        let transport = FakeTransport::default().respond(
            aveiro.codes,
            &body(&[
                company_row("16D", "C", LEGAL_FORM_TOTAL, "30"),
                company_row("16D", "C", "1", "10"),
                company_row("16D", "C", "2", "20"),
            ]),
        );
        let records = fetch_indicator(
            &transport,
            INE_API_URL,
            IndicatorKind::Company,
            2022,
            &[aveiro],
            &["C"],
        )
        .await?;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.is_legal_form_total()));
        Ok(())
    }

    #[tokio::test]
    async fn one_failed_request_fails_the_indicator() {
        let aveiro = region("Aveiro").unwrap();
        let coimbra = region("Coimbra").unwrap();
        let transport = FakeTransport::default()
            .respond(aveiro.codes, &body(&[company_row("16D", "C", "1", "10")]));
        let res = fetch_indicator(
            &transport,
            INE_API_URL,
            IndicatorKind::Company,
            2022,
            &[aveiro, coimbra],
            &["C"],
        )
        .await;
        assert!(matches!(res, Err(EtlError::RequestFailed { .. })));
    }

    #[tokio::test]
    async fn null_record_is_fatal() {
        let aveiro = region("Aveiro").unwrap();
        let transport = FakeTransport::default().respond(
            aveiro.codes,
            &body(&[company_row("16D", "C", "1", "10"), "null".to_string()]),
        );
        let res = fetch_indicator(
            &transport,
            INE_API_URL,
            IndicatorKind::Company,
            2022,
            &[aveiro],
            &["C"],
        )
        .await;
        assert!(matches!(res, Err(EtlError::NullRecord)));
    }

    #[tokio::test]
    async fn empty_data_is_missing_data() {
        let aveiro = region("Aveiro").unwrap();
        let transport = FakeTransport::default().respond(aveiro.codes, "");
        let res = fetch_indicator(
            &transport,
            INE_API_URL,
            IndicatorKind::Value,
            2022,
            &[aveiro],
            &["C"],
        )
        .await;
        assert!(matches!(res, Err(EtlError::DataMissing(_))));
    }

    #[ignore]
    #[tokio::test]
    async fn fetch_live() -> Result<(), Box<dyn Error>> {
        let records = fetch_indicator(
            &HttpTransport::new(),
            INE_API_URL,
            IndicatorKind::Service,
            2022,
            &[region("Aveiro").unwrap()],
            &SECTOR_CODES,
        )
        .await?;
        assert!(!records.is_empty());
        Ok(())
    }
}
