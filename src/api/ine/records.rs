use std::{collections::BTreeMap, fmt};

use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::error::{EtlError, Result};

/// Legal form code INE uses for the "all legal forms" row of the company indicator.
pub const LEGAL_FORM_TOTAL: &str = "T";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorKind {
    Company,
    Service,
    Business,
    Value,
}

impl IndicatorKind {
    pub fn all() -> [IndicatorKind; 4] {
        [
            IndicatorKind::Company,
            IndicatorKind::Service,
            IndicatorKind::Business,
            IndicatorKind::Value,
        ]
    }

    /// The `varcd` query parameter of the INE indicator.
    pub fn indicator_id(&self) -> &'static str {
        match self {
            IndicatorKind::Company => "0008511",
            IndicatorKind::Service => "0008512",
            IndicatorKind::Business => "0008513",
            IndicatorKind::Value => "0008514",
        }
    }

    /// Name shared by the snapshot file and the DuckDB table.
    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Company => "CompanyData",
            IndicatorKind::Service => "ServiceData",
            IndicatorKind::Business => "BusinessData",
            IndicatorKind::Value => "ValueData",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.name())
    }

    pub fn from_file_name(file_name: &str) -> Option<IndicatorKind> {
        IndicatorKind::all()
            .into_iter()
            .find(|kind| kind.file_name() == file_name)
    }

    pub fn measurement_column(&self) -> &'static str {
        match self {
            IndicatorKind::Company => "NumberOfCompanies",
            IndicatorKind::Service => "NumberOfPeopleWorkingForCompanies",
            IndicatorKind::Business => "NumberOfVolumeOfBusinessForCompanies",
            IndicatorKind::Value => "IncreasedValueForCompanies",
        }
    }

    pub fn has_legal_form(&self) -> bool {
        matches!(self, IndicatorKind::Company)
    }

    /// Validate a raw API record and rename its fields into the typed record
    /// for this kind.  Returns `None` if the record is not usable.
    pub fn project(&self, raw: &RawRecord) -> Option<Record> {
        let dimensions = Dimensions::from_raw(raw)?;
        let measurement = non_empty(&raw.valor);
        if measurement.is_none() && !dimensions.has_conv_signal() {
            return None;
        }
        let measurement = measurement.unwrap_or_default();
        let record = match self {
            IndicatorKind::Company => Record::Company(CompanyData {
                number_of_companies: measurement,
                legal_form_code: non_empty(&raw.dim_4),
                legal_form_description: non_empty(&raw.dim_4_t),
                dimensions,
            }),
            IndicatorKind::Service => Record::Service(ServiceData {
                number_of_people_working_for_companies: measurement,
                dimensions,
            }),
            IndicatorKind::Business => Record::Business(BusinessData {
                number_of_volume_of_business_for_companies: measurement,
                dimensions,
            }),
            IndicatorKind::Value => Record::Value(ValueData {
                increased_value_for_companies: measurement,
                dimensions,
            }),
        };
        Some(record)
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .cloned()
}

/// INE sends most values as strings, but numbers and nulls show up too.
fn deserialize_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string, a number or null")
        }

        fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v.to_string()))
        }

        fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(TextVisitor)
        }
    }

    deserializer.deserialize_any(TextVisitor)
}

/// One observation as it comes out of the `Dados` dictionary.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub geocod: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub geodsg: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub dim_3: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub dim_3_t: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub dim_4: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub dim_4_t: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub valor: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub sinal_conv: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub sinal_conv_desc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(rename = "Cod", default)]
    pub code: Option<String>,
    #[serde(rename = "Msg", default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Outcome {
    #[serde(rename = "Verdadeiro", default)]
    pub succeeded: Vec<ApiMessage>,
    #[serde(rename = "Falso", default)]
    pub failed: Vec<ApiMessage>,
}

/// The response wrapper of the `pindica.jsp` endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "IndicadorCod", default)]
    pub indicator_code: Option<String>,
    #[serde(rename = "IndicadorDsg", default)]
    pub indicator_description: Option<String>,
    #[serde(rename = "DataExtracao", default)]
    pub extraction_date: Option<String>,
    #[serde(rename = "Sucesso", default)]
    pub outcome: Option<Outcome>,
    #[serde(rename = "Dados", default)]
    pub data: Option<BTreeMap<String, Vec<Option<RawRecord>>>>,
}

impl Envelope {
    fn api_message(&self) -> Option<String> {
        self.outcome
            .as_ref()?
            .failed
            .iter()
            .filter_map(|m| m.message.clone())
            .next()
    }
}

/// Parse a response body into the raw records of all its periods.
///
/// Fails if the body is empty, if there is no `Dados` entry or if the first
/// list of records is empty.
pub fn parse_response(body: &str) -> Result<Vec<Option<RawRecord>>> {
    if body.trim().is_empty() {
        return Err(EtlError::DataMissing("response body was empty".to_string()));
    }
    let envelopes: Vec<Envelope> = serde_json::from_str(body)?;
    let envelope = envelopes
        .into_iter()
        .next()
        .ok_or_else(|| EtlError::DataMissing("response had no envelope".to_string()))?;

    let api_message = envelope.api_message();
    let data = match envelope.data {
        Some(data) if !data.is_empty() => data,
        _ => {
            return Err(EtlError::DataMissing(match api_message {
                Some(msg) => format!("no Dados entries ({})", msg),
                None => "no Dados entries".to_string(),
            }))
        }
    };
    if data.values().next().map_or(true, |records| records.is_empty()) {
        return Err(EtlError::DataMissing("first Dados list was empty".to_string()));
    }

    Ok(data.into_values().flatten().collect())
}

/// Fields shared by all four indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimensions {
    pub economic_activity_code: String,
    pub economic_activity_description: String,
    pub geographic_area_code: String,
    pub geographic_area_description: String,
    pub conv_signal: Option<String>,
    pub conv_signal_description: Option<String>,
}

impl Dimensions {
    fn from_raw(raw: &RawRecord) -> Option<Dimensions> {
        Some(Dimensions {
            economic_activity_code: non_empty(&raw.dim_3)?,
            economic_activity_description: non_empty(&raw.dim_3_t)?,
            geographic_area_code: non_empty(&raw.geocod)?,
            geographic_area_description: non_empty(&raw.geodsg)?,
            conv_signal: non_empty(&raw.sinal_conv),
            conv_signal_description: non_empty(&raw.sinal_conv_desc),
        })
    }

    pub fn has_conv_signal(&self) -> bool {
        self.conv_signal.is_some() && self.conv_signal_description.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompanyData {
    pub number_of_companies: String,
    #[serde(flatten)]
    pub dimensions: Dimensions,
    pub legal_form_code: Option<String>,
    pub legal_form_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceData {
    pub number_of_people_working_for_companies: String,
    #[serde(flatten)]
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BusinessData {
    pub number_of_volume_of_business_for_companies: String,
    #[serde(flatten)]
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValueData {
    pub increased_value_for_companies: String,
    #[serde(flatten)]
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Company(CompanyData),
    Service(ServiceData),
    Business(BusinessData),
    Value(ValueData),
}

impl Record {
    pub fn dimensions(&self) -> &Dimensions {
        match self {
            Record::Company(r) => &r.dimensions,
            Record::Service(r) => &r.dimensions,
            Record::Business(r) => &r.dimensions,
            Record::Value(r) => &r.dimensions,
        }
    }

    /// Activity, area and, for companies, legal form.  Unique within one
    /// indicator and year.
    pub fn key(&self) -> (String, String, Option<String>) {
        let d = self.dimensions();
        let legal_form = match self {
            Record::Company(r) => r.legal_form_code.clone(),
            _ => None,
        };
        (
            d.economic_activity_code.clone(),
            d.geographic_area_code.clone(),
            legal_form,
        )
    }

    /// The company indicator repeats the breakdown by legal form as a total row.
    pub fn is_legal_form_total(&self) -> bool {
        match self {
            Record::Company(r) => r.legal_form_code.as_deref() == Some(LEGAL_FORM_TOTAL),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    fn raw(valor: &str, sinal_conv: &str, sinal_conv_desc: &str) -> RawRecord {
        RawRecord {
            geocod: Some("16D0105".to_string()),
            geodsg: Some("Aveiro".to_string()),
            dim_3: Some("C".to_string()),
            dim_3_t: Some("Indústrias transformadoras".to_string()),
            dim_4: Some("1".to_string()),
            dim_4_t: Some("Empresa individual".to_string()),
            valor: Some(valor.to_string()),
            sinal_conv: Some(sinal_conv.to_string()),
            sinal_conv_desc: Some(sinal_conv_desc.to_string()),
        }
    }

    #[test]
    fn project_company() {
        let record = IndicatorKind::Company.project(&raw("120", "", "")).unwrap();
        assert_eq!(record.dimensions().geographic_area_description, "Aveiro");
        assert_eq!(record.dimensions().conv_signal, None);
        assert_eq!(
            record.key(),
            ("C".to_string(), "16D0105".to_string(), Some("1".to_string()))
        );
        match record {
            Record::Company(c) => {
                assert_eq!(c.number_of_companies, "120");
                assert_eq!(c.legal_form_code.as_deref(), Some("1"));
            }
            _ => panic!("expected a company record"),
        }
        // the legal form is not part of the key of the other indicators
        let record = IndicatorKind::Service.project(&raw("120", "", "")).unwrap();
        assert_eq!(record.key().2, None);
    }

    #[test]
    fn mandatory_fields_are_required() {
        let mut r = raw("120", "", "");
        r.geodsg = Some(" ".to_string());
        assert!(IndicatorKind::Value.project(&r).is_none());

        let mut r = raw("120", "", "");
        r.dim_3 = None;
        assert!(IndicatorKind::Service.project(&r).is_none());

        let mut r = raw("120", "", "");
        r.geocod = Some("".to_string());
        assert!(IndicatorKind::Business.project(&r).is_none());

        let mut r = raw("120", "", "");
        r.dim_3_t = None;
        assert!(IndicatorKind::Company.project(&r).is_none());
    }

    #[test]
    fn suppressed_value_needs_conv_signal() {
        let suppressed = raw("", "x", "Valor confidencial");
        let record = IndicatorKind::Business.project(&suppressed).unwrap();
        assert!(record.dimensions().has_conv_signal());
        match record {
            Record::Business(b) => assert_eq!(b.number_of_volume_of_business_for_companies, ""),
            _ => panic!("expected a business record"),
        }

        assert!(IndicatorKind::Business.project(&raw("", "", "")).is_none());
        assert!(IndicatorKind::Business.project(&raw("", "x", "")).is_none());
    }

    #[test]
    fn legal_form_total() {
        let mut r = raw("5", "", "");
        r.dim_4 = Some(LEGAL_FORM_TOTAL.to_string());
        assert!(IndicatorKind::Company.project(&r).unwrap().is_legal_form_total());
        // only the company indicator has a legal form breakdown
        assert!(!IndicatorKind::Value.project(&r).unwrap().is_legal_form_total());
    }

    #[test]
    fn parse_response_ok() -> Result<(), Box<dyn Error>> {
        let body = r#"[{
            "IndicadorCod": "0008511",
            "IndicadorDsg": "Empresas (N.º) por Localização geográfica",
            "DataExtracao": "2024-03-01T10:00:00.000+00:00",
            "Dados": {"2022": [
                {"geocod": "16D0105", "geodsg": "Aveiro", "dim_3": "C", "dim_3_t": "Indústrias", "valor": 431},
                null
            ]},
            "Sucesso": {"Verdadeiro": [{"Cod": "00", "Msg": "Pedido efetuado com sucesso"}]}
        }]"#;
        let records = parse_response(body)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap().valor.as_deref(), Some("431"));
        assert!(records[1].is_none());
        Ok(())
    }

    #[test]
    fn parse_response_missing_data() {
        assert!(matches!(parse_response("  "), Err(EtlError::DataMissing(_))));
        assert!(matches!(parse_response("[]"), Err(EtlError::DataMissing(_))));
        assert!(matches!(
            parse_response(r#"[{"Dados": {}}]"#),
            Err(EtlError::DataMissing(_))
        ));
        assert!(matches!(
            parse_response(r#"[{"Dados": {"2022": []}}]"#),
            Err(EtlError::DataMissing(_))
        ));
        let err = parse_response(
            r#"[{"Sucesso": {"Falso": [{"Cod": "40", "Msg": "Dimensão inválida"}]}}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Dimensão inválida"));
        assert!(matches!(parse_response("not json"), Err(EtlError::Json(_))));
    }

    #[test]
    fn kind_names() {
        assert_eq!(
            IndicatorKind::from_file_name("BusinessData.json"),
            Some(IndicatorKind::Business)
        );
        assert_eq!(IndicatorKind::from_file_name("Other.json"), None);
        assert_eq!(IndicatorKind::Service.to_string(), "ServiceData");
    }
}
