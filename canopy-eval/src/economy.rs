//! Yearly economic series from the World Bank indicators API.

use crate::error::{EvalError, Result};
use async_trait::async_trait;
use canopy_db::YearValue;
use std::time::Duration;

pub const WORLD_BANK_BASE_URL: &str = "https://api.worldbank.org/v2";
/// GDP in current US dollars.
pub const GDP_INDICATOR: &str = "NY.GDP.MKTP.CD";

/// A source of one value per calendar year.
#[async_trait]
pub trait EconomicSeries: Send + Sync {
    /// Fetch the series, ordered by year.
    async fn yearly_series(&self) -> Result<Vec<YearValue>>;

    /// Short label for summaries, e.g. `"gdp"`.
    fn name(&self) -> &str;
}

/// World Bank GDP for one country over an inclusive year range.
pub struct WorldBankGdp {
    client: reqwest::Client,
    base_url: String,
    country: String,
    start_year: i32,
    end_year: i32,
}

impl WorldBankGdp {
    pub fn new(country: &str, start_year: i32, end_year: i32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: WORLD_BANK_BASE_URL.to_string(),
            country: country.to_string(),
            start_year,
            end_year,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn url(&self) -> String {
        format!(
            "{}/country/{}/indicator/{}?format=json&date={}:{}",
            self.base_url, self.country, GDP_INDICATOR, self.start_year, self.end_year
        )
    }
}

#[async_trait]
impl EconomicSeries for WorldBankGdp {
    async fn yearly_series(&self) -> Result<Vec<YearValue>> {
        let url = self.url();
        log::info!("economy: fetching {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EvalError::Economic {
                message: format!("HTTP {status} from {url}"),
            });
        }

        let series = parse_world_bank(&body)?;
        log::info!(
            "economy: {} returned {} yearly values for {}",
            GDP_INDICATOR,
            series.len(),
            self.country
        );
        Ok(series)
    }

    fn name(&self) -> &str {
        "gdp"
    }
}

/// Parse a World Bank indicator response.
///
/// The body is a two element array: paging metadata, then the data points.
/// Points with a null value are skipped.
///
/// # Example JSON
/// ```text
/// [{"page":1,"pages":1,"total":2},
///  [{"date":"2021","value":110347000000.0},{"date":"2024","value":null}]]
/// ```
pub fn parse_world_bank(body: &str) -> Result<Vec<YearValue>> {
    let json: serde_json::Value = serde_json::from_str(body)?;
    let points = json
        .get(1)
        .and_then(|v| v.as_array())
        .ok_or_else(|| EvalError::Economic {
            message: match json.get(0).and_then(|m| m.get("message")) {
                Some(msg) => format!("no data points in response: {msg}"),
                None => "no data points in response".to_string(),
            },
        })?;

    let mut series: Vec<YearValue> = points
        .iter()
        .filter_map(|p| {
            let value = p.get("value")?.as_f64()?;
            let year = p.get("date")?.as_str()?.trim().parse().ok()?;
            Some(YearValue { year, value })
        })
        .collect();
    series.sort_by_key(|p| p.year);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_null_values_and_sorts() {
        let body = r#"[{"page":1,"pages":1,"per_page":50,"total":3},
            [{"indicator":{"id":"NY.GDP.MKTP.CD"},"date":"2023","value":107440000000.5},
             {"indicator":{"id":"NY.GDP.MKTP.CD"},"date":"2024","value":null},
             {"indicator":{"id":"NY.GDP.MKTP.CD"},"date":"2022","value":113420000000}]]"#;
        let series = parse_world_bank(body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].year, 2022);
        assert_eq!(series[0].value, 113_420_000_000.0);
        assert_eq!(series[1].year, 2023);
    }

    #[test]
    fn parse_error_response() {
        let body = r#"[{"message":[{"id":"120","key":"Invalid value"}]}]"#;
        let err = parse_world_bank(body).unwrap_err();
        assert!(matches!(err, EvalError::Economic { .. }));
    }

    #[test]
    fn parse_invalid_json() {
        assert!(matches!(parse_world_bank("<html>"), Err(EvalError::Json(_))));
    }

    #[test]
    fn url_has_country_indicator_and_range() {
        let gdp = WorldBankGdp::new("KEN", 2013, 2024)
            .unwrap()
            .with_base_url("http://localhost:9/v2/");
        assert_eq!(
            gdp.url(),
            "http://localhost:9/v2/country/KEN/indicator/NY.GDP.MKTP.CD?format=json&date=2013:2024"
        );
    }
}
