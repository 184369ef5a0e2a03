//! Caller-supplied query filters and their validation.
//!
//! Routing layers pass raw strings; [`QueryFilter::parse`] turns them into a
//! typed filter or an [`InputError`] that is reported back to the caller.

use rusqlite::types::Value;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Malformed caller input. Never fatal to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("year must be an integer, got '{0}'")]
    InvalidYear(String),

    #[error("month must be an integer, got '{0}'")]
    InvalidMonth(String),

    #[error("month must be between 1 and 12, got {0}")]
    MonthOutOfRange(i64),

    #[error("parcel key must not be empty")]
    EmptyParcelKey,

    #[error("unknown index column '{0}'")]
    UnknownColumn(String),
}

/// How aggregate rows are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// One series keyed by (year, month).
    Single,
    /// One series per parcel keyed by (year, month, parcel).
    PerParcel,
}

/// Filters shared by the record, aggregate and health queries.
///
/// `parcels: None` means every parcel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryFilter {
    pub parcels: Option<BTreeSet<String>>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl QueryFilter {
    /// A filter matching everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse raw filter strings.
    ///
    /// `parcels` is a comma separated list treated as a set; blank entries
    /// are dropped and an empty list means "all parcels".
    pub fn parse(
        parcels: Option<&str>,
        year: Option<&str>,
        month: Option<&str>,
    ) -> Result<Self, InputError> {
        let parcels = parcels.and_then(|raw| {
            let set: BTreeSet<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            (!set.is_empty()).then_some(set)
        });

        let year = year
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i32>().map_err(|_| InputError::InvalidYear(s.to_string())))
            .transpose()?;

        let month = month
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_month)
            .transpose()?;

        Ok(Self {
            parcels,
            year,
            month,
        })
    }

    pub fn with_parcels<I, S>(mut self, parcels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = parcels.into_iter().map(Into::into).collect();
        self.parcels = (!set.is_empty()).then_some(set);
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_month(mut self, month: u32) -> Result<Self, InputError> {
        if !(1..=12).contains(&month) {
            return Err(InputError::MonthOutOfRange(i64::from(month)));
        }
        self.month = Some(month);
        Ok(self)
    }

    /// The same year/month filter over every parcel.
    pub fn without_parcels(&self) -> Self {
        Self {
            parcels: None,
            ..self.clone()
        }
    }

    /// Zero or one selected parcel aggregates as a single series; two or more
    /// aggregate per parcel.
    pub fn grouping(&self) -> Grouping {
        match &self.parcels {
            Some(set) if set.len() > 1 => Grouping::PerParcel,
            _ => Grouping::Single,
        }
    }

    /// SQL `WHERE` clause (empty when unfiltered) and its bound values.
    pub(crate) fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(parcels) = &self.parcels {
            let placeholders = vec!["?"; parcels.len()].join(", ");
            clauses.push(format!("parcel IN ({placeholders})"));
            values.extend(parcels.iter().map(|p| Value::Text(p.clone())));
        }
        if let Some(year) = self.year {
            clauses.push("year = ?".to_string());
            values.push(Value::Integer(i64::from(year)));
        }
        if let Some(month) = self.month {
            clauses.push("month = ?".to_string());
            values.push(Value::Integer(i64::from(month)));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

fn parse_month(s: &str) -> Result<u32, InputError> {
    let m: i64 = s
        .parse()
        .map_err(|_| InputError::InvalidMonth(s.to_string()))?;
    if !(1..=12).contains(&m) {
        return Err(InputError::MonthOutOfRange(m));
    }
    Ok(m as u32)
}

/// Validate a parcel key used on its own (evaluation, yearly series).
pub fn parcel_key(raw: &str) -> Result<&str, InputError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(InputError::EmptyParcelKey);
    }
    Ok(key)
}

/// A derived column that can be averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexColumn {
    VhVvRatio,
    Rvi,
    Rfdi,
    Ndvi,
    VvLin,
    VhLin,
}

impl IndexColumn {
    pub const ALL: [IndexColumn; 6] = [
        IndexColumn::VhVvRatio,
        IndexColumn::Rvi,
        IndexColumn::Rfdi,
        IndexColumn::Ndvi,
        IndexColumn::VvLin,
        IndexColumn::VhLin,
    ];

    /// Column name in `derived_records`.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexColumn::VhVvRatio => "vh_vv_ratio",
            IndexColumn::Rvi => "rvi",
            IndexColumn::Rfdi => "rfdi",
            IndexColumn::Ndvi => "ndvi",
            IndexColumn::VvLin => "vv_lin",
            IndexColumn::VhLin => "vh_lin",
        }
    }

    /// Parse a comma separated list; blank input yields an empty list.
    pub fn parse_list(raw: &str) -> Result<Vec<IndexColumn>, InputError> {
        let mut columns = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let column: IndexColumn = name.parse()?;
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        Ok(columns)
    }
}

impl FromStr for IndexColumn {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        IndexColumn::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| InputError::UnknownColumn(s.to_string()))
    }
}

impl fmt::Display for IndexColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_filter_means_all() {
        let f = QueryFilter::parse(None, None, None).unwrap();
        assert_eq!(f, QueryFilter::all());
        let f = QueryFilter::parse(Some(" , "), Some(""), Some(" ")).unwrap();
        assert_eq!(f, QueryFilter::all());
    }

    #[test]
    fn parse_parcels_as_set() {
        let f = QueryFilter::parse(Some("Makongo, Kibwezi,Makongo"), None, None).unwrap();
        let parcels: Vec<&str> = f.parcels.as_ref().unwrap().iter().map(String::as_str).collect();
        assert_eq!(parcels, vec!["Kibwezi", "Makongo"]);
        assert_eq!(f.grouping(), Grouping::PerParcel);
    }

    #[test]
    fn single_parcel_is_single_series() {
        let f = QueryFilter::parse(Some("Kibwezi,Kibwezi"), None, None).unwrap();
        assert_eq!(f.grouping(), Grouping::Single);
        assert_eq!(QueryFilter::all().grouping(), Grouping::Single);
    }

    #[test]
    fn parse_year_and_month() {
        let f = QueryFilter::parse(None, Some("2021"), Some("7")).unwrap();
        assert_eq!(f.year, Some(2021));
        assert_eq!(f.month, Some(7));
    }

    #[test]
    fn parse_rejects_bad_year() {
        assert_eq!(
            QueryFilter::parse(None, Some("twenty"), None),
            Err(InputError::InvalidYear("twenty".to_string()))
        );
    }

    #[test]
    fn parse_rejects_bad_month() {
        assert_eq!(
            QueryFilter::parse(None, None, Some("July")),
            Err(InputError::InvalidMonth("July".to_string()))
        );
        assert_eq!(
            QueryFilter::parse(None, None, Some("13")),
            Err(InputError::MonthOutOfRange(13))
        );
        assert_eq!(
            QueryFilter::parse(None, None, Some("0")),
            Err(InputError::MonthOutOfRange(0))
        );
        assert_eq!(
            QueryFilter::parse(None, None, Some("-3")),
            Err(InputError::MonthOutOfRange(-3))
        );
    }

    #[test]
    fn with_month_validates_range() {
        assert!(QueryFilter::all().with_month(12).is_ok());
        assert_eq!(
            QueryFilter::all().with_month(13),
            Err(InputError::MonthOutOfRange(13))
        );
    }

    #[test]
    fn where_clause_binds_values_in_order() {
        let f = QueryFilter::all()
            .with_parcels(["B", "A"])
            .with_year(2020)
            .with_month(3)
            .unwrap();
        let (sql, values) = f.where_clause();
        assert_eq!(sql, "WHERE parcel IN (?, ?) AND year = ? AND month = ?");
        assert_eq!(
            values,
            vec![
                Value::Text("A".into()),
                Value::Text("B".into()),
                Value::Integer(2020),
                Value::Integer(3)
            ]
        );
        assert_eq!(QueryFilter::all().where_clause().0, "");
    }

    #[test]
    fn without_parcels_keeps_time_filters() {
        let f = QueryFilter::all().with_parcels(["A"]).with_year(2019);
        let g = f.without_parcels();
        assert_eq!(g.parcels, None);
        assert_eq!(g.year, Some(2019));
    }

    #[test]
    fn parcel_key_rejects_blank() {
        assert_eq!(parcel_key("  "), Err(InputError::EmptyParcelKey));
        assert_eq!(parcel_key(" Kibwezi "), Ok("Kibwezi"));
    }

    #[test]
    fn index_columns_parse() {
        assert_eq!("RVI".parse::<IndexColumn>(), Ok(IndexColumn::Rvi));
        assert_eq!(
            IndexColumn::parse_list("rfdi, ndvi,rfdi").unwrap(),
            vec![IndexColumn::Rfdi, IndexColumn::Ndvi]
        );
        assert_eq!(
            "evi".parse::<IndexColumn>(),
            Err(InputError::UnknownColumn("evi".to_string()))
        );
        assert!(IndexColumn::parse_list("").unwrap().is_empty());
    }
}
