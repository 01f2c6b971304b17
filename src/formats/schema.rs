use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Date formats accepted in report cells
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Timestamp formats accepted in report cells
const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",    // 2012-03-28 04:12:55
    "%Y-%m-%dT%H:%M:%S",    // 2012-03-28T04:12:55 (ISO 8601)
    "%Y-%m-%d %H:%M:%S%.f", // With fractional seconds
    "%Y-%m-%dT%H:%M:%S%.f", // ISO 8601 with fractional seconds
    "%Y-%m-%d %H:%M",       // Without seconds
    "%Y-%m-%dT%H:%M",       // ISO 8601 without seconds
];

/// Scalar type of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Date,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Find the most specific common type that accommodates both types
    pub fn common_type(&self, other: &ColumnType) -> ColumnType {
        use ColumnType::*;

        match (self, other) {
            (a, b) if a == b => *a,
            (Integer, Float) | (Float, Integer) => Float,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            _ => Text,
        }
    }

    /// Infer the type of a single cell; `None` for an empty (null) cell
    pub fn infer(value: &str) -> Option<ColumnType> {
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return None;
        }

        if trimmed.parse::<i64>().is_ok() {
            return Some(ColumnType::Integer);
        }

        // "nan" and "inf" parse as f64 but are object names in these reports
        if trimmed.parse::<f64>().is_ok() && trimmed.chars().any(|c| c.is_ascii_digit()) {
            return Some(ColumnType::Float);
        }

        if parse_date(trimmed).is_some() {
            return Some(ColumnType::Date);
        }

        if parse_timestamp(trimmed).is_some() {
            return Some(ColumnType::Timestamp);
        }

        Some(ColumnType::Text)
    }

    /// Widen `current` with every cell of `values`
    ///
    /// Returns the widened type (`None` while every cell seen is null) and
    /// whether any null was seen.
    pub fn infer_column<'a, I>(current: Option<ColumnType>, values: I) -> (Option<ColumnType>, bool)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut inferred = current;
        let mut has_nulls = false;

        for value in values {
            match Self::infer(value) {
                Some(cell_type) => {
                    inferred = Some(match inferred {
                        None => cell_type,
                        Some(existing) => existing.common_type(&cell_type),
                    });
                }
                None => has_nulls = true,
            }
        }

        (inferred, has_nulls)
    }
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Plain dates are accepted as midnight so that a column widened from Date to
/// Timestamp still parses every cell
pub(crate) fn parse_timestamp_or_date(value: &str) -> Option<NaiveDateTime> {
    parse_timestamp(value).or_else(|| parse_date(value).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_cell_types() {
        let test_cases = [
            ("42", Some(ColumnType::Integer)),
            ("-7", Some(ColumnType::Integer)),
            ("3.14", Some(ColumnType::Float)),
            ("1e-3", Some(ColumnType::Float)),
            ("2012-03-28", Some(ColumnType::Date)),
            ("28/03/2012", Some(ColumnType::Date)),
            ("2012-03-28T04:12:55", Some(ColumnType::Timestamp)),
            ("2012-03-28 04:12", Some(ColumnType::Timestamp)),
            ("VHS-GPS", Some(ColumnType::Text)),
            ("nan", Some(ColumnType::Text)),
            ("inf", Some(ColumnType::Text)),
            ("2012-02-30", Some(ColumnType::Text)),
            ("", None),
            ("   ", None),
        ];

        for (input, expected) in test_cases {
            assert_eq!(ColumnType::infer(input), expected, "input '{}'", input);
        }
    }

    #[test]
    fn test_type_promotion() {
        use ColumnType::*;

        assert_eq!(Integer.common_type(&Float), Float);
        assert_eq!(Float.common_type(&Integer), Float);
        assert_eq!(Date.common_type(&Timestamp), Timestamp);
        assert_eq!(Integer.common_type(&Date), Text);
        assert_eq!(Timestamp.common_type(&Float), Text);
        assert_eq!(Text.common_type(&Integer), Text);
    }

    #[test]
    fn test_infer_column_tracks_nulls() {
        let (kind, nulls) = ColumnType::infer_column(None, ["1", "", "2"]);
        assert_eq!(kind, Some(ColumnType::Integer));
        assert!(nulls);

        let (kind, nulls) = ColumnType::infer_column(Some(ColumnType::Integer), ["2.5"]);
        assert_eq!(kind, Some(ColumnType::Float));
        assert!(!nulls);

        let (kind, nulls) = ColumnType::infer_column(None, ["", " "]);
        assert_eq!(kind, None);
        assert!(nulls);
    }

    #[test]
    fn test_widened_date_column_parses_as_timestamp() {
        let midnight = parse_timestamp_or_date("2012-03-28").unwrap();
        assert_eq!(midnight.to_string(), "2012-03-28 00:00:00");
        assert!(parse_timestamp("2012-03-28").is_none());
    }
}
