//! Parsed responses from the Movebank service.
//!
//! # Design
//! A `RawResponse` keeps the whole body in memory. CSV is decoded lazily by
//! `rows()`, one record per `next()`; calling `rows()` again restarts from the
//! top. JSON is decoded into a `serde_json::Value` tree on demand.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// One CSV record keyed by column name.
pub type Row = BTreeMap<String, String>;

/// The two encodings the service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
}

impl Format {
    /// Map a `Content-Type` value to a format. Generic types such as
    /// `text/plain` return `None` so the caller's expectation decides.
    pub fn from_content_type(content_type: &str) -> Option<Format> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/csv" | "application/csv" | "text/comma-separated-values" => Some(Format::Csv),
            m if m == "application/json" || m.ends_with("+json") || m == "text/json" => Some(Format::Json),
            _ => None,
        }
    }
}

/// A successful response body with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub format: Format,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn into_text(self) -> String {
        self.body
    }

    /// Lazily decode the body as CSV with a header line.
    pub fn rows(&self) -> Result<CsvRows<'_>, ApiError> {
        if self.format != Format::Csv {
            return Err(ApiError::Format(format!(
                "expected CSV but the response is {:?}",
                self.format
            )));
        }
        CsvRows::new(&self.body)
    }

    /// Decode every CSV record, failing on the first malformed one.
    pub fn collect_rows(&self) -> Result<Vec<Row>, ApiError> {
        self.rows()?.collect()
    }

    pub fn json(&self) -> Result<serde_json::Value, ApiError> {
        self.json_as()
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.format != Format::Json {
            return Err(ApiError::Format(format!(
                "expected JSON but the response is {:?}",
                self.format
            )));
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Single-pass iterator over the records of a CSV body.
///
/// Every record must have as many fields as the header line; a record that
/// does not yields `ApiError::Format`.
pub struct CsvRows<'a> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<&'a [u8]>,
}

impl<'a> CsvRows<'a> {
    pub fn new(body: &'a str) -> Result<Self, ApiError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(body.as_bytes());
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut seen = HashSet::new();
        if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(ApiError::Format(format!("duplicate CSV column {dup:?}")));
        }

        Ok(Self {
            headers,
            records: reader.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for CsvRows<'_> {
    type Item = Result<Row, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(self
            .headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect()))
    }
}

/// Write `rows` as CSV with `headers` as the column order. Columns missing
/// from a row are written empty.
pub fn write_csv<W: Write>(headers: &[String], rows: &[Row], writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(headers)?;
    for row in rows {
        out.write_record(headers.iter().map(|h| row.get(h).map(String::as_str).unwrap_or("")))?;
    }
    out.flush()?;
    Ok(())
}
