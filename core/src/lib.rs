//! Blocking client for the Movebank animal-tracking data API.
//!
//! # Overview
//! Builds `HttpRequest` values for the `direct-read` (CSV) and `json-auth`
//! (JSON) services, executes them through a `Transport`, and parses the
//! `HttpResponse` into raw text, CSV rows, or a JSON value tree.
//!
//! # Design
//! - `MovebankClient` is stateless: it holds a `ClientConfig` and a transport.
//! - Building and parsing are pure, so the I/O boundary stays explicit; the
//!   default transport is ureq, tests plug in canned responses.
//! - `RequestParams` accepts any key. Movebank vocabulary lives in
//!   `movebank` and is only a convenience on top.
//! - Study license terms are accepted by echoing their MD5, with the
//!   session cookie replayed.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod movebank;
pub mod params;
pub mod response;
pub mod transform;
pub mod transport;

pub use client::MovebankClient;
pub use config::{ClientConfig, Credentials};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use movebank::{studies_by_sensor, EntityType, SensorType};
pub use params::{ParamValue, RequestParams};
pub use response::{write_csv, CsvRows, Format, RawResponse, Row};
pub use transform::{transform_raw_acc, transform_raw_gps, AccSample, AccUnit, GpsFix, Sensitivity};
pub use transport::{Transport, UreqTransport};
