use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use md5::{Digest, Md5};
use serde_json::json;
use tokio::net::TcpListener;

pub const USERNAME: &str = "ringer";
pub const PASSWORD: &str = "albatross";

pub const OPEN_STUDY_ID: i64 = 2911040;
pub const LICENSED_STUDY_ID: i64 = 77;
pub const HIDDEN_STUDY_ID: i64 = 1005;
pub const GPS_SENSOR_ID: i64 = 653;
pub const ACC_SENSOR_ID: i64 = 2365683;

pub const LICENSE_TERMS: &str =
    "License Terms: Data from study 77 may be used for non-commercial research with attribution.";
pub const SESSION_COOKIE: &str = "JSESSIONID=mock-session-77";

#[derive(Clone, Debug)]
pub struct Study {
    pub id: i64,
    pub name: String,
    pub i_can_see_data: bool,
    pub there_are_data_which_i_cannot_see: bool,
    pub sensor_type_ids: String,
}

#[derive(Clone, Debug)]
pub struct Individual {
    pub id: i64,
    pub study_id: i64,
    pub local_identifier: String,
    pub taxon_canonical_name: String,
}

#[derive(Clone, Debug)]
pub struct Event {
    pub individual_id: i64,
    pub sensor_type_id: i64,
    pub columns: Vec<(&'static str, String)>,
}

/// Fixed tables served by the fake service.
#[derive(Debug)]
pub struct Fixtures {
    pub studies: Vec<Study>,
    pub individuals: Vec<Individual>,
    pub events: Vec<Event>,
}

impl Default for Fixtures {
    fn default() -> Self {
        let studies = vec![
            Study {
                id: OPEN_STUDY_ID,
                name: "Galapagos Albatrosses".to_string(),
                i_can_see_data: true,
                there_are_data_which_i_cannot_see: false,
                sensor_type_ids: "GPS,Acceleration".to_string(),
            },
            Study {
                id: LICENSED_STUDY_ID,
                name: "White Storks, Rhine valley".to_string(),
                i_can_see_data: true,
                there_are_data_which_i_cannot_see: false,
                sensor_type_ids: "Argos Doppler Shift".to_string(),
            },
            Study {
                id: HIDDEN_STUDY_ID,
                name: "Embargoed bats".to_string(),
                i_can_see_data: false,
                there_are_data_which_i_cannot_see: true,
                sensor_type_ids: "Radio Transmitter".to_string(),
            },
        ];
        let individuals = vec![
            Individual {
                id: 2911059,
                study_id: OPEN_STUDY_ID,
                local_identifier: "4264-84830852".to_string(),
                taxon_canonical_name: "Phoebastria irrorata".to_string(),
            },
            Individual {
                id: 2911062,
                study_id: OPEN_STUDY_ID,
                local_identifier: "4266-84831108".to_string(),
                taxon_canonical_name: "Phoebastria irrorata".to_string(),
            },
            Individual {
                id: 501,
                study_id: LICENSED_STUDY_ID,
                local_identifier: "DER AU057".to_string(),
                taxon_canonical_name: "Ciconia ciconia".to_string(),
            },
        ];
        let gps = |ts: &str, lat: &str, long: &str| Event {
            individual_id: 2911059,
            sensor_type_id: GPS_SENSOR_ID,
            columns: vec![
                ("timestamp", ts.to_string()),
                ("deployment_id", "2911066".to_string()),
                ("location_lat", lat.to_string()),
                ("location_long", long.to_string()),
            ],
        };
        let events = vec![
            gps("2008-05-31 13:30:02.000", "-1.3737", "-89.6268"),
            gps("2008-05-31 15:00:00.000", "-1.3801", "-89.6112"),
            gps("2008-05-31 16:30:00.000", "", ""),
            Event {
                individual_id: 2911059,
                sensor_type_id: ACC_SENSOR_ID,
                columns: vec![
                    ("timestamp", "2008-05-31 13:30:05.000".to_string()),
                    ("deployment_id", "2911066".to_string()),
                    ("tag_local_identifier", "4264".to_string()),
                    ("acceleration_sampling_frequency_per_axis", "10".to_string()),
                    ("accelerations_raw", "2048 2560 1536 2048 2048 3072".to_string()),
                ],
            },
        ];
        Self {
            studies,
            individuals,
            events,
        }
    }
}

pub type Db = Arc<Fixtures>;

pub fn app() -> Router {
    let db: Db = Arc::new(Fixtures::default());
    Router::new()
        .route("/movebank/service/direct-read", get(direct_read))
        .route("/movebank/service/json-auth", get(json_auth))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

type Params = HashMap<String, String>;

fn error(status: StatusCode, message: &str) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], message.to_string()).into_response()
}

fn csv_body(headers: &[&str], rows: &[Vec<String>]) -> Result<Vec<u8>, csv::Error> {
    let mut out = csv::Writer::from_writer(Vec::new());
    out.write_record(headers)?;
    for row in rows {
        out.write_record(row)?;
    }
    out.into_inner().map_err(|e| e.into_error().into())
}

fn csv_response(headers: &[&str], rows: Vec<Vec<String>>) -> Response {
    match csv_body(headers, &rows) {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/csv")], body).into_response(),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, &format!("csv encoding failed: {e}")),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Basic {}", BASE64.encode(format!("{USERNAME}:{PASSWORD}")));
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn study_id(params: &Params) -> Result<i64, Response> {
    params
        .get("study_id")
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "study_id is required"))?
        .parse()
        .map_err(|_| error(StatusCode::BAD_REQUEST, "study_id must be numeric"))
}

/// Gate a licensed study: terms first, then the hash plus the session cookie.
fn license_gate(params: &Params, headers: &HeaderMap) -> Option<Response> {
    let has_session = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split("; ").any(|c| c == SESSION_COOKIE));
    match params.get("license-md5") {
        None => {
            let mut resp = (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], LICENSE_TERMS).into_response();
            resp.headers_mut().insert(
                header::SET_COOKIE,
                HeaderValue::from_str(&format!("{SESSION_COOKIE}; Path=/movebank; HttpOnly"))
                    .unwrap_or_else(|_| HeaderValue::from_static("")),
            );
            Some(resp)
        }
        Some(hash) if *hash == license_md5() && has_session => None,
        Some(_) => Some(error(StatusCode::FORBIDDEN, "Incorrect hash")),
    }
}

pub fn license_md5() -> String {
    hex::encode(Md5::digest(LICENSE_TERMS.as_bytes()))
}

async fn direct_read(State(db): State<Db>, headers: HeaderMap, Query(params): Query<Params>) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let Some(entity_type) = params.get("entity_type") else {
        return error(StatusCode::BAD_REQUEST, "entity_type is required");
    };
    tracing::debug!(%entity_type, "direct-read");

    match entity_type.as_str() {
        "study" => list_studies(&db),
        "individual" => match study_id(&params) {
            Ok(id) => list_individuals(&db, id, &params, &headers),
            Err(resp) => resp,
        },
        "event" => match study_id(&params) {
            Ok(id) => list_events(&db, id, &params, &headers),
            Err(resp) => resp,
        },
        other => error(StatusCode::BAD_REQUEST, &format!("unknown entity_type {other}")),
    }
}

fn list_studies(db: &Fixtures) -> Response {
    let rows = db
        .studies
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.name.clone(),
                s.i_can_see_data.to_string(),
                s.there_are_data_which_i_cannot_see.to_string(),
                s.sensor_type_ids.clone(),
            ]
        })
        .collect();
    csv_response(
        &["id", "name", "i_can_see_data", "there_are_data_which_i_cannot_see", "sensor_type_ids"],
        rows,
    )
}

fn find_study(db: &Fixtures, id: i64) -> Result<&Study, Response> {
    db.studies
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, &format!("no study with id {id}")))
}

fn list_individuals(db: &Fixtures, id: i64, params: &Params, headers: &HeaderMap) -> Response {
    if let Err(resp) = find_study(db, id) {
        return resp;
    }
    if id == LICENSED_STUDY_ID {
        if let Some(resp) = license_gate(params, headers) {
            return resp;
        }
    }
    let rows = db
        .individuals
        .iter()
        .filter(|i| i.study_id == id)
        .map(|i| {
            vec![
                i.id.to_string(),
                i.study_id.to_string(),
                i.local_identifier.clone(),
                i.taxon_canonical_name.clone(),
            ]
        })
        .collect();
    csv_response(&["id", "study_id", "local_identifier", "taxon_canonical_name"], rows)
}

fn list_events(db: &Fixtures, id: i64, params: &Params, headers: &HeaderMap) -> Response {
    let study = match find_study(db, id) {
        Ok(study) => study,
        Err(resp) => return resp,
    };
    if study.id == LICENSED_STUDY_ID {
        if let Some(resp) = license_gate(params, headers) {
            return resp;
        }
    }
    let individual: Option<i64> = params.get("individual_id").and_then(|v| v.parse().ok());
    let sensor: i64 = params
        .get("sensor_type_id")
        .and_then(|v| v.parse().ok())
        .unwrap_or(GPS_SENSOR_ID);

    let matching: Vec<&Event> = db
        .events
        .iter()
        .filter(|e| e.sensor_type_id == sensor)
        .filter(|e| individual.map_or(true, |i| e.individual_id == i))
        .filter(|e| {
            db.individuals
                .iter()
                .any(|i| i.id == e.individual_id && i.study_id == study.id)
        })
        .collect();

    let columns: Vec<&str> = match matching.first() {
        Some(e) => e.columns.iter().map(|(k, _)| *k).collect(),
        None => vec!["timestamp", "deployment_id"],
    };
    let rows = matching
        .iter()
        .map(|e| e.columns.iter().map(|(_, v)| v.clone()).collect())
        .collect();
    csv_response(&columns, rows)
}

async fn json_auth(State(db): State<Db>, headers: HeaderMap, Query(params): Query<Params>) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let id = match study_id(&params) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(resp) = find_study(&db, id) {
        return resp;
    }

    let individuals: Vec<serde_json::Value> = db
        .individuals
        .iter()
        .filter(|i| i.study_id == id)
        .map(|i| {
            let locations: Vec<serde_json::Value> = db
                .events
                .iter()
                .filter(|e| e.individual_id == i.id && e.sensor_type_id == GPS_SENSOR_ID)
                .map(|e| {
                    let col = |name: &str| {
                        e.columns
                            .iter()
                            .find(|(k, _)| *k == name)
                            .map(|(_, v)| v.clone())
                            .unwrap_or_default()
                    };
                    json!({
                        "timestamp": col("timestamp"),
                        "location_lat": col("location_lat").parse::<f64>().ok(),
                        "location_long": col("location_long").parse::<f64>().ok(),
                    })
                })
                .collect();
            json!({
                "study_id": i.study_id,
                "individual_local_identifier": i.local_identifier,
                "individual_taxon_canonical_name": i.taxon_canonical_name,
                "sensor_type_id": GPS_SENSOR_ID,
                "locations": locations,
            })
        })
        .collect();

    Json(json!({ "individuals": individuals })).into_response()
}
