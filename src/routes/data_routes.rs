use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path as FsPath;
use tracing::{debug, error, info};
use uuid::Uuid;

use hspf_reader::{
    parse_dsn_list, validate_labels, HbnReader, HspfError, Interval, LabelSpec, ScanMode,
    ScanOptions, TimeSeries, WdmFile,
};

use crate::models::extension_model::DecoderConfig;
use crate::routes::ws_handler::handle_ws_fetch;
use crate::state::app_state::AppState;
use crate::utils::conf_helper::get_cached_config;

#[derive(Serialize)]
pub struct ReaderSummary {
    pub id: String,
    pub path: String,
    pub signals_count: usize,
    pub headers: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct FileReadRequest {
    pub path: String,
    pub interval: Option<String>,
    pub labels: Option<Vec<String>>,
    /// Dataset selection for WDM files, e.g. `"101:103+200"`
    pub datasets: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct FileReadResponse {
    pub id: String,
    pub name: String,
    pub path: String,
    pub source: String,
    pub headers: Vec<String>,
    pub diagnostics: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct CatalogRequest {
    pub path: String,
    pub labels: Option<Vec<String>>,
}

#[derive(Serialize, Debug)]
pub struct CatalogRow {
    pub operation: String,
    pub element: u32,
    pub group: String,
    pub variable: String,
    pub interval: String,
    pub start: String,
    pub end: String,
    pub frequency: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Handler error carrying the status it maps to.
pub struct ApiError(StatusCode, String);

impl From<HspfError> for ApiError {
    fn from(err: HspfError) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("{} -> {}", self.1, self.0);
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

/// Series decoded from one file, with non-fatal diagnostics rendered.
struct Decoded {
    series: Vec<(String, TimeSeries)>,
    diagnostics: Vec<String>,
}

enum FileKind {
    Hbn,
    Wdm,
}

impl FileKind {
    fn from_path(path: &str) -> Result<Self, ApiError> {
        let ext = FsPath::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("hbn") => Ok(FileKind::Hbn),
            Some("wdm") => Ok(FileKind::Wdm),
            _ => Err(ApiError(
                StatusCode::BAD_REQUEST,
                format!("{} is neither an .hbn nor a .wdm file", path),
            )),
        }
    }
}

fn decoder_config() -> DecoderConfig {
    get_cached_config()
        .map(|c| c.decoder.clone())
        .unwrap_or_default()
}

fn file_name(path: &str) -> String {
    FsPath::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

fn parse_labels(labels: Option<Vec<String>>) -> Result<Vec<LabelSpec>, HspfError> {
    let labels = labels.unwrap_or_else(|| vec![",,,".to_string()]);
    validate_labels(&labels)
}

fn decode_hbn(
    path: &str,
    interval: Interval,
    labels: &[LabelSpec],
    options: &ScanOptions,
) -> Result<Decoded, HspfError> {
    let reader = HbnReader::open(path)?;
    let out = reader.scan(labels, Some(interval), ScanMode::Extract, options)?;
    let diagnostics = out.diagnostics.iter().map(|d| d.to_string()).collect();
    let series = out
        .data
        .into_series()
        .unwrap_or_default()
        .into_iter()
        .map(|(key, series)| (key.column_name(), series))
        .collect();
    Ok(Decoded { series, diagnostics })
}

fn decode_wdm(path: &str, datasets: Option<&str>) -> Result<Decoded, HspfError> {
    let wdm = WdmFile::open(path)?;
    let dsns = match datasets {
        Some(spec) => parse_dsn_list(spec)?,
        None => wdm.dataset_numbers()?,
    };
    let out = wdm.extract(&dsns)?;
    let name = file_name(path);
    let diagnostics = out.diagnostics.iter().map(|d| d.to_string()).collect();
    let series = out
        .columns
        .into_iter()
        .map(|c| (format!("{}_{}", name, c.dsn), c.series))
        .collect();
    Ok(Decoded { series, diagnostics })
}

/// Runs a blocking decode off the async runtime.
async fn run_blocking<T, F>(job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, HspfError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(ApiError::from)
}

pub fn data_routes(state: AppState) -> Router {
    Router::new()
        .route("/read-file", post(read_file))
        .route("/catalog", post(catalog))
        .route("/fetch/{signal}", get(ws_fetch))
        .route("/readers", get(list_readers))
        .with_state(state)
}

async fn read_file(
    State(state): State<AppState>,
    Json(request): Json<FileReadRequest>,
) -> Result<Json<FileReadResponse>, ApiError> {
    debug!("Reading file: {:?}", request);

    let decoded = match FileKind::from_path(&request.path)? {
        FileKind::Hbn => {
            let decoder = decoder_config();
            let interval: Interval = request
                .interval
                .as_deref()
                .unwrap_or(decoder.default_interval.as_str())
                .parse()?;
            let labels = parse_labels(request.labels)?;
            let options = decoder.scan_options();
            let path = request.path.clone();
            run_blocking(move || decode_hbn(&path, interval, &labels, &options)).await?
        }
        FileKind::Wdm => {
            let path = request.path.clone();
            let datasets = request.datasets.clone();
            run_blocking(move || decode_wdm(&path, datasets.as_deref())).await?
        }
    };

    let file_id = Uuid::new_v4();
    let mut headers = Vec::with_capacity(decoded.series.len());
    for (base_name, series) in decoded.series {
        let final_name = state
            .register(file_id, &request.path, base_name.clone(), series)
            .await;
        info!("Register signal: {} (original: {})", final_name, base_name);
        headers.push(final_name);
    }

    Ok(Json(FileReadResponse {
        id: file_id.to_string(),
        name: file_name(&request.path),
        path: request.path.clone(),
        source: request.path,
        headers,
        diagnostics: decoded.diagnostics,
    }))
}

async fn catalog(Json(request): Json<CatalogRequest>) -> Result<Json<Vec<CatalogRow>>, ApiError> {
    if !matches!(FileKind::from_path(&request.path)?, FileKind::Hbn) {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "catalog is only available for .hbn files".to_string(),
        ));
    }
    let labels = parse_labels(request.labels)?;
    let options = decoder_config().scan_options();
    let path = request.path;

    let entries = run_blocking(move || {
        let reader = HbnReader::open(&path)?;
        let out = reader.scan(&labels, None, ScanMode::Catalog, &options)?;
        Ok(out.data.into_catalog().unwrap_or_default())
    })
    .await?;

    let rows = entries
        .into_iter()
        .map(|(key, entry)| CatalogRow {
            interval: key
                .interval()
                .map(|i| i.to_string())
                .unwrap_or_else(|| key.interval_code.to_string()),
            start: entry.start_period(),
            end: entry.end_period(),
            frequency: entry.frequency.to_string(),
            operation: key.operation,
            element: key.element,
            group: key.group,
            variable: key.variable,
        })
        .collect();
    Ok(Json(rows))
}

async fn ws_fetch(
    State(state): State<AppState>,
    Path(signal_name): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let signal_info = {
        let signals = state.signals.read().await;
        signals.get(&signal_name).cloned()
    };

    let Some(signal_info) = signal_info else {
        return ApiError(
            StatusCode::NOT_FOUND,
            format!("signal not found: {}", signal_name),
        )
        .into_response();
    };

    ws.on_upgrade(move |socket| handle_ws_fetch(socket, signal_name, signal_info))
}

async fn list_readers(State(state): State<AppState>) -> Json<Vec<ReaderSummary>> {
    let signals = state.signals.read().await;

    let mut groups: HashMap<Uuid, (String, Vec<String>)> = HashMap::new();
    for (name, info) in signals.iter() {
        groups
            .entry(info.file_id)
            .or_insert_with(|| (info.path.clone(), Vec::new()))
            .1
            .push(name.clone());
    }

    let mut out: Vec<ReaderSummary> = groups
        .into_iter()
        .map(|(id, (path, mut headers))| {
            headers.sort();
            ReaderSummary {
                id: id.to_string(),
                path,
                signals_count: headers.len(),
                headers,
            }
        })
        .collect();
    out.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.id.cmp(&b.id)));

    Json(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_extension() {
        assert!(matches!(FileKind::from_path("/data/run.HBN"), Ok(FileKind::Hbn)));
        assert!(matches!(FileKind::from_path("basin.wdm"), Ok(FileKind::Wdm)));
        let err = FileKind::from_path("notes.txt").err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_mapping() {
        let ApiError(status, _) = HspfError::InvalidInterval("hourly".into()).into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let ApiError(status, _) = HspfError::TruncatedRecord { offset: 9 }.into();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_default_labels_select_everything() {
        let labels = parse_labels(None).unwrap();
        assert_eq!(labels, vec![LabelSpec::any()]);
    }
}
