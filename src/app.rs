#![cfg(feature = "web")]
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::loader;
use crate::pyramid::PyramidOptions;
use crate::session::{MAX_SELECTIONS, Selection, Session};

pub struct AppState {
    session: Mutex<Session>,
}

#[derive(Deserialize)]
struct GenerateRequest {
    #[serde(default = "default_true")]
    show_value_labels: bool,
    #[serde(default = "default_true")]
    show_table: bool,
}

fn default_true() -> bool {
    true
}

/// Starts the web application on the given address.
///
/// One session per process: the browser UI is a single-user tool, so the
/// two tables, the selections and the generated pyramids all live behind
/// one mutex, following the same state layout the endpoints expect.
pub async fn run(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app_state = Arc::new(AppState {
        session: Mutex::new(Session::new()),
    });

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/api/upload/:sex", post(upload_table))
        .route("/api/options", get(get_options))
        .route("/api/selections", post(set_selections))
        .route("/api/generate", post(generate))
        .route("/api/pyramid/:id", get(download_pyramid))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

/// Receives one spreadsheet upload (`sex` is "male" or "female") and
/// replaces that table on success. A failed load reports an error and
/// leaves any previously loaded table in place.
async fn upload_table(
    Path(sex): Path<String>,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if sex != "male" && sex != "female" {
        return error_json(
            StatusCode::NOT_FOUND,
            format!("unknown table '{}', expected 'male' or 'female'", sex),
        );
    }

    let mut file_data = Vec::new();
    let mut filename = String::new();

    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        if field.name().unwrap_or("unknown") == "file" {
            filename = field.file_name().unwrap_or("upload.xlsx").to_string();
            file_data = field.bytes().await.unwrap_or_default().to_vec();
        }
    }

    if file_data.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "no file data received".to_string());
    }

    let table = match loader::load_population_bytes(&filename, &file_data) {
        Ok(table) => table,
        Err(e) => return error_json(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };

    let mut session = state.session.lock().unwrap();
    let (rows, coerced_cells, skipped_rows) =
        (table.len(), table.coerced_cells, table.skipped_rows);
    if sex == "male" {
        session.load_male(table);
    } else {
        session.load_female(table);
    }

    Json(serde_json::json!({
        "status": "ok",
        "rows": rows,
        "coerced_cells": coerced_cells,
        "skipped_rows": skipped_rows,
        "countries": session.countries(),
        "years": session.years(),
        "ready": session.tables_loaded(),
    }))
    .into_response()
}

/// Distinct (country, year) values common to both loaded tables; the
/// closed choice the selectors are built from.
async fn get_options(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.session.lock().unwrap();

    Json(serde_json::json!({
        "countries": session.countries(),
        "years": session.years(),
        "max_selections": MAX_SELECTIONS,
        "ready": session.tables_loaded(),
    }))
}

/// Stores the pending selections. Pure state update: nothing is resolved
/// or rendered until /api/generate.
async fn set_selections(
    State(state): State<Arc<AppState>>,
    Json(selections): Json<Vec<Selection>>,
) -> impl IntoResponse {
    let mut session = state.session.lock().unwrap();

    match session.set_selections(selections) {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "count": session.selections().len(),
        }))
        .into_response(),
        Err(e) => error_json(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// The explicit trigger: runs the whole batch and returns the result grid
/// plus per-slot warnings.
async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    let options = PyramidOptions {
        show_value_labels: request.show_value_labels,
        show_table: request.show_table,
        ..PyramidOptions::default()
    };

    let mut session = state.session.lock().unwrap();
    let report = match session.generate(&options) {
        Ok(report) => report,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let grid: Vec<Vec<serde_json::Value>> = session
        .grid()
        .iter()
        .map(|row| {
            row.iter()
                .map(|result| {
                    serde_json::json!({
                        "id": result.id,
                        "slot": result.slot,
                        "country": result.pyramid.country,
                        "year": result.pyramid.year,
                        "filename": result.filename(),
                        "total": result.pyramid.total,
                        "total_male": result.pyramid.total_male,
                        "total_female": result.pyramid.total_female,
                        "table": result.pyramid.table,
                    })
                })
                .collect()
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "generated": report.generated,
        "warnings": report.warnings,
        "grid": grid,
    }))
    .into_response()
}

/// Serves one generated pyramid as a downloadable PNG.
async fn download_pyramid(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let session = state.session.lock().unwrap();

    match session.find_result(id) {
        Some(result) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/png")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", result.filename()),
            )
            .body(axum::body::Body::from(Bytes::from(
                result.pyramid.png.clone(),
            )))
            .unwrap(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn error_json(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "message": message,
        })),
    )
        .into_response()
}
