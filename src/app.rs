use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::auth::require_basic_auth;
use crate::classifier::{Classifier, GeminiClassifier};
use crate::config::Config;
use crate::display::{TableView, render};
use crate::downloader::DownloadFormat;
use crate::editor::{InsertPosition, TableEditor};
use crate::error::AppError;
use crate::loader::{DEFAULT_MAX_CELLS, extract_with_limit};
use crate::oauth::{GoogleOAuth, OAuthError};
use crate::pipeline::{PipelineOptions, categorize};
use crate::range::RangeDescriptor;
use crate::sheets::{
    DEFAULT_SHEET_NAME, DEFAULT_START_RANGE, ExportError, ExportRequest, ExportResult,
    GoogleSheetsClient, SheetWriter, export, export_table,
};
use crate::store::{SessionId, SessionStore};
use crate::table::Table;

pub const SESSION_COOKIE: &str = "session";

/// Shared by every handler. Generic over the classifier and the sheet
/// writer so tests can run the router without network access.
pub struct AppState<C, W> {
    pub store: SessionStore,
    pub classifier: Arc<C>,
    /// `None` when no spreadsheet is configured; export then answers 503.
    pub sheets: Option<W>,
    pub oauth: Option<Arc<GoogleOAuth>>,
    pub options: PipelineOptions,
    /// Cell cap for one uploaded range.
    pub max_extract_cells: usize,
}

impl<C, W> AppState<C, W> {
    pub fn new(
        store: SessionStore,
        classifier: C,
        sheets: Option<W>,
        oauth: Option<Arc<GoogleOAuth>>,
        options: PipelineOptions,
    ) -> Self {
        AppState {
            store,
            classifier: Arc::new(classifier),
            sheets,
            oauth,
            options,
            max_extract_cells: DEFAULT_MAX_CELLS,
        }
    }
}

type Shared<C, W> = Arc<AppState<C, W>>;

#[derive(Deserialize)]
struct CellEdit {
    row: usize,
    column: usize,
    value: String,
}

#[derive(Deserialize)]
struct NewColumn {
    name: String,
    #[serde(default)]
    anchor: Option<usize>,
    #[serde(default)]
    position: InsertPosition,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ExportTarget {
    sheet_name: Option<String>,
    range: Option<String>,
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

pub fn router<C, W>(state: AppState<C, W>, config: &Config) -> Router
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let mut app = Router::new()
        .route("/", get(serve_landing))
        .route("/api/upload", post(upload::<C, W>))
        .route(
            "/api/table",
            get(get_table::<C, W>)
                .put(put_table::<C, W>)
                .delete(clear_table::<C, W>),
        )
        .route("/api/table/cell", post(edit_cell::<C, W>))
        .route("/api/table/rows/delete-selected", post(delete_selected::<C, W>))
        .route("/api/table/rows/:row", delete(delete_row::<C, W>))
        .route("/api/table/selection", delete(clear_selection::<C, W>))
        .route("/api/table/selection/all", post(select_all::<C, W>))
        .route("/api/table/selection/:row", post(toggle_selection::<C, W>))
        .route("/api/table/columns", post(insert_column::<C, W>))
        .route("/api/table/columns/:column", delete(delete_column::<C, W>))
        .route("/api/table/export", post(export_session::<C, W>))
        .route("/api/table/download/:format", get(download::<C, W>))
        .route("/api/sheets", post(export_rows::<C, W>))
        .route("/api/auth/google", get(google_auth::<C, W>))
        .route("/api/auth/google/callback", get(google_callback::<C, W>))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(Arc::new(state));

    if let Some(credentials) = config.basic_auth.clone() {
        app = app.layer(middleware::from_fn_with_state(credentials, require_basic_auth));
    }

    app.layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
}

/// Build the production state from `config` and serve until the process
/// is stopped.
pub async fn run(config: Config) -> Result<(), AppError> {
    let classifier = GeminiClassifier::new(&config.classifier)?;
    let oauth = config.oauth.clone().map(|c| Arc::new(GoogleOAuth::new(c)));

    let sheets = match (&config.spreadsheet_id, &oauth) {
        (Some(id), Some(oauth)) => Some(GoogleSheetsClient::new(id.clone(), Arc::clone(oauth))),
        _ => {
            log::warn!("GOOGLE_SHEET_ID or Google OAuth credentials missing; export disabled");
            None
        }
    };

    let options = PipelineOptions {
        max_in_flight: config.classifier.max_in_flight,
        policy: config.classifier.policy,
    };
    let store = SessionStore::new(
        config.snapshot_dir.clone(),
        Duration::from_secs(config.session_idle_secs),
    );
    let mut state = AppState::new(store, classifier, sheets, oauth, options);
    state.max_extract_cells = config.max_extract_cells;
    let app = router(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    log::info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{} {} {} {:?}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

async fn serve_landing() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

fn session_of(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| SessionId::parse_str(cookie.value()).ok())
}

fn with_session(jar: CookieJar, session: SessionId) -> CookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, session.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

fn current_view<C, W>(state: &AppState<C, W>, jar: &CookieJar) -> Result<TableView, AppError> {
    let session = session_of(jar).ok_or(AppError::NoTable)?;
    state.store.read(session, render).ok_or(AppError::NoTable)
}

/// Run one edit against the caller's table and answer with the new view.
fn apply<C, W>(
    state: &AppState<C, W>,
    jar: &CookieJar,
    edit: impl FnOnce(&mut TableEditor) -> Result<(), AppError>,
) -> Result<Json<TableView>, AppError> {
    let session = session_of(jar).ok_or(AppError::NoTable)?;
    state
        .store
        .update(session, |editor| -> Result<TableView, AppError> {
            edit(editor)?;
            Ok(render(editor))
        })
        .ok_or(AppError::NoTable)?
        .map(Json)
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::BadRequest(message.into())
}

async fn upload<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Json<TableView>), AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let mut file: Option<(String, Bytes)> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
            file = Some((file_name, bytes));
        } else {
            let value = field.text().await.map_err(|e| bad_request(e.to_string()))?;
            fields.insert(name, value);
        }
    }

    // Browsers send an empty, nameless part when no file was picked.
    let Some((file_name, bytes)) =
        file.filter(|(file_name, bytes)| !(file_name.is_empty() && bytes.is_empty()))
    else {
        return Err(bad_request("File not uploaded."));
    };

    let field = |key: &str| fields.get(key).map(String::as_str).unwrap_or_default();
    let table = match RangeDescriptor::parse(
        field("startRow"),
        field("endRow"),
        field("startCol"),
        field("endCol"),
    ) {
        Ok(range) => extract_with_limit(&bytes, &file_name, &range, state.max_extract_cells),
        Err(e) => {
            log::warn!("Ignoring upload '{}' with bad range: {}", file_name, e);
            Table::empty()
        }
    };

    let categorized = categorize(table, Arc::clone(&state.classifier), state.options).await;

    let session = session_of(&jar).unwrap_or_else(SessionStore::new_session_id);
    state.store.begin(session, categorized);
    let view = state.store.read(session, render).ok_or(AppError::NoTable)?;

    Ok((with_session(jar, session), Json(view)))
}

async fn get_table<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    current_view(&state, &jar).map(Json)
}

/// Seed the session from a previously saved nested array.
async fn put_table<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    Json(table): Json<Table>,
) -> Result<(CookieJar, Json<TableView>), AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let session = session_of(&jar).unwrap_or_else(SessionStore::new_session_id);
    state.store.begin(session, table);
    let view = state.store.read(session, render).ok_or(AppError::NoTable)?;
    Ok((with_session(jar, session), Json(view)))
}

async fn clear_table<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
) -> Json<serde_json::Value>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    if let Some(session) = session_of(&jar) {
        state.store.clear(session);
    }
    Json(json!({ "status": "ok" }))
}

async fn edit_cell<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    Json(edit): Json<CellEdit>,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        if editor.edit_cell(edit.row, edit.column, edit.value) {
            Ok(())
        } else {
            Err(bad_request(format!(
                "Cell ({}, {}) does not exist",
                edit.row, edit.column
            )))
        }
    })
}

async fn delete_row<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    Path(row): Path<usize>,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        if editor.delete_row(row) {
            Ok(())
        } else {
            Err(bad_request(format!("Row {} does not exist", row)))
        }
    })
}

async fn delete_selected<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        let removed = editor.delete_selected_rows();
        log::debug!("Deleted {} selected rows", removed);
        Ok(())
    })
}

async fn toggle_selection<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    Path(row): Path<usize>,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        if editor.toggle_row_selection(row) {
            Ok(())
        } else {
            Err(bad_request(format!("Row {} does not exist", row)))
        }
    })
}

async fn select_all<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        editor.select_all();
        Ok(())
    })
}

async fn clear_selection<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        editor.clear_selection();
        Ok(())
    })
}

async fn insert_column<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    Json(column): Json<NewColumn>,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        editor
            .insert_column(&column.name, column.anchor, column.position)
            .map(|_| ())
            .ok_or_else(|| bad_request("Column name is required"))
    })
}

async fn delete_column<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    Path(column): Path<usize>,
) -> Result<Json<TableView>, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    apply(&state, &jar, |editor| {
        if editor.delete_column(column) {
            Ok(())
        } else {
            Err(bad_request(format!("Column {} does not exist", column)))
        }
    })
}

fn export_response(result: ExportResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

/// Push the caller's table (minus its header) to the configured sheet.
async fn export_session<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    target: Option<Json<ExportTarget>>,
) -> Result<Response, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let writer = state.sheets.as_ref().ok_or(ExportError::NotConfigured)?;
    let session = session_of(&jar).ok_or(AppError::NoTable)?;
    let table = state.store.table(session).ok_or(AppError::NoTable)?;

    let target = target.map(|Json(target)| target).unwrap_or_default();
    let sheet_name = target.sheet_name.as_deref().unwrap_or(DEFAULT_SHEET_NAME);
    let range = target.range.as_deref().unwrap_or(DEFAULT_START_RANGE);

    let result = export_table(&table, sheet_name, range, writer).await;
    Ok(export_response(result))
}

/// Push rows supplied by the client as-is.
async fn export_rows<C, W>(
    State(state): State<Shared<C, W>>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let writer = state.sheets.as_ref().ok_or(ExportError::NotConfigured)?;
    let result = export(&request, writer).await;
    Ok(export_response(result))
}

async fn download<C, W>(
    State(state): State<Shared<C, W>>,
    jar: CookieJar,
    Path(format): Path<String>,
) -> Result<Response, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let format = DownloadFormat::parse(&format)?;
    let session = session_of(&jar).ok_or(AppError::NoTable)?;
    let table = state.store.table(session).ok_or(AppError::NoTable)?;
    let bytes = format.render(&table)?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", format.file_name()),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn google_auth<C, W>(State(state): State<Shared<C, W>>) -> Result<Redirect, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let oauth = state.oauth.as_ref().ok_or(OAuthError::NotConfigured)?;
    Ok(Redirect::temporary(&oauth.authorization_url()))
}

/// Show the tokens from the consent redirect so the operator can store the
/// refresh token as `GOOGLE_REFRESH_TOKEN`.
async fn google_callback<C, W>(
    State(state): State<Shared<C, W>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError>
where
    C: Classifier + 'static,
    W: SheetWriter + 'static,
{
    let oauth = state.oauth.as_ref().ok_or(OAuthError::NotConfigured)?;
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No code provided" })),
        )
            .into_response());
    };

    match oauth.exchange_code(&code).await {
        Ok(tokens) => Ok(Json(json!({
            "message": "Add this to your .env file as GOOGLE_REFRESH_TOKEN",
            "refresh_token": tokens.refresh_token,
            "access_token": tokens.access_token,
        }))
        .into_response()),
        Err(e) => {
            log::error!("Error getting tokens: {}", e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to get tokens" })),
            )
                .into_response())
        }
    }
}
