use crate::oauth::{GoogleOAuth, OAuthError};
use crate::table::{Row, Table};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
pub const DEFAULT_START_RANGE: &str = "A1";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Google Sheets export is not configured")]
    NotConfigured,

    #[error("Authorization failed: {0}")]
    Auth(#[from] OAuthError),

    #[error("Google Sheets request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google Sheets returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

fn default_sheet_name() -> String {
    DEFAULT_SHEET_NAME.to_string()
}

fn default_start_range() -> String {
    DEFAULT_START_RANGE.to_string()
}

/// What the browser posts to push a table: data rows without the header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub data: Vec<Row>,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_start_range")]
    pub range: String,
}

impl ExportRequest {
    /// Everything but the header row of `table`.
    pub fn from_table(table: &Table, sheet_name: &str, range: &str) -> Self {
        ExportRequest {
            data: table.data_rows().to_vec(),
            sheet_name: sheet_name.to_string(),
            range: range.to_string(),
        }
    }

    /// `Sheet1!A1` style target.
    pub fn target(&self) -> String {
        format!("{}!{}", self.sheet_name, self.range)
    }
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_cells: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportResult {
    pub fn failed(message: impl Into<String>) -> Self {
        ExportResult {
            success: false,
            error: Some(message.into()),
            ..ExportResult::default()
        }
    }
}

/// What the remote sheet reported after a write.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AppendOutcome {
    pub spreadsheet_id: Option<String>,
    pub updated_cells: Option<u64>,
    pub updated_range: Option<String>,
}

/// Destination for exported rows.
pub trait SheetWriter: Send + Sync {
    fn append(
        &self,
        target: &str,
        values: &[Row],
    ) -> impl Future<Output = Result<AppendOutcome, ExportError>> + Send;
}

/// Send the request's rows to `writer`. Failures are reported in the result,
/// never retried.
pub async fn export<W: SheetWriter>(request: &ExportRequest, writer: &W) -> ExportResult {
    let target = request.target();
    match writer.append(&target, &request.data).await {
        Ok(outcome) => {
            log::info!(
                "Exported {} rows to {} ({} cells)",
                request.data.len(),
                target,
                outcome.updated_cells.unwrap_or_default()
            );
            ExportResult {
                success: true,
                updated_cells: outcome.updated_cells,
                updated_range: outcome.updated_range,
                spreadsheet_id: outcome.spreadsheet_id,
                error: None,
            }
        }
        Err(e) => {
            log::warn!("Export to {} failed: {}", target, e);
            ExportResult::failed(e.to_string())
        }
    }
}

/// Export the data rows of `table` (header stripped).
pub async fn export_table<W: SheetWriter>(
    table: &Table,
    sheet_name: &str,
    range: &str,
    writer: &W,
) -> ExportResult {
    export(&ExportRequest::from_table(table, sheet_name, range), writer).await
}

/// Body of a `values:append` call.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange<'a> {
    pub range: &'a str,
    pub major_dimension: &'static str,
    pub values: &'a [Row],
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppendValuesResponse {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub table_range: Option<String>,
    #[serde(default)]
    pub updates: Option<UpdateValuesResponse>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: Option<u64>,
    #[serde(default)]
    pub updated_columns: Option<u64>,
    #[serde(default)]
    pub updated_cells: Option<u64>,
}

impl From<AppendValuesResponse> for AppendOutcome {
    fn from(response: AppendValuesResponse) -> Self {
        let updates = response.updates.unwrap_or_default();
        AppendOutcome {
            spreadsheet_id: response.spreadsheet_id,
            updated_cells: updates.updated_cells,
            updated_range: updates.updated_range,
        }
    }
}

/// Appends rows to one spreadsheet through the Sheets v4 REST API.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    oauth: Arc<GoogleOAuth>,
}

impl GoogleSheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, oauth: Arc<GoogleOAuth>) -> Self {
        GoogleSheetsClient {
            http: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            oauth,
        }
    }

    pub fn append_url(&self, target: &str) -> String {
        format!(
            "{}/{}/values/{}:append?valueInputOption=USER_ENTERED",
            SHEETS_API,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(target)
        )
    }
}

impl SheetWriter for GoogleSheetsClient {
    async fn append(&self, target: &str, values: &[Row]) -> Result<AppendOutcome, ExportError> {
        let token = self.oauth.access_token().await?;
        let body = ValueRange {
            range: target,
            major_dimension: "ROWS",
            values,
        };

        let response = self
            .http
            .post(self.append_url(target))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AppendValuesResponse = response.json().await?;
        Ok(parsed.into())
    }
}
