//! Google Sheets v4 client

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client as HttpClient, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::auth::Authenticator;
use super::{CellUpdate, SheetStore, a1, column_to_letter, quote_sheet, trim_row};
use crate::config::Settings;
use crate::error::{TrackerError, TrackerResult};

pub const SHEETS_API: &str = "https://sheets.googleapis.com";
pub const DRIVE_API: &str = "https://www.googleapis.com";

const USER_ENTERED: &str = "USER_ENTERED";
const RAW: &str = "RAW";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct DriveFiles {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// One spreadsheet reached through the Sheets REST API
#[derive(Debug)]
pub struct GoogleSheets {
    http: HttpClient,
    auth: Authenticator,
    base_url: Url,
    spreadsheet_id: String,
}

impl GoogleSheets {
    /// Authenticate and resolve the spreadsheet, by id when configured,
    /// otherwise by name through Drive
    pub async fn open(settings: &Settings) -> TrackerResult<Self> {
        let http = HttpClient::builder()
            .user_agent(concat!("task-tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        let auth = Authenticator::from_source(&settings.credential_source()?, http.clone())?;
        let base_url = parse_url(SHEETS_API)?;

        let spreadsheet_id = match &settings.spreadsheet_id {
            Some(id) => id.clone(),
            None => find_by_name(&http, &auth, &settings.spreadsheet_name).await?,
        };
        info!("Opened spreadsheet {}", spreadsheet_id);

        Ok(Self {
            http,
            auth,
            base_url,
            spreadsheet_id,
        })
    }

    /// `{base}/v4/spreadsheets/{id}/<segments...>`, each segment percent-encoded
    fn url(&self, segments: &[&str]) -> TrackerResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TrackerError::Config(format!("invalid API base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, range: &str) -> TrackerResult<Url> {
        self.url(&[self.spreadsheet_id.as_str(), "values", range])
    }

    async fn request(&self, method: Method, url: Url) -> TrackerResult<RequestBuilder> {
        let token = self.auth.token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn get_range(&self, range: &str, major_dimension: &str) -> TrackerResult<Vec<Vec<String>>> {
        let url = self.values_url(range)?;
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("majorDimension", major_dimension)]);
        let body: ValueRange = serde_json::from_value(send(request).await?)?;
        Ok(body
            .values
            .into_iter()
            .map(|row| trim_row(row.iter().map(cell_text).collect()))
            .collect())
    }

    async fn write_values(
        &self,
        method: Method,
        url: Url,
        input_option: &str,
        extra: &[(&str, &str)],
        rows: &[Vec<String>],
    ) -> TrackerResult<Value> {
        let request = self
            .request(method, url)
            .await?
            .query(&[("valueInputOption", input_option)])
            .query(extra)
            .json(&json!({ "majorDimension": "ROWS", "values": rows }));
        send(request).await
    }
}

#[async_trait]
impl SheetStore for GoogleSheets {
    async fn worksheet_titles(&self) -> TrackerResult<Vec<String>> {
        let url = self.url(&[self.spreadsheet_id.as_str()])?;
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("fields", "sheets.properties.title")]);
        let meta: SpreadsheetMeta = serde_json::from_value(send(request).await?)?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> TrackerResult<()> {
        let target = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(&[target.as_str()])?;
        let request = self.request(Method::POST, url).await?.json(&json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            }]
        }));
        send(request).await?;
        info!("Created worksheet '{}'", title);
        Ok(())
    }

    async fn get_values(&self, sheet: &str) -> TrackerResult<Vec<Vec<String>>> {
        self.get_range(&quote_sheet(sheet), "ROWS").await
    }

    async fn row_values(&self, sheet: &str, row: u32) -> TrackerResult<Vec<String>> {
        let range = format!("{}!{}:{}", quote_sheet(sheet), row, row);
        Ok(self
            .get_range(&range, "ROWS")
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn col_values(&self, sheet: &str, col: u32) -> TrackerResult<Vec<String>> {
        let letter = column_to_letter(col);
        let range = format!("{}!{}:{}", quote_sheet(sheet), letter, letter);
        Ok(self
            .get_range(&range, "COLUMNS")
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn cell(&self, sheet: &str, row: u32, col: u32) -> TrackerResult<Option<String>> {
        let rows = self.get_range(&a1(sheet, row, col), "ROWS").await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.into_iter().next())
            .filter(|v| !v.is_empty()))
    }

    async fn update_cell(&self, sheet: &str, row: u32, col: u32, value: &str) -> TrackerResult<()> {
        let range = a1(sheet, row, col);
        debug!("Updating {}", range);
        let url = self.values_url(&range)?;
        self.write_values(Method::PUT, url, USER_ENTERED, &[], &[vec![value.to_string()]])
            .await?;
        Ok(())
    }

    async fn batch_update(&self, sheet: &str, updates: &[CellUpdate]) -> TrackerResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = updates
            .iter()
            .map(|u| json!({ "range": a1(sheet, u.row, u.col), "values": [[u.value]] }))
            .collect();
        let url = self.url(&[self.spreadsheet_id.as_str(), "values:batchUpdate"])?;
        let request = self
            .request(Method::POST, url)
            .await?
            .json(&json!({ "valueInputOption": RAW, "data": data }));
        send(request).await?;
        debug!("Batch updated {} cells in '{}'", updates.len(), sheet);
        Ok(())
    }

    async fn append_rows(&self, sheet: &str, rows: &[Vec<String>]) -> TrackerResult<()> {
        let target = format!("{}!A1:append", quote_sheet(sheet));
        let url = self.values_url(&target)?;
        self.write_values(
            Method::POST,
            url,
            USER_ENTERED,
            &[("insertDataOption", "INSERT_ROWS")],
            rows,
        )
        .await?;
        Ok(())
    }

    async fn clear(&self, sheet: &str) -> TrackerResult<()> {
        let target = format!("{}:clear", quote_sheet(sheet));
        let url = self.values_url(&target)?;
        let request = self.request(Method::POST, url).await?.json(&json!({}));
        send(request).await?;
        Ok(())
    }

    async fn update(&self, sheet: &str, rows: &[Vec<String>]) -> TrackerResult<()> {
        let url = self.values_url(&format!("{}!A1", quote_sheet(sheet)))?;
        self.write_values(Method::PUT, url, RAW, &[], rows).await?;
        Ok(())
    }
}

async fn find_by_name(http: &HttpClient, auth: &Authenticator, name: &str) -> TrackerResult<String> {
    let mut url = parse_url(DRIVE_API)?;
    url.set_path("/drive/v3/files");
    let query = format!(
        "name = '{}' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
        name.replace('\'', "\\'")
    );
    let request = http
        .get(url)
        .bearer_auth(auth.token().await?)
        .query(&[("q", query.as_str()), ("fields", "files(id,name)")]);
    let files: DriveFiles = serde_json::from_value(send(request).await?)?;
    files
        .files
        .into_iter()
        .next()
        .map(|f| f.id)
        .ok_or_else(|| TrackerError::SpreadsheetNotFound(name.to_string()))
}

async fn send(request: RequestBuilder) -> TrackerResult<Value> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(api_error(status, &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

/// Map a failed API response onto the error the callers act on
pub fn api_error(status: StatusCode, body: &str) -> TrackerError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("RATE_LIMIT_EXCEEDED")
        || body.contains("RESOURCE_EXHAUSTED")
    {
        return TrackerError::RateLimited(message);
    }
    if body.contains("Google Drive API has not been used") {
        return TrackerError::DriveApiDisabled;
    }
    TrackerError::Api {
        status: status.as_u16(),
        message,
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_url(raw: &str) -> TrackerResult<Url> {
    Url::parse(raw).map_err(|e| TrackerError::Config(format!("invalid URL '{}': {}", raw, e)))
}
