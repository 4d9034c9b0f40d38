use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{TrackerError, TrackerResult};

// Constants
pub const SPREADSHEET_NAME: &str = "Tasks Devs";
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const LOG_SHEET: &str = "Logs";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const CONNECTION_TTL: u64 = 60 * 60; // 1 hour in seconds
pub const UNKNOWN_USER: &str = "Desconhecido";

pub const DEVELOPERS: [&str; 4] = ["Eduardo", "Israel", "Pedro", "Vinícius"];

pub const REQUIRED_COLUMNS: [&str; 10] = [
    "id",
    "titulo",
    "descricao",
    "responsavel",
    "status",
    "tipo",
    "prioridade",
    "data_entrega",
    "progresso",
    "data_criacao",
];

pub const LOG_COLUMNS: [&str; 7] = [
    "timestamp",
    "acao",
    "task_id",
    "campo",
    "valor_antigo",
    "valor_novo",
    "usuario",
];

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// Which spreadsheet implementation backs the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Google Sheets over HTTPS
    Google,
    /// In-process workbook, lost on restart
    Memory,
}

/// Where the service account credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service account JSON handed over by the hosting secret store
    Inline(String),
    /// Service account JSON file on disk
    File(PathBuf),
    /// Pre-issued OAuth bearer token
    AccessToken(String),
}

/// Runtime settings, read from `TRACKER_*` environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub backend: Backend,
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_name: String,
    pub credentials_file: PathBuf,
    pub service_account_json: Option<String>,
    pub access_token: Option<String>,
    pub user: Option<String>,
    /// Pause between appending a task and re-checking its id
    pub verify_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            backend: Backend::Google,
            spreadsheet_id: None,
            spreadsheet_name: SPREADSHEET_NAME.to_string(),
            credentials_file: PathBuf::from(CREDENTIALS_FILE),
            service_account_json: None,
            access_token: None,
            user: None,
            verify_delay: Duration::from_millis(500),
        }
    }
}

impl Settings {
    /// Build settings from the process environment
    pub fn from_env() -> TrackerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> TrackerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(bind) = get("TRACKER_BIND") {
            settings.bind = bind;
        }
        if let Some(backend) = get("TRACKER_BACKEND") {
            settings.backend = match backend.to_lowercase().as_str() {
                "google" => Backend::Google,
                "memory" => Backend::Memory,
                other => {
                    return Err(TrackerError::Config(format!(
                        "unknown backend '{}', expected 'google' or 'memory'",
                        other
                    )));
                }
            };
        }
        settings.spreadsheet_id = get("TRACKER_SPREADSHEET_ID");
        if let Some(name) = get("TRACKER_SPREADSHEET_NAME") {
            settings.spreadsheet_name = name;
        }
        if let Some(path) = get("TRACKER_CREDENTIALS") {
            settings.credentials_file = PathBuf::from(path);
        }
        settings.service_account_json = get("TRACKER_SERVICE_ACCOUNT_JSON");
        settings.access_token = get("TRACKER_ACCESS_TOKEN");
        settings.user = get("TRACKER_USER")
            .or_else(|| get("USERNAME"))
            .or_else(|| get("USER"));
        if let Some(ms) = get("TRACKER_VERIFY_DELAY_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                TrackerError::Config(format!("TRACKER_VERIFY_DELAY_MS must be an integer, got '{}'", ms))
            })?;
            settings.verify_delay = Duration::from_millis(ms);
        }

        Ok(settings)
    }

    /// Pick the credential source: hosted secret first, then the local file,
    /// then a raw token
    pub fn credential_source(&self) -> TrackerResult<CredentialSource> {
        if let Some(json) = &self.service_account_json {
            return Ok(CredentialSource::Inline(json.clone()));
        }
        if self.credentials_file.exists() {
            return Ok(CredentialSource::File(self.credentials_file.clone()));
        }
        if let Some(token) = &self.access_token {
            return Ok(CredentialSource::AccessToken(token.clone()));
        }
        Err(TrackerError::Config(format!(
            "no credentials found: set TRACKER_SERVICE_ACCOUNT_JSON, add '{}', or set TRACKER_ACCESS_TOKEN",
            self.credentials_file.display()
        )))
    }

    /// Name recorded in the audit log when no user was picked in the UI
    pub fn acting_user(&self) -> String {
        self.user.clone().unwrap_or_else(|| UNKNOWN_USER.to_string())
    }
}
