#![cfg(feature = "web")]
use axum::{
    Form, Json, Router,
    extract::{Path, RawQuery, State, rejection::FormRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Duration;
use handlebars::Handlebars;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::audit::{LogFilter, distinct};
use crate::board::{BoardFilter, PROGRESS_STEP, build_board};
use crate::config::{Backend, CredentialSource, DEVELOPERS, Settings};
use crate::connector::Connector;
use crate::dashboard::{self, UPCOMING_DAYS};
use crate::downloader;
use crate::error::{TrackerError, TrackerResult};
use crate::graph::{self, ChartOptions};
use crate::session::{self, with_flash};
use crate::store::{SavePath, TaskStore, today, validate_structure};
use crate::task::{DATE_FORMAT, MIN_TITLE_LEN, Priority, Stage, Task, TaskDraft, TaskKind};

/// Per-process cache of what the pages show
#[derive(Default)]
struct SessionCache {
    tasks: Option<Vec<Task>>,
    last_created: Option<Task>,
    notice: Option<String>,
}

pub struct AppState {
    store: TaskStore,
    settings: Settings,
    session: Mutex<SessionCache>,
    templates: Handlebars<'static>,
}

impl AppState {
    /// State for the backend named in `settings`
    pub fn new(settings: Settings) -> TrackerResult<Self> {
        let store = TaskStore::new(Connector::from_settings(&settings))
            .with_verify_delay(settings.verify_delay);
        Self::with_store(settings, store)
    }

    /// State over an already built store
    pub fn with_store(settings: Settings, store: TaskStore) -> TrackerResult<Self> {
        Ok(Self {
            store,
            settings,
            session: Mutex::new(SessionCache::default()),
            templates: templates()?,
        })
    }

    /// Cached task list, loading it from the sheet on first use
    async fn tasks(&self) -> TrackerResult<Vec<Task>> {
        let mut session = self.session.lock().await;
        Ok(self.ensure_loaded(&mut session).await?.clone())
    }

    async fn ensure_loaded<'s>(&self, session: &'s mut SessionCache) -> TrackerResult<&'s mut Vec<Task>> {
        if session.tasks.is_none() {
            let outcome = self.store.load_tasks().await?;
            if let Some(reason) = outcome.reset {
                session.notice = Some(format!("Sheet reinitialised with sample data ({})", reason));
            }
            session.tasks = Some(outcome.tasks);
        }
        Ok(session.tasks.get_or_insert_with(Vec::new))
    }

    async fn invalidate(&self) {
        self.session.lock().await.tasks = None;
    }

    /// Tasks for a page; a load failure becomes an empty list plus its message
    async fn tasks_or_error(&self) -> (Vec<Task>, Option<String>) {
        match self.tasks().await {
            Ok(tasks) => (tasks, None),
            Err(e) => {
                error!("Failed to load tasks: {}", e);
                (Vec::new(), Some(format!("Could not load tasks: {}", e)))
            }
        }
    }

    async fn take_notice(&self) -> Option<String> {
        self.session.lock().await.notice.take()
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Response {
        match self.templates.render(name, data) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!("Failed to render '{}': {}", name, e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Template error: {}", e)).into_response()
            }
        }
    }
}

fn templates() -> TrackerResult<Handlebars<'static>> {
    let mut hb = Handlebars::new();
    let sources = [
        ("header", include_str!("./static/header.hbs")),
        ("footer", include_str!("./static/footer.hbs")),
        ("dashboard", include_str!("./static/dashboard.hbs")),
        ("kanban", include_str!("./static/kanban.hbs")),
        ("new_task", include_str!("./static/new_task.hbs")),
        ("history", include_str!("./static/history.hbs")),
        ("settings", include_str!("./static/settings.hbs")),
    ];
    for (name, source) in sources {
        hb.register_template_string(name, source)
            .map_err(|e| TrackerError::Template(e.to_string()))?;
    }
    Ok(hb)
}

/// Build the router with every page, form and download
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/refresh", post(handle_refresh))
        .route("/kanban", get(serve_kanban))
        .route("/kanban/:id", post(handle_move))
        .route("/tasks/new", get(serve_new_task))
        .route("/tasks", post(handle_create))
        .route("/history", get(serve_history))
        .route("/history.csv", get(download_history))
        .route("/settings", get(serve_settings))
        .route("/settings/reload", post(handle_reload))
        .route("/settings/clear-cache", post(handle_clear_cache))
        .route("/user", post(session::handle_choose_user))
        .route("/export.csv", get(download_csv))
        .route("/export.xlsx", get(download_xlsx))
        .route("/charts/workload.png", get(workload_png))
        .route("/charts/types.png", get(types_png))
        .route("/api/tasks", get(api_tasks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let bind = settings.bind.clone();
    let app_state = Arc::new(AppState::new(settings)?);
    let app = router(app_state);

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Decoded `key=value` pairs of a query string, keeping repeated keys
fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    fn decode(s: &str) -> String {
        let s = s.replace('+', " ");
        urlencoding::decode(&s)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| s.clone())
    }

    raw.unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect()
}

fn values(pairs: &[(String, String)], key: &str) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, v)| k == key && !v.trim().is_empty())
        .map(|(_, v)| v.clone())
        .collect()
}

fn first(pairs: &[(String, String)], key: &str) -> Option<String> {
    values(pairs, key).into_iter().next()
}

/// Query string without the flash keys, to rebuild links and redirects
fn filter_query(pairs: &[(String, String)]) -> String {
    let kept: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k != "error" && k != "notice")
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    if kept.is_empty() {
        String::new()
    } else {
        format!("?{}", kept.join("&"))
    }
}

#[derive(Serialize)]
struct Choice {
    value: String,
    selected: bool,
}

fn choices<I, S>(options: I, picked: &[String]) -> Vec<Choice>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    options
        .into_iter()
        .map(|o| {
            let value = o.into();
            let selected = picked.contains(&value);
            Choice { value, selected }
        })
        .collect()
}

/// Shared header data: navigation, user picker and flash messages
async fn layout(
    state: &AppState,
    jar: &CookieJar,
    title: &str,
    active: &str,
    path: &str,
    pairs: &[(String, String)],
    load_error: Option<String>,
) -> serde_json::Value {
    let notice = match first(pairs, "notice") {
        Some(notice) => Some(notice),
        None => state.take_notice().await,
    };
    json!({
        "title": title,
        "active": active,
        "path": path,
        "user": session::current_user(jar, &state.settings),
        "developers": DEVELOPERS,
        "error": first(pairs, "error").or(load_error),
        "notice": notice,
    })
}

fn fail(path: &str, e: &TrackerError) -> Redirect {
    Redirect::to(&with_flash(path, "error", &e.to_string()))
}

/// Serve the dashboard page
async fn serve_dashboard(State(state): State<Arc<AppState>>, jar: CookieJar, RawQuery(query): RawQuery) -> Response {
    let pairs = query_pairs(query.as_deref());
    let (tasks, load_error) = state.tasks_or_error().await;
    let today = today();

    let upcoming: Vec<serde_json::Value> = dashboard::upcoming(&tasks, today)
        .into_iter()
        .map(|t| json!({ "task": t, "days": t.days_remaining(today) }))
        .collect();
    let workload: Vec<serde_json::Value> = dashboard::workload(&tasks)
        .into_iter()
        .map(|w| json!({ "assignee": w.assignee, "per_stage": w.per_stage, "total": w.total() }))
        .collect();
    let types: Vec<serde_json::Value> = dashboard::type_distribution(&tasks)
        .into_iter()
        .map(|(kind, count)| json!({ "kind": kind, "count": count }))
        .collect();

    let data = json!({
        "layout": layout(&state, &jar, "Dashboard", "dashboard", "/", &pairs, load_error).await,
        "metrics": dashboard::metrics(&tasks, today),
        "high_priority": dashboard::high_priority(&tasks),
        "upcoming": upcoming,
        "upcoming_days": UPCOMING_DAYS,
        "stages": Stage::ALL.map(Stage::label),
        "workload": workload,
        "types": types,
        "tasks": tasks,
    });
    state.render("dashboard", &data)
}

/// Drop the cached tasks and go back to the dashboard
async fn handle_refresh(State(state): State<Arc<AppState>>) -> Redirect {
    state.invalidate().await;
    Redirect::to("/?notice=Data+reloaded")
}

fn board_filter(pairs: &[(String, String)]) -> BoardFilter {
    BoardFilter {
        assignees: values(pairs, "assignee"),
        kinds: values(pairs, "kind")
            .iter()
            .filter_map(|v| TaskKind::from_label(v))
            .collect(),
        priorities: values(pairs, "priority")
            .iter()
            .filter_map(|v| Priority::from_label(v))
            .collect(),
    }
}

/// Serve the Kanban board
async fn serve_kanban(State(state): State<Arc<AppState>>, jar: CookieJar, RawQuery(query): RawQuery) -> Response {
    let pairs = query_pairs(query.as_deref());
    let (tasks, load_error) = state.tasks_or_error().await;
    let filter = board_filter(&pairs);
    let path = format!("/kanban{}", filter_query(&pairs));

    let picked_assignees = values(&pairs, "assignee");
    let picked_kinds = values(&pairs, "kind");
    let picked_priorities = values(&pairs, "priority");

    let data = json!({
        "layout": layout(&state, &jar, "Kanban", "kanban", &path, &pairs, load_error).await,
        "path": path,
        "progress_step": PROGRESS_STEP,
        "filters": {
            "assignees": choices(DEVELOPERS, &picked_assignees),
            "kinds": choices(TaskKind::ALL.map(TaskKind::label), &picked_kinds),
            "priorities": choices(Priority::ALL.map(Priority::label), &picked_priorities),
        },
        "columns": build_board(&tasks, &filter, today()),
    });
    state.render("kanban", &data)
}

#[derive(Deserialize)]
struct MoveForm {
    status: Stage,
    progress: u8,
    #[serde(default)]
    back: Option<String>,
}

/// Handle a card edit from the board
async fn handle_move(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<u32>,
    form: Result<Form<MoveForm>, FormRejection>,
) -> Redirect {
    let Form(form) = match form {
        Ok(form) => form,
        Err(e) => return Redirect::to(&with_flash("/kanban", "error", &format!("Invalid form: {}", e))),
    };
    let back = form
        .back
        .filter(|b| b.starts_with("/kanban"))
        .unwrap_or_else(|| "/kanban".to_string());
    let user = session::current_user(&jar, &state.settings);

    let mut session = state.session.lock().await;
    let result = match state.ensure_loaded(&mut session).await {
        Ok(cache) => {
            state
                .store
                .move_task(id, form.status, form.progress.min(100), cache, &user)
                .await
        }
        Err(e) => Err(e),
    };
    drop(session);

    match result {
        Ok(outcome) => {
            let mut message = format!("Task #{} updated", id);
            if outcome.auto_completed {
                message.push_str(" and completed");
            }
            if outcome.path == SavePath::FullRewrite {
                message.push_str(" (sheet rewritten)");
            }
            Redirect::to(&with_flash(&back, "notice", &message))
        }
        Err(e) => {
            warn!("Move of task #{} failed: {}", id, e);
            fail(&back, &e)
        }
    }
}

/// Serve the creation form with the last created task
async fn serve_new_task(State(state): State<Arc<AppState>>, jar: CookieJar, RawQuery(query): RawQuery) -> Response {
    let pairs = query_pairs(query.as_deref());
    let today = today();
    let last_created = state.session.lock().await.last_created.clone();
    let (tasks, load_error) = state.tasks_or_error().await;

    let data = json!({
        "layout": layout(&state, &jar, "Nova tarefa", "new", "/tasks/new", &pairs, load_error).await,
        "metrics": dashboard::metrics(&tasks, today),
        "next_id": dashboard::next_free_id(&tasks),
        "min_title_len": MIN_TITLE_LEN,
        "developers": DEVELOPERS,
        "kinds": TaskKind::ALL.map(TaskKind::label),
        "priorities": Priority::ALL.map(Priority::label),
        "stages": Stage::ALL.map(Stage::label),
        "today": today.format(DATE_FORMAT).to_string(),
        "default_due": (today + Duration::days(7)).format(DATE_FORMAT).to_string(),
        "last_created": last_created,
    });
    state.render("new_task", &data)
}

/// Handle the creation form
async fn handle_create(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    form: Result<Form<TaskDraft>, FormRejection>,
) -> Redirect {
    let Form(draft) = match form {
        Ok(form) => form,
        Err(e) => return Redirect::to(&with_flash("/tasks/new", "error", &format!("Invalid form: {}", e))),
    };
    let user = session::current_user(&jar, &state.settings);

    let mut session = state.session.lock().await;
    let result = match state.ensure_loaded(&mut session).await {
        Ok(cache) => state.store.create_task(draft, cache, &user).await,
        Err(e) => Err(e),
    };

    match result {
        Ok((task, path)) => {
            let message = match path {
                SavePath::Incremental => format!("Task #{} created", task.id),
                SavePath::FullRewrite => format!("Task #{} created (sheet rewritten)", task.id),
            };
            session.last_created = Some(task);
            Redirect::to(&with_flash("/tasks/new", "notice", &message))
        }
        Err(e) => {
            warn!("Task creation failed: {}", e);
            fail("/tasks/new", &e)
        }
    }
}

fn log_filter(pairs: &[(String, String)]) -> LogFilter {
    LogFilter {
        task_id: first(pairs, "task_id"),
        actions: values(pairs, "action"),
        users: values(pairs, "user"),
        fields: values(pairs, "field"),
    }
}

/// Serve the audit log page
async fn serve_history(State(state): State<Arc<AppState>>, jar: CookieJar, RawQuery(query): RawQuery) -> Response {
    let pairs = query_pairs(query.as_deref());
    let filter = log_filter(&pairs);

    let (entries, load_error) = match state.store.log_entries().await {
        Ok(entries) => (entries, None),
        Err(e) => {
            error!("Failed to read the log: {}", e);
            (Vec::new(), Some(format!("Could not read the history: {}", e)))
        }
    };
    let total = entries.len();
    let pickers = json!({
        "actions": choices(distinct(&entries, |e| &e.action), &filter.actions),
        "users": choices(distinct(&entries, |e| &e.user), &filter.users),
        "fields": choices(distinct(&entries, |e| &e.field), &filter.fields),
    });
    let task_id = filter.task_id.clone().unwrap_or_default();
    let shown = filter.apply(entries);

    let query = filter_query(&pairs);
    let path = format!("/history{}", query);
    let data = json!({
        "layout": layout(&state, &jar, "Histórico", "history", &path, &pairs, load_error).await,
        "task_id": task_id,
        "pickers": pickers,
        "query": query,
        "total": total,
        "shown": shown.len(),
        "entries": shown,
    });
    state.render("history", &data)
}

fn attachment(content_type: &'static str, filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        body,
    )
        .into_response()
}

fn download_failed(e: TrackerError) -> Response {
    error!("Download failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
}

/// Filtered audit log as CSV
async fn download_history(State(state): State<Arc<AppState>>, RawQuery(query): RawQuery) -> Response {
    let pairs = query_pairs(query.as_deref());
    match state.store.log_entries().await {
        Ok(entries) => {
            let csv = downloader::log_to_csv(&log_filter(&pairs).apply(entries));
            attachment("text/csv; charset=utf-8", "historico.csv", csv.into_bytes())
        }
        Err(e) => download_failed(e),
    }
}

#[derive(Serialize)]
struct ConnectionInfo {
    backend: &'static str,
    spreadsheet: String,
    credentials: &'static str,
    tasks_sheet: Option<String>,
    connected: bool,
    failure: Option<String>,
}

/// Serve the settings page: connection, structure and statistics
async fn serve_settings(State(state): State<Arc<AppState>>, jar: CookieJar, RawQuery(query): RawQuery) -> Response {
    let pairs = query_pairs(query.as_deref());
    let settings = &state.settings;

    let credentials = match (settings.backend, settings.credential_source()) {
        (Backend::Memory, _) => "not needed",
        (_, Ok(CredentialSource::Inline(_))) => "hosted secret",
        (_, Ok(CredentialSource::File(_))) => "credentials file",
        (_, Ok(CredentialSource::AccessToken(_))) => "access token",
        (_, Err(_)) => "missing",
    };
    let mut connection = ConnectionInfo {
        backend: match settings.backend {
            Backend::Google => "Google Sheets",
            Backend::Memory => "memory",
        },
        spreadsheet: settings
            .spreadsheet_id
            .clone()
            .unwrap_or_else(|| settings.spreadsheet_name.clone()),
        credentials,
        tasks_sheet: None,
        connected: false,
        failure: None,
    };
    match state.store.connector().handle().await {
        Ok(handle) => {
            connection.tasks_sheet = Some(handle.tasks_sheet);
            connection.connected = true;
        }
        Err(e) => connection.failure = Some(e.to_string()),
    }

    let headers = if connection.connected {
        state.store.headers().await.unwrap_or_else(|e| {
            warn!("Could not read the header row: {}", e);
            Vec::new()
        })
    } else {
        Vec::new()
    };
    let (valid, missing) = validate_structure(&headers);
    let (tasks, load_error) = state.tasks_or_error().await;

    let data = json!({
        "layout": layout(&state, &jar, "Configurações", "settings", "/settings", &pairs, load_error).await,
        "connection": connection,
        "structure": { "valid": valid, "missing": missing, "headers": headers },
        "stats": dashboard::system_stats(&tasks),
    });
    state.render("settings", &data)
}

/// Reload the task list from the sheet
async fn handle_reload(State(state): State<Arc<AppState>>) -> Redirect {
    state.invalidate().await;
    match state.tasks().await {
        Ok(tasks) => Redirect::to(&with_flash(
            "/settings",
            "notice",
            &format!("Reloaded {} tasks", tasks.len()),
        )),
        Err(e) => fail("/settings", &e),
    }
}

/// Drop the connection and the cached tasks
async fn handle_clear_cache(State(state): State<Arc<AppState>>) -> Redirect {
    state.store.connector().clear_cache().await;
    state.invalidate().await;
    Redirect::to("/settings?notice=Cache+cleared")
}

async fn download_csv(State(state): State<Arc<AppState>>) -> Response {
    match state.tasks().await {
        Ok(tasks) => attachment(
            "text/csv; charset=utf-8",
            "tarefas.csv",
            downloader::tasks_to_csv(&tasks).into_bytes(),
        ),
        Err(e) => download_failed(e),
    }
}

async fn download_xlsx(State(state): State<Arc<AppState>>) -> Response {
    let result = match state.tasks().await {
        Ok(tasks) => downloader::tasks_to_xlsx(&tasks),
        Err(e) => Err(e),
    };
    match result {
        Ok(bytes) => attachment(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "tarefas.xlsx",
            bytes,
        ),
        Err(e) => download_failed(e),
    }
}

fn png(result: TrackerResult<Vec<u8>>) -> Response {
    match result {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => download_failed(e),
    }
}

async fn workload_png(State(state): State<Arc<AppState>>) -> Response {
    let options = ChartOptions {
        title: "Carga de trabalho por responsável".to_string(),
        ..ChartOptions::default()
    };
    png(match state.tasks().await {
        Ok(tasks) => graph::workload_chart(&dashboard::workload(&tasks), &options),
        Err(e) => Err(e),
    })
}

async fn types_png(State(state): State<Arc<AppState>>) -> Response {
    let options = ChartOptions {
        title: "Distribuição por tipo".to_string(),
        ..ChartOptions::default()
    };
    png(match state.tasks().await {
        Ok(tasks) => graph::type_chart(&dashboard::type_distribution(&tasks), &options),
        Err(e) => Err(e),
    })
}

/// Cached tasks as JSON
async fn api_tasks(State(state): State<Arc<AppState>>) -> Response {
    match state.tasks().await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}
