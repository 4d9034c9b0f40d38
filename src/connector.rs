use log::info;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::{Backend, CONNECTION_TTL, Settings};
use crate::error::{TrackerError, TrackerResult};
use crate::sheets::{GoogleSheets, MemorySheets, SheetStore};

/// An open spreadsheet plus the title of the worksheet holding the tasks
#[derive(Clone)]
pub struct SheetHandle {
    pub store: Arc<dyn SheetStore>,
    pub tasks_sheet: String,
}

enum Opener {
    Google(Settings),
    Fixed(Arc<dyn SheetStore>),
}

/// Lazily opened, time-limited spreadsheet connection
pub struct Connector {
    opener: Opener,
    ttl: Duration,
    cached: Mutex<Option<(SheetHandle, Instant)>>,
}

impl Connector {
    /// Connector for the backend named in `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.backend {
            Backend::Google => Self::new(Opener::Google(settings.clone())),
            Backend::Memory => Self::with_store(Arc::new(MemorySheets::new("Tarefas"))),
        }
    }

    /// Connector over an already open store
    pub fn with_store(store: Arc<dyn SheetStore>) -> Self {
        Self::new(Opener::Fixed(store))
    }

    fn new(opener: Opener) -> Self {
        Self {
            opener,
            ttl: Duration::from_secs(CONNECTION_TTL),
            cached: Mutex::new(None),
        }
    }

    /// The cached handle, reconnecting when it is missing or older than the TTL
    pub async fn handle(&self) -> TrackerResult<SheetHandle> {
        let mut cached = self.cached.lock().await;
        if let Some((handle, opened_at)) = cached.as_ref() {
            if opened_at.elapsed() < self.ttl {
                return Ok(handle.clone());
            }
        }

        let store: Arc<dyn SheetStore> = match &self.opener {
            Opener::Google(settings) => Arc::new(GoogleSheets::open(settings).await?),
            Opener::Fixed(store) => store.clone(),
        };
        let tasks_sheet = store
            .worksheet_titles()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::NotFound("Task worksheet".to_string()))?;
        info!("Connected; tasks live in worksheet '{}'", tasks_sheet);

        let handle = SheetHandle { store, tasks_sheet };
        *cached = Some((handle.clone(), Instant::now()));
        Ok(handle)
    }

    /// Forget the connection so the next call reopens it
    pub async fn clear_cache(&self) {
        *self.cached.lock().await = None;
        info!("Connection cache cleared");
    }
}
