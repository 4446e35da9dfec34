//! Pipeline orchestration
//!
//! The engine owns everything the pipelines share: the store handle, the
//! memoized schema provider, the UI channel's sending half, and an
//! operation lock that makes "one import or export at a time" an explicit
//! invariant instead of an accident of modal dialogs. `spawn_import` and
//! `spawn_export` start fire-and-forget background tasks; once started, a
//! run proceeds to completion or to its first hard failure, with no
//! cancellation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::export::Exporter;
use crate::import::Importer;
use crate::provider::{DEFAULT_FETCH_TIMEOUT, SCHEMA_URL, SchemaProvider};
use crate::sink::{UiEvent, UiSender};
use crate::store::ScheduleStore;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Remote schema location tried before the embedded fallback.
    pub schema_url: String,
    /// Bound on the remote schema fetch.
    pub fetch_timeout: Duration,
    /// Optional pause after each progress tick, purely so a human can see
    /// the bar move. Off by default.
    pub tick_delay: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_url: SCHEMA_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            tick_delay: None,
        }
    }
}

/// Shared owner of the store, schema provider and UI channel.
pub struct ScheduleEngine {
    store: Arc<Mutex<ScheduleStore>>,
    provider: Arc<SchemaProvider>,
    operation: Arc<tokio::sync::Mutex<()>>,
    ui: UiSender,
    tick_delay: Option<Duration>,
}

impl ScheduleEngine {
    /// Create an engine with a fresh empty store. Returns the receiving
    /// half of the UI channel for the foreground to drain.
    pub fn new(config: EngineConfig) -> (Self, UnboundedReceiver<UiEvent>) {
        Self::with_store(config, ScheduleStore::new())
    }

    /// Create an engine around an existing store.
    pub fn with_store(
        config: EngineConfig,
        store: ScheduleStore,
    ) -> (Self, UnboundedReceiver<UiEvent>) {
        let (ui, rx) = UiSender::channel();
        let provider = Arc::new(SchemaProvider::new(config.schema_url, config.fetch_timeout));
        (
            Self {
                store: Arc::new(Mutex::new(store)),
                provider,
                operation: Arc::new(tokio::sync::Mutex::new(())),
                ui,
                tick_delay: config.tick_delay,
            },
            rx,
        )
    }

    /// Shared handle to the store, for the embedding frontend.
    pub fn store(&self) -> Arc<Mutex<ScheduleStore>> {
        Arc::clone(&self.store)
    }

    /// Start a background import of `path`. Fire and forget: all outcomes
    /// arrive on the UI channel. The handle is joinable for embedders that
    /// want to await completion.
    pub fn spawn_import(&self, path: impl Into<PathBuf>) -> JoinHandle<()> {
        let importer = Importer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            self.ui.clone(),
            self.tick_delay,
        );
        let operation = Arc::clone(&self.operation);
        let path = path.into();
        tokio::spawn(async move {
            // One operation at a time; a second spawn queues here.
            let _running = operation.lock().await;
            importer.run(&path).await;
        })
    }

    /// Start a background export to `path`. Same contract as
    /// [`Self::spawn_import`].
    pub fn spawn_export(&self, path: impl Into<PathBuf>) -> JoinHandle<()> {
        let exporter = Exporter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            self.ui.clone(),
            self.tick_delay,
        );
        let operation = Arc::clone(&self.operation);
        let path = path.into();
        tokio::spawn(async move {
            let _running = operation.lock().await;
            exporter.run(&path).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Weekday, Zone, lock_store};
    use std::io::Write;

    fn offline_config() -> EngineConfig {
        EngineConfig {
            schema_url: "http://127.0.0.1:1/schema.xsd".to_string(),
            fetch_timeout: Duration::from_millis(200),
            tick_delay: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_operations_serialize() {
        let mut doc = tempfile::NamedTempFile::new().unwrap();
        doc.write_all(
            br#"<WeekSchedule><Mon><Zone Name="A" Start="08:00:00"><Main><Path>/x/a.m3u</Path><Shuffle>true</Shuffle></Main></Zone></Mon><Tue/><Wed/><Thu/><Fri/><Sat/><Sun/></WeekSchedule>"#,
        )
        .unwrap();
        doc.flush().unwrap();
        let out = tempfile::NamedTempFile::new().unwrap();

        let (engine, mut rx) = ScheduleEngine::new(offline_config());
        let import = engine.spawn_import(doc.path());
        let export = engine.spawn_export(out.path());
        import.await.unwrap();
        export.await.unwrap();

        // Two runs, two Finish events, and the export saw the imported
        // data because the operation lock ordered them.
        let mut finishes = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, UiEvent::Finish { .. }) {
                finishes += 1;
            }
        }
        assert_eq!(finishes, 2);

        let exported = std::fs::read_to_string(out.path()).unwrap();
        assert!(exported.contains(r#"Name="A""#));
    }

    #[tokio::test]
    async fn test_with_store_shares_data() {
        let mut store = ScheduleStore::new();
        store.add_zone(Zone::named("Prefilled"));
        store.add_schedule_entry(Weekday::Sunday, "20:00", "Prefilled");

        let (engine, _rx) = ScheduleEngine::with_store(offline_config(), store);
        let handle = engine.store();
        assert!(lock_store(&handle).zone_exists("Prefilled"));
    }
}
