//! Import pipeline
//!
//! Parse -> fetch schema -> validate -> populate store, with a progress
//! tick after every stage and after every imported day. Runs on a
//! background task and reports every outcome through the UI channel; a
//! failed stage aborts the run with an error notice and leaves no further
//! mutations behind (validation happens before the store is touched at
//! all).

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveTime;
use tracing::{info, warn};

use crate::error::{Result, ScheduleXmlError};
use crate::provider::SchemaProvider;
use crate::sink::{Notice, UiSender};
use crate::store::{PlaylistAssignment, PlaylistRole, ScheduleStore, Weekday, Zone, lock_store};
use crate::tree::{self, Element};
use crate::validator;

pub(crate) const IMPORT_ABORTED: &str = "Import aborted.";

pub struct Importer {
    store: Arc<Mutex<ScheduleStore>>,
    provider: Arc<SchemaProvider>,
    ui: UiSender,
    tick_delay: Option<Duration>,
}

impl Importer {
    pub fn new(
        store: Arc<Mutex<ScheduleStore>>,
        provider: Arc<SchemaProvider>,
        ui: UiSender,
        tick_delay: Option<Duration>,
    ) -> Self {
        Self {
            store,
            provider,
            ui,
            tick_delay,
        }
    }

    /// Run the full import pipeline. Nothing is returned to the caller:
    /// success, failure and progress all flow through the UI channel.
    pub async fn run(&self, path: &Path) {
        match self.execute(path).await {
            Ok(()) => {
                info!(path = %path.display(), "import finished");
                self.ui.finish(Some(path.to_path_buf()));
            }
            Err(e) => {
                warn!(error = %e, "import aborted");
                self.ui.notify(Notice::from_error(&e, IMPORT_ABORTED));
                self.ui.finish(None);
            }
        }
    }

    async fn execute(&self, path: &Path) -> Result<()> {
        let text = tokio::fs::read_to_string(path).await?;
        let root = tree::parse(&text)?;
        self.stage_done().await;

        // First operation of the session fetches; the rest reuse the
        // memoized result.
        let schema = self.provider.get().await;
        self.stage_done().await;

        match &schema {
            Some(schema) => {
                validator::validate(&root, schema).map_err(|failure| {
                    ScheduleXmlError::Validation {
                        detail: failure.detail,
                    }
                })?;
                info!("input document validated");
            }
            None => {
                warn!("validation of input won't be performed");
                if self.provider.take_skip_warning() {
                    self.ui
                        .notify(Notice::warning("Validation of input won't be performed."));
                }
            }
        }
        self.stage_done().await;

        for (day, day_element) in Weekday::ALL.iter().zip(&root.children) {
            for zone_element in &day_element.children {
                self.import_zone(*day, zone_element)?;
            }
            self.stage_done().await;
        }
        Ok(())
    }

    fn import_zone(&self, day: Weekday, element: &Element) -> Result<()> {
        let name = element
            .attr("Name")
            .ok_or_else(|| malformed("Zone element missing 'Name' attribute"))?;
        let start = element
            .attr("Start")
            .ok_or_else(|| malformed("Zone element missing 'Start' attribute"))?;

        // Every occurrence lands in the schedule; seconds are dropped.
        lock_store(&self.store).add_schedule_entry(day, truncate_to_minutes(start), name);

        // First-seen definition wins: all occurrences of a zone across the
        // week are assumed identical, so a known zone is not re-parsed.
        if lock_store(&self.store).zone_exists(name) {
            return Ok(());
        }

        let zone = Zone {
            name: name.to_string(),
            description: element.child_text("Description").unwrap_or_default().to_string(),
            maintainers: element.child_text("Maintainer").unwrap_or_default().to_string(),
            comments: element.child_text("Comment").unwrap_or_default().to_string(),
        };
        lock_store(&self.store).add_zone(zone);

        for child in &element.children {
            if let Some(role) = PlaylistRole::from_element_tag(&child.tag) {
                self.import_assignment(name, role, child)?;
            }
        }
        Ok(())
    }

    fn import_assignment(&self, zone: &str, role: PlaylistRole, element: &Element) -> Result<()> {
        let path = element
            .child_text("Path")
            .ok_or_else(|| malformed(format!("{} element missing 'Path' child", element.tag)))?;

        let playlist_name = {
            // New paths join the catalog; a known name keeps its first
            // definition.
            let (name, _) = lock_store(&self.store).add_playlist(path);
            name
        };

        let mut assignment = PlaylistAssignment::new(playlist_name, role);
        assignment.shuffle = element.child_text("Shuffle") == Some("true");
        if let Some(fader) = element.child("Fader") {
            assignment.fade_in_secs = fader
                .child_text("FadeInDurationSecs")
                .unwrap_or_default()
                .to_string();
            assignment.fade_out_secs = fader
                .child_text("FadeOutDurationSecs")
                .unwrap_or_default()
                .to_string();
            assignment.min_level = fader.child_text("MinLevel").unwrap_or_default().to_string();
            assignment.max_level = fader.child_text("MaxLevel").unwrap_or_default().to_string();
        }
        assignment.sched_interval_mins = element
            .child_text("SchedIntervalMins")
            .unwrap_or_default()
            .to_string();
        assignment.num_sched_items = element
            .child_text("NumSchedItems")
            .unwrap_or_default()
            .to_string();

        lock_store(&self.store).add_assignment(zone, assignment);
        Ok(())
    }

    async fn stage_done(&self) {
        self.ui.tick();
        if let Some(delay) = self.tick_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn malformed(details: impl Into<String>) -> ScheduleXmlError {
    ScheduleXmlError::MalformedDocument {
        details: details.into(),
    }
}

/// Truncate an xs:time value to minute precision.
fn truncate_to_minutes(start: &str) -> String {
    NaiveTime::parse_from_str(start, "%H:%M:%S%.f")
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|_| start.get(..5).unwrap_or(start).to_string())
}
