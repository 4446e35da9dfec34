//! Export pipeline
//!
//! Build the seven-day document from the store -> prune empty optional
//! elements -> fetch schema -> validate -> serialize to disk, with a
//! progress tick per day and per remaining stage. A validation failure
//! aborts before anything is written; the store is never mutated.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, ScheduleXmlError};
use crate::provider::SchemaProvider;
use crate::sink::{Notice, UiSender};
use crate::store::{PlaylistAssignment, PlaylistRole, ScheduleEntry, ScheduleStore, Weekday, lock_store};
use crate::tree::{self, Element};
use crate::validator;

pub(crate) const EXPORT_ABORTED: &str = "Export aborted.";

pub struct Exporter {
    store: Arc<Mutex<ScheduleStore>>,
    provider: Arc<SchemaProvider>,
    ui: UiSender,
    tick_delay: Option<Duration>,
}

impl Exporter {
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

    /// Run the full export pipeline, reporting through the UI channel.
    pub async fn run(&self, path: &Path) {
        match self.execute(path).await {
            Ok(()) => {
                info!(path = %path.display(), "export finished");
                self.ui.finish(None);
            }
            Err(e) => {
                warn!(error = %e, "export aborted");
                self.ui.notify(Notice::from_error(&e, EXPORT_ABORTED));
                self.ui.finish(None);
            }
        }
    }

    async fn execute(&self, path: &Path) -> Result<()> {
        let mut root = Element::new("WeekSchedule");
        for day in Weekday::ALL {
            let mut day_element = Element::new(day.abbrev());
            {
                let store = lock_store(&self.store);
                for entry in store.entries(day) {
                    day_element.children.push(build_zone(&store, entry)?);
                }
            }
            root.children.push(day_element);
            self.stage_done().await;
        }

        // Optional elements with no data must not appear as malformed
        // empty tags. The fixed seven-day skeleton stays in place.
        for day_element in &mut root.children {
            day_element.prune_empty();
        }

        let schema = self.provider.get().await;
        self.stage_done().await;

        match &schema {
            Some(schema) => {
                validator::validate(&root, schema).map_err(|failure| {
                    ScheduleXmlError::Validation {
                        detail: failure.detail,
                    }
                })?;
                info!("output document validated");
            }
            None => {
                warn!("validation of output won't be performed");
                if self.provider.take_skip_warning() {
                    self.ui
                        .notify(Notice::warning("Validation of output won't be performed."));
                }
            }
        }
        self.stage_done().await;

        let xml = tree::to_pretty_xml(&root)?;
        tokio::fs::write(path, xml.as_bytes()).await?;
        self.ui.notify(Notice::info("Export successful."));
        self.stage_done().await;
        Ok(())
    }

    async fn stage_done(&self) {
        self.ui.tick();
        if let Some(delay) = self.tick_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn build_zone(store: &ScheduleStore, entry: &ScheduleEntry) -> Result<Element> {
    let zone = store.zone(&entry.zone).ok_or_else(|| {
        ScheduleXmlError::InconsistentStore {
            details: format!("schedule references unknown zone '{}'", entry.zone),
        }
    })?;

    let mut element = Element::new("Zone");
    element.set_attr("Name", &zone.name);
    element.set_attr("Start", format!("{}:00", entry.start));
    element.add_text_child("Maintainer", &zone.maintainers);
    element.add_text_child("Description", &zone.description);
    element.add_text_child("Comment", &zone.comments);

    // Fixed element order: one Main, at most one Fallback, then every
    // Intermediate.
    if let Some(main) = store.main_assignment(&zone.name) {
        element.children.push(build_assignment(store, main)?);
    }
    if let Some(fallback) = store.fallback_assignment(&zone.name) {
        element.children.push(build_assignment(store, fallback)?);
    }
    for intermediate in store.intermediate_assignments(&zone.name) {
        element.children.push(build_assignment(store, intermediate)?);
    }
    Ok(element)
}

fn build_assignment(store: &ScheduleStore, assignment: &PlaylistAssignment) -> Result<Element> {
    let playlist = store.playlist(&assignment.playlist).ok_or_else(|| {
        ScheduleXmlError::InconsistentStore {
            details: format!(
                "assignment references unknown playlist '{}'",
                assignment.playlist
            ),
        }
    })?;

    let mut element = Element::new(assignment.role.element_tag());
    if assignment.role == PlaylistRole::Intermediate {
        element.set_attr("Name", &assignment.playlist);
    }
    element.add_text_child("Path", &playlist.path);
    element.add_text_child("Shuffle", if assignment.shuffle { "true" } else { "false" });

    let mut fader = Element::new("Fader");
    fader.add_text_child("FadeInDurationSecs", &assignment.fade_in_secs);
    fader.add_text_child("FadeOutDurationSecs", &assignment.fade_out_secs);
    fader.add_text_child("MinLevel", &assignment.min_level);
    fader.add_text_child("MaxLevel", &assignment.max_level);
    element.children.push(fader);

    // Unset scheduling fields are emitted empty and pruned away; the
    // schema requires them only for Intermediate playlists.
    element.add_text_child("SchedIntervalMins", &assignment.sched_interval_mins);
    element.add_text_child("NumSchedItems", &assignment.num_sched_items);
    Ok(element)
}
