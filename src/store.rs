//! In-memory Schedule Store
//!
//! Owns the four collections the rest of the system works against: the
//! zone database, the playlist catalog, the seven per-day schedule buckets,
//! and the per-zone playlist assignments. All import/export logic is
//! expressed purely in terms of this interface.
//!
//! Referential integrity is deliberately loose: schedule entries and
//! assignments hold names, not enforced foreign keys, and cascade behavior
//! lives in the remove/rename operations rather than in the collections
//! themselves.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Days of the week, in schedule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Three-letter element name used in the XML document.
    pub fn abbrev(self) -> &'static str {
        match self {
            Weekday::Monday => "Mon",
            Weekday::Tuesday => "Tue",
            Weekday::Wednesday => "Wed",
            Weekday::Thursday => "Thu",
            Weekday::Friday => "Fri",
            Weekday::Saturday => "Sat",
            Weekday::Sunday => "Sun",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Role of a playlist within a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaylistRole {
    Main,
    Fallback,
    Intermediate,
}

impl PlaylistRole {
    /// XML element tag for this role.
    pub fn element_tag(self) -> &'static str {
        match self {
            PlaylistRole::Main => "Main",
            PlaylistRole::Fallback => "Fallback",
            PlaylistRole::Intermediate => "Intermediate",
        }
    }

    pub fn from_element_tag(tag: &str) -> Option<Self> {
        match tag {
            "Main" => Some(PlaylistRole::Main),
            "Fallback" => Some(PlaylistRole::Fallback),
            "Intermediate" => Some(PlaylistRole::Intermediate),
            _ => None,
        }
    }
}

/// A named time slot with descriptive metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub description: String,
    pub maintainers: String,
    pub comments: String,
}

impl Zone {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A catalog playlist: a name derived from its source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub path: String,
}

/// One occurrence of a zone on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Start time in "HH:MM" form.
    pub start: String,
    /// Zone name; not an enforced reference.
    pub zone: String,
}

/// A role-tagged binding of a catalog playlist to a zone.
///
/// The numeric fields are kept as strings, like the document format:
/// empty means unset, and the schema bounds them on export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistAssignment {
    pub playlist: String,
    pub role: PlaylistRole,
    pub shuffle: bool,
    pub sched_interval_mins: String,
    pub num_sched_items: String,
    pub fade_in_secs: String,
    pub fade_out_secs: String,
    pub min_level: String,
    pub max_level: String,
}

impl PlaylistAssignment {
    pub fn new(playlist: impl Into<String>, role: PlaylistRole) -> Self {
        Self {
            playlist: playlist.into(),
            role,
            shuffle: false,
            sched_interval_mins: String::new(),
            num_sched_items: String::new(),
            fade_in_secs: String::new(),
            fade_out_secs: String::new(),
            min_level: String::new(),
            max_level: String::new(),
        }
    }
}

/// Derive a catalog name from a playlist path: base name up to the first
/// dot. Stable, and collision-prone across directories; the store makes
/// the collision outcome explicit (first entry wins).
pub fn playlist_name_from_path(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Lock a shared store, recovering the data if a previous holder panicked.
/// Each mutation made under one lock acquisition is atomic as observed
/// from the foreground.
pub fn lock_store(store: &Mutex<ScheduleStore>) -> MutexGuard<'_, ScheduleStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The owning collection of zones, playlists, schedule entries and
/// assignments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleStore {
    zones: BTreeMap<String, Zone>,
    playlists: BTreeMap<String, Playlist>,
    schedule: [Vec<ScheduleEntry>; 7],
    assignments: BTreeMap<String, Vec<PlaylistAssignment>>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Zones

    pub fn zone_exists(&self, name: &str) -> bool {
        self.zones.contains_key(name)
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.get(name)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Add a zone if its name is free. Returns whether it was added.
    pub fn add_zone(&mut self, zone: Zone) -> bool {
        if self.zones.contains_key(&zone.name) {
            return false;
        }
        self.assignments.entry(zone.name.clone()).or_default();
        self.zones.insert(zone.name.clone(), zone);
        true
    }

    /// Remove a zone. Cascades to every schedule entry referencing it and
    /// to its assignment set.
    pub fn remove_zone(&mut self, name: &str) -> bool {
        if self.zones.remove(name).is_none() {
            return false;
        }
        for bucket in &mut self.schedule {
            bucket.retain(|entry| entry.zone != name);
        }
        self.assignments.remove(name);
        true
    }

    /// Rename a zone in place. Cascades to schedule entries and to the
    /// assignment set's key. Fails if the old name is absent or the new
    /// name is taken.
    pub fn rename_zone(&mut self, old_name: &str, new_name: &str) -> bool {
        if old_name == new_name || self.zones.contains_key(new_name) {
            return false;
        }
        let Some(mut zone) = self.zones.remove(old_name) else {
            return false;
        };
        zone.name = new_name.to_string();
        self.zones.insert(new_name.to_string(), zone);

        for bucket in &mut self.schedule {
            for entry in bucket.iter_mut() {
                if entry.zone == old_name {
                    entry.zone = new_name.to_string();
                }
            }
        }
        let assignments = self.assignments.remove(old_name).unwrap_or_default();
        self.assignments.insert(new_name.to_string(), assignments);
        true
    }

    // Playlist catalog

    pub fn playlist_exists(&self, name: &str) -> bool {
        self.playlists.contains_key(name)
    }

    pub fn playlist(&self, name: &str) -> Option<&Playlist> {
        self.playlists.get(name)
    }

    pub fn playlists(&self) -> impl Iterator<Item = &Playlist> {
        self.playlists.values()
    }

    /// Derive the catalog name for `path` and insert if absent. Returns
    /// the name and whether a new entry was created; on a basename
    /// collision the existing entry wins.
    pub fn add_playlist(&mut self, path: &str) -> (String, bool) {
        let name = playlist_name_from_path(path);
        if self.playlists.contains_key(&name) {
            return (name, false);
        }
        self.playlists.insert(
            name.clone(),
            Playlist {
                name: name.clone(),
                path: path.to_string(),
            },
        );
        (name, true)
    }

    /// Remove a playlist from the catalog. Cascades to every assignment
    /// referencing it, in every zone.
    pub fn remove_playlist(&mut self, name: &str) -> bool {
        if self.playlists.remove(name).is_none() {
            return false;
        }
        for assignments in self.assignments.values_mut() {
            assignments.retain(|a| a.playlist != name);
        }
        true
    }

    // Schedule

    /// Add an occurrence of a zone to a day. Duplicates are expected and
    /// allowed; the bucket stays sorted ascending by start time.
    pub fn add_schedule_entry(&mut self, day: Weekday, start: impl Into<String>, zone: impl Into<String>) {
        let bucket = &mut self.schedule[day.index()];
        bucket.push(ScheduleEntry {
            start: start.into(),
            zone: zone.into(),
        });
        bucket.sort_by(|a, b| a.start.cmp(&b.start));
    }

    pub fn remove_schedule_entry(&mut self, day: Weekday, index: usize) -> Option<ScheduleEntry> {
        let bucket = &mut self.schedule[day.index()];
        if index < bucket.len() {
            Some(bucket.remove(index))
        } else {
            None
        }
    }

    pub fn entries(&self, day: Weekday) -> &[ScheduleEntry] {
        &self.schedule[day.index()]
    }

    // Assignments

    pub fn add_assignment(&mut self, zone: &str, assignment: PlaylistAssignment) {
        self.assignments
            .entry(zone.to_string())
            .or_default()
            .push(assignment);
    }

    pub fn remove_assignment(&mut self, zone: &str, index: usize) -> Option<PlaylistAssignment> {
        let assignments = self.assignments.get_mut(zone)?;
        if index < assignments.len() {
            Some(assignments.remove(index))
        } else {
            None
        }
    }

    pub fn assignments(&self, zone: &str) -> &[PlaylistAssignment] {
        self.assignments
            .get(zone)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First Main assignment of a zone, if any.
    pub fn main_assignment(&self, zone: &str) -> Option<&PlaylistAssignment> {
        self.assignments(zone)
            .iter()
            .find(|a| a.role == PlaylistRole::Main)
    }

    /// First Fallback assignment of a zone, if any.
    pub fn fallback_assignment(&self, zone: &str) -> Option<&PlaylistAssignment> {
        self.assignments(zone)
            .iter()
            .find(|a| a.role == PlaylistRole::Fallback)
    }

    /// All Intermediate assignments of a zone, in insertion order.
    pub fn intermediate_assignments(&self, zone: &str) -> impl Iterator<Item = &PlaylistAssignment> {
        self.assignments(zone)
            .iter()
            .filter(|a| a.role == PlaylistRole::Intermediate)
    }

    /// Attach the well-known default playlists to a zone, for each one
    /// present in the catalog.
    pub fn add_default_assignments(&mut self, zone: &str) {
        if self.playlist_exists("fallback") {
            let mut fallback = PlaylistAssignment::new("fallback", PlaylistRole::Fallback);
            fallback.shuffle = true;
            fallback.fade_in_secs = "2".to_string();
            fallback.fade_out_secs = "2".to_string();
            fallback.min_level = "0".to_string();
            fallback.max_level = "1".to_string();
            self.add_assignment(zone, fallback);
        }
        if self.playlist_exists("Spots") {
            let mut spots = PlaylistAssignment::new("Spots", PlaylistRole::Intermediate);
            spots.shuffle = true;
            spots.sched_interval_mins = "70".to_string();
            spots.num_sched_items = "1".to_string();
            self.add_assignment(zone, spots);
        }
        if self.playlist_exists("Jingles") {
            let mut jingles = PlaylistAssignment::new("Jingles", PlaylistRole::Intermediate);
            jingles.shuffle = true;
            jingles.sched_interval_mins = "40".to_string();
            jingles.num_sched_items = "1".to_string();
            self.add_assignment(zone, jingles);
        }
    }
}
