//! End-to-end pipeline tests: export/import round trips through real files
//! with the embedded schema standing in for the unreachable remote.

use std::io::Write;
use std::time::Duration;

use tempfile::{NamedTempFile, TempDir};

use flow_schedule::sink::{NoticeLevel, UiEvent};
use flow_schedule::store::{
    PlaylistAssignment, PlaylistRole, ScheduleStore, Weekday, Zone, lock_store,
};
use flow_schedule::{EngineConfig, ScheduleEngine, tree};

/// Connection-refused URL so every test exercises the embedded fallback.
fn offline_config() -> EngineConfig {
    EngineConfig {
        schema_url: "http://127.0.0.1:1/schema.xsd".to_string(),
        fetch_timeout: Duration::from_millis(300),
        tick_delay: None,
    }
}

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn collect_events(rx: &mut tokio::sync::mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A store exercising every field the format carries: metadata, all three
/// roles, fades, scheduling parameters, duplicate occurrences, empty days.
fn full_store() -> ScheduleStore {
    let mut store = ScheduleStore::new();
    store.add_playlist("/srv/playlists/jazz.m3u");
    store.add_playlist("/srv/playlists/fallback.m3u");
    store.add_playlist("/srv/playlists/spots.m3u");
    store.add_playlist("/srv/playlists/night.m3u");

    store.add_zone(Zone {
        name: "Morning Show".to_string(),
        description: "Wake-up programme".to_string(),
        maintainers: "ops team".to_string(),
        comments: "rotate hosts weekly".to_string(),
    });
    let mut main = PlaylistAssignment::new("jazz", PlaylistRole::Main);
    main.shuffle = true;
    main.fade_in_secs = "2".to_string();
    main.fade_out_secs = "3".to_string();
    main.min_level = "0.1".to_string();
    main.max_level = "0.9".to_string();
    store.add_assignment("Morning Show", main);

    let mut fallback = PlaylistAssignment::new("fallback", PlaylistRole::Fallback);
    fallback.shuffle = true;
    store.add_assignment("Morning Show", fallback);

    let mut spots = PlaylistAssignment::new("spots", PlaylistRole::Intermediate);
    spots.shuffle = false;
    spots.sched_interval_mins = "30".to_string();
    spots.num_sched_items = "2".to_string();
    store.add_assignment("Morning Show", spots);

    store.add_zone(Zone::named("Night Owl"));
    let mut night = PlaylistAssignment::new("night", PlaylistRole::Main);
    night.shuffle = false;
    store.add_assignment("Night Owl", night);

    // The same zone occurs on several days, twice on Monday.
    store.add_schedule_entry(Weekday::Monday, "08:00", "Morning Show");
    store.add_schedule_entry(Weekday::Monday, "16:30", "Morning Show");
    store.add_schedule_entry(Weekday::Wednesday, "08:00", "Morning Show");
    store.add_schedule_entry(Weekday::Friday, "23:00", "Night Owl");
    store
}

async fn export_to_string(store: ScheduleStore) -> String {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("week.xml");
    let (engine, mut rx) = ScheduleEngine::with_store(offline_config(), store);
    engine.spawn_export(&path).await.unwrap();

    let events = collect_events(&mut rx);
    assert!(
        events.iter().any(|e| matches!(
            e,
            UiEvent::Notify(n) if n.level == NoticeLevel::Info
        )),
        "export should report success, got {events:?}"
    );
    std::fs::read_to_string(&path).unwrap()
}

#[tokio::test]
async fn round_trip_preserves_every_carried_field() {
    let original = full_store();
    let xml = export_to_string(original.clone()).await;

    let file = write_file(&xml);
    let (engine, _rx) = ScheduleEngine::new(offline_config());
    engine.spawn_import(file.path()).await.unwrap();

    let handle = engine.store();
    let imported = lock_store(&handle);

    // Zones with metadata.
    assert_eq!(imported.zones().count(), 2);
    let morning = imported.zone("Morning Show").unwrap();
    assert_eq!(morning.description, "Wake-up programme");
    assert_eq!(morning.maintainers, "ops team");
    assert_eq!(morning.comments, "rotate hosts weekly");

    // Playlist catalog by derived name and path.
    let jazz = imported.playlist("jazz").unwrap();
    assert_eq!(jazz.path, "/srv/playlists/jazz.m3u");
    assert!(imported.playlist("night").is_some());

    // Schedule entries per day, minute precision.
    let monday: Vec<_> = imported
        .entries(Weekday::Monday)
        .iter()
        .map(|e| (e.start.as_str(), e.zone.as_str()))
        .collect();
    assert_eq!(
        monday,
        [("08:00", "Morning Show"), ("16:30", "Morning Show")]
    );
    assert_eq!(imported.entries(Weekday::Friday)[0].zone, "Night Owl");
    assert!(imported.entries(Weekday::Sunday).is_empty());

    // Assignments: roles, shuffle, fades, scheduling fields.
    let main = imported.main_assignment("Morning Show").unwrap();
    assert_eq!(main.playlist, "jazz");
    assert!(main.shuffle);
    assert_eq!(main.fade_in_secs, "2");
    assert_eq!(main.fade_out_secs, "3");
    assert_eq!(main.min_level, "0.1");
    assert_eq!(main.max_level, "0.9");

    let fallback = imported.fallback_assignment("Morning Show").unwrap();
    assert_eq!(fallback.playlist, "fallback");

    let intermediates: Vec<_> = imported.intermediate_assignments("Morning Show").collect();
    assert_eq!(intermediates.len(), 1);
    assert_eq!(intermediates[0].sched_interval_mins, "30");
    assert_eq!(intermediates[0].num_sched_items, "2");

    let night = imported.main_assignment("Night Owl").unwrap();
    assert!(!night.shuffle);
}

#[tokio::test]
async fn repeated_export_of_unchanged_store_is_byte_identical() {
    let store = full_store();
    let first = export_to_string(store.clone()).await;
    let second = export_to_string(store).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn concrete_scenario_imports_and_reexports() {
    let input = r#"<WeekSchedule><Mon><Zone Name="Morning Show" Start="08:00:00"><Main><Path>/x/jazz.m3u</Path><Shuffle>true</Shuffle></Main></Zone></Mon><Tue/><Wed/><Thu/><Fri/><Sat/><Sun/></WeekSchedule>"#;
    let file = write_file(input);

    let (engine, mut rx) = ScheduleEngine::new(offline_config());
    engine.spawn_import(file.path()).await.unwrap();

    let events = collect_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        UiEvent::Finish { imported: Some(_) }
    )));

    {
        let handle = engine.store();
        let store = lock_store(&handle);
        assert_eq!(
            store.zones().map(|z| z.name.as_str()).collect::<Vec<_>>(),
            ["Morning Show"]
        );
        assert_eq!(
            store.playlists().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            ["jazz"]
        );
        assert_eq!(
            store.entries(Weekday::Monday),
            [flow_schedule::store::ScheduleEntry {
                start: "08:00".to_string(),
                zone: "Morning Show".to_string(),
            }]
        );
        let main = store.main_assignment("Morning Show").unwrap();
        assert_eq!(main.playlist, "jazz");
        assert!(main.shuffle);
    }

    // Re-exporting reproduces the same document: seconds restored, the
    // empty Fader pruned away.
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.xml");
    engine.spawn_export(&out).await.unwrap();
    let exported = std::fs::read_to_string(&out).unwrap();

    assert!(exported.contains(r#"Start="08:00:00""#));
    assert!(!exported.contains("Fader"));
    assert_eq!(
        tree::parse(&exported).unwrap(),
        tree::parse(input).unwrap()
    );
}

#[tokio::test]
async fn exported_document_validates_against_embedded_schema() {
    let xml = export_to_string(full_store()).await;
    let root = tree::parse(&xml).unwrap();

    let schema_root = tree::parse(flow_schedule::EMBEDDED_SCHEMA).unwrap();
    let schema = flow_schedule::schema::compile(&schema_root, "embedded").unwrap();
    assert!(flow_schedule::validate(&root, &schema).is_ok());
}

#[tokio::test]
async fn export_validation_failure_writes_no_file() {
    // Five Intermediate assignments exceed the schema bound of four.
    let mut store = full_store();
    for i in 0..5 {
        store.add_playlist(&format!("/srv/extra{i}.m3u"));
        let mut assignment =
            PlaylistAssignment::new(format!("extra{i}"), PlaylistRole::Intermediate);
        assignment.sched_interval_mins = "10".to_string();
        assignment.num_sched_items = "1".to_string();
        store.add_assignment("Night Owl", assignment);
    }

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("invalid.xml");
    let (engine, mut rx) = ScheduleEngine::with_store(offline_config(), store);
    engine.spawn_export(&path).await.unwrap();

    assert!(!path.exists(), "no file may be written on validation failure");
    let events = collect_events(&mut rx);
    let error = events
        .iter()
        .find_map(|e| match e {
            UiEvent::Notify(n) if n.level == NoticeLevel::Error => Some(n),
            _ => None,
        })
        .expect("an error notice is reported");
    assert_eq!(error.consequence.as_deref(), Some("Export aborted."));
    assert!(error.detail.as_deref().unwrap_or("").contains("Intermediate"));
}

#[tokio::test]
async fn import_emits_full_progress_and_completion() {
    let input = r#"<WeekSchedule><Mon/><Tue/><Wed/><Thu/><Fri/><Sat/><Sun/></WeekSchedule>"#;
    let file = write_file(input);

    let (engine, mut rx) = ScheduleEngine::new(offline_config());
    engine.spawn_import(file.path()).await.unwrap();

    let events = collect_events(&mut rx);
    let ticks = events
        .iter()
        .filter(|e| matches!(e, UiEvent::Tick))
        .count();
    assert_eq!(ticks, flow_schedule::PIPELINE_TICKS);
    assert!(matches!(
        events.last(),
        Some(UiEvent::Finish { imported: Some(_) })
    ));
}
