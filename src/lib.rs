//! # flow-schedule Library
//!
//! Weekly broadcast flow-schedule management: an in-memory store of zones,
//! playlists, schedule entries and playlist assignments, plus a validated
//! XML import/export subsystem with remote-with-fallback schema
//! acquisition and asynchronous, fire-and-forget pipeline execution.

pub mod cli;
pub mod engine;
pub mod error;
pub mod export;
pub mod import;
pub mod provider;
pub mod schema;
pub mod sink;
pub mod store;
pub mod tree;
pub mod validator;

pub use cli::{Cli, Command};
pub use engine::{EngineConfig, ScheduleEngine};
pub use error::{Result, ScheduleXmlError};
pub use export::Exporter;
pub use import::Importer;
pub use provider::{DEFAULT_FETCH_TIMEOUT, EMBEDDED_SCHEMA, SCHEMA_URL, SchemaProvider};
pub use schema::Schema;
pub use sink::{Notice, NoticeLevel, PIPELINE_TICKS, ProgressCounter, UiEvent, UiSender};
pub use store::{
    Playlist, PlaylistAssignment, PlaylistRole, ScheduleEntry, ScheduleStore, Weekday, Zone,
    lock_store, playlist_name_from_path,
};
pub use tree::Element;
pub use validator::{ValidationFailure, validate};
