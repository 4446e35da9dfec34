//! Schema acquisition
//!
//! The schedule schema is published at a fixed URL; a copy ships embedded
//! in the binary. On first use the provider tries the network (bounded by a
//! short timeout) and falls back to the embedded copy on any failure. The
//! compiled result, or the fact that no usable schema could be obtained, is
//! memoized for the lifetime of the owning engine, so one fetch serves the
//! whole session and two racing first-uses cannot double-fetch.
//!
//! "No usable schema" is a degraded mode, not an error: validation is
//! skipped for the rest of the session and the user is warned once.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::error::{Result, ScheduleXmlError};
use crate::schema::{self, Schema};
use crate::tree;

/// Published location of the weekly schedule schema.
pub const SCHEMA_URL: &str =
    "https://raw.githubusercontent.com/UoC-Radio/audio-scheduler/master/config_schema.xsd";

/// Embedded fallback copy of the schema.
pub const EMBEDDED_SCHEMA: &str = include_str!("../assets/week_schedule.xsd");

/// Bound on the remote fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Remote-with-fallback schema source, memoized per engine instance.
pub struct SchemaProvider {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
    fallback: Cow<'static, str>,
    cell: OnceCell<Option<Arc<Schema>>>,
    skip_warning_pending: AtomicBool,
}

impl SchemaProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            client: reqwest::Client::new(),
            fallback: Cow::Borrowed(EMBEDDED_SCHEMA),
            cell: OnceCell::new(),
            skip_warning_pending: AtomicBool::new(false),
        }
    }

    /// Replace the embedded fallback text (primarily for tests).
    pub fn with_fallback(mut self, fallback: impl Into<Cow<'static, str>>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// The compiled schema, or `None` once the session has degraded to
    /// skip-validation. First call fetches and compiles; later calls
    /// return the memoized result.
    pub async fn get(&self) -> Option<Arc<Schema>> {
        self.cell
            .get_or_init(|| async { self.acquire().await })
            .await
            .clone()
    }

    /// True exactly once after the provider degrades, so callers can
    /// surface the skip-validation warning a single time per session.
    pub fn take_skip_warning(&self) -> bool {
        self.skip_warning_pending.swap(false, Ordering::SeqCst)
    }

    async fn acquire(&self) -> Option<Arc<Schema>> {
        let compiled = match self.fetch_remote().await {
            Ok(bytes) => {
                info!(url = %self.url, "fetched schedule schema");
                compile_source(&bytes, &self.url)
            }
            Err(e) => {
                warn!(error = %e, "schema download failed, using embedded copy");
                compile_source(self.fallback.as_bytes(), "embedded")
            }
        };

        match compiled {
            Ok(schema) => Some(Arc::new(schema)),
            Err(e) => {
                error!(error = %e, "no usable schema; validation disabled for this session");
                self.skip_warning_pending.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    async fn fetch_remote(&self) -> Result<Vec<u8>> {
        let timeout_err = || ScheduleXmlError::Timeout {
            url: self.url.clone(),
            timeout_seconds: self.timeout.as_secs(),
        };

        let response = tokio::time::timeout(self.timeout, self.client.get(&self.url).send())
            .await
            .map_err(|_| timeout_err())??;

        if !response.status().is_success() {
            return Err(ScheduleXmlError::HttpStatus {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let bytes = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| timeout_err())??;
        Ok(bytes.to_vec())
    }
}

fn compile_source(bytes: &[u8], source_name: &str) -> Result<Schema> {
    let text = std::str::from_utf8(bytes).map_err(|e| ScheduleXmlError::SchemaCompile {
        source_name: source_name.to_string(),
        details: e.to_string(),
    })?;
    let root = tree::parse(text).map_err(|e| ScheduleXmlError::SchemaCompile {
        source_name: source_name.to_string(),
        details: e.to_string(),
    })?;
    schema::compile(&root, source_name)
}
