//! Missing / out-of-date module tracking
//!
//! Observability only: records which module paths recently failed to
//! resolve and which path@version pairs pointed at unknown revisions.
//! Entries are last-writer-wins and cleared by the next success.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Default)]
pub struct StatusBoard {
    missing: Mutex<HashMap<String, DateTime<Utc>>>,
    out_of_date: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_missing(&self, module: &str) {
        warn!(module, "module not found");
        self.missing
            .lock()
            .unwrap()
            .insert(module.to_string(), Utc::now());
    }

    pub fn mark_out_of_date(&self, module: &str, version: &str) {
        warn!(module, version, "unknown revision");
        self.out_of_date
            .lock()
            .unwrap()
            .insert(format!("{module}@{version}"), Utc::now());
    }

    /// Drops the records a successful response invalidates.
    pub fn clear(&self, module: &str, version: Option<&str>) {
        self.missing.lock().unwrap().remove(module);
        if let Some(version) = version {
            self.out_of_date
                .lock()
                .unwrap()
                .remove(&format!("{module}@{version}"));
        }
    }

    pub fn is_missing(&self, module: &str) -> bool {
        self.missing.lock().unwrap().contains_key(module)
    }

    pub fn is_out_of_date(&self, module: &str, version: &str) -> bool {
        self.out_of_date
            .lock()
            .unwrap()
            .contains_key(&format!("{module}@{version}"))
    }
}
