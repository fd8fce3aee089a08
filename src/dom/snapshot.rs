use crate::error::Result;
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::{fs, path::Path};

/// One captured page, persisted as JSON for audit and offline mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomSnapshot {
    /// URL the page was captured from
    pub url: String,

    /// Document title
    #[serde(default)]
    pub title: String,

    /// Full serialized HTML after client-side rendering settled
    #[serde(default)]
    pub html: String,

    /// Capture time. Timestamps written without an offset are read as local
    /// time; a missing one reads as the load time.
    #[serde(default = "Local::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Local>,

    /// Whether the page was captured
    pub success: bool,

    /// Failure description when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomSnapshot {
    /// Snapshot of a successfully rendered page
    pub fn captured(url: impl Into<String>, title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            html: html.into(),
            timestamp: Local::now(),
            success: true,
            error: None,
        }
    }

    /// Snapshot recording a failed capture
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            html: String::new(),
            timestamp: Local::now(),
            success: false,
            error: Some(error.into()),
        }
    }

    /// Write the snapshot as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("DOM for {} saved to: {}", self.url, path.display());
        Ok(())
    }

    /// Read a snapshot previously written with [`DomSnapshot::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(stamped) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(stamped.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f").map_err(D::Error::custom)?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .ok_or_else(|| D::Error::custom(format!("timestamp {} does not exist in the local timezone", raw)))
}
