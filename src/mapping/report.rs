use crate::{error::Result,
            mapping::{SelectorMatch, CONFIDENT_MATCH}};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Aggregate counts over one batch of mappings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingSummary {
    pub total_selectors: usize,
    pub successful_mappings: usize,
    pub failed_mappings: usize,
    pub success_rate: f64,
}

/// One named mapping result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingDetail {
    pub name: String,
    #[serde(flatten)]
    pub result: SelectorMatch,
}

/// Audit record of a mapping batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingReport {
    pub summary: MappingSummary,
    pub details: Vec<MappingDetail>,
}

impl MappingReport {
    /// Summarize results; a mapping is successful above [`CONFIDENT_MATCH`]
    pub fn from_results(results: &IndexMap<String, SelectorMatch>) -> Self {
        let total = results.len();
        let successful = results.values().filter(|r| r.confidence > CONFIDENT_MATCH).count();

        Self {
            summary: MappingSummary {
                total_selectors: total,
                successful_mappings: successful,
                failed_mappings: total - successful,
                success_rate: if total == 0 { 0.0 } else { successful as f64 / total as f64 },
            },
            details: results
                .iter()
                .map(|(name, result)| MappingDetail { name: name.clone(), result: result.clone() })
                .collect(),
        }
    }

    /// Write the report as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Mapping report saved to: {}", path.display());
        Ok(())
    }
}
