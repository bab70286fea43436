// Jobs Document - load/save of the persisted id -> record map

use std::collections::HashMap;
use std::path::Path;

use renderq_core::domain::JobRecord;
use renderq_core::error::Result;
use tracing::{error, warn};

/// Load the jobs document.
///
/// Tolerant by design: a missing file is an empty queue, an unparseable
/// document is treated as empty (logged as an error), and a single
/// malformed entry is skipped with a warning instead of poisoning the
/// whole store.
pub async fn load(path: &Path) -> Result<HashMap<String, JobRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };

    let entries: HashMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Jobs document unreadable, treating as empty");
            return Ok(HashMap::new());
        }
    };

    let mut jobs = HashMap::with_capacity(entries.len());
    for (id, value) in entries {
        match serde_json::from_value::<JobRecord>(value) {
            Ok(record) => {
                jobs.insert(id, record);
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Skipping malformed job record");
            }
        }
    }
    Ok(jobs)
}

/// Save the jobs document atomically: write the full serialization to a
/// sibling `.tmp` file, then rename over the canonical path. A reader
/// never observes a partially written document.
pub async fn save(path: &Path, jobs: &HashMap<String, JobRecord>) -> Result<()> {
    let serialized = serde_json::to_vec_pretty(jobs)?;
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, &serialized).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}
