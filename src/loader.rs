//! Grant loader - reads a `{"grants": [...]}` document into a `GrantDataset`.

use crate::error::{GrantScopeError, Result};
use crate::record::{GrantDataset, GrantRecord, FIELD_NAMES};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

const GRANTS_KEY: &str = "grants";

/// Load grants from an uploaded byte stream or, failing that, a file path.
///
/// The upload wins when both are supplied.
pub fn load_grants(path: Option<&Path>, upload: Option<&[u8]>) -> Result<GrantDataset> {
    match (upload, path) {
        (Some(bytes), _) => {
            debug!("Loading grants from uploaded stream ({} bytes)", bytes.len());
            load_grants_from_slice(bytes)
        }
        (None, Some(path)) => {
            info!("Loading grants from {}", path.display());
            load_grants_from_slice(&read_source(path)?)
        }
        (None, None) => Err(GrantScopeError::SourceNotFound),
    }
}

/// Bytes of a grant file. Any failure to read the file is reported as a
/// source error naming the path.
pub fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| GrantScopeError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn load_grants_from_slice(bytes: &[u8]) -> Result<GrantDataset> {
    let document: Value = serde_json::from_slice(bytes)?;

    let grants = document
        .get(GRANTS_KEY)
        .ok_or_else(|| GrantScopeError::Schema(format!("missing top-level '{}' key", GRANTS_KEY)))?
        .as_array()
        .ok_or_else(|| GrantScopeError::Schema(format!("'{}' must be an array", GRANTS_KEY)))?;

    let records = grants
        .iter()
        .enumerate()
        .map(|(index, grant)| parse_grant(index, grant))
        .collect::<Result<Vec<_>>>()?;

    info!("Loaded {} grant record(s)", records.len());
    Ok(GrantDataset { grants: records })
}

fn parse_grant(index: usize, grant: &Value) -> Result<GrantRecord> {
    let object = grant
        .as_object()
        .ok_or_else(|| GrantScopeError::Schema(format!("grant #{} is not an object", index)))?;

    let missing: Vec<&str> = FIELD_NAMES
        .iter()
        .copied()
        .filter(|name| !object.contains_key(*name))
        .collect();
    let unexpected: Vec<&str> = object
        .keys()
        .map(String::as_str)
        .filter(|key| !FIELD_NAMES.contains(key))
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("missing field(s) {}", missing.join(", ")));
        }
        if !unexpected.is_empty() {
            problems.push(format!("unexpected field(s) {}", unexpected.join(", ")));
        }
        return Err(GrantScopeError::Schema(format!(
            "grant #{}: {}",
            index,
            problems.join("; ")
        )));
    }

    if let Some((name, _)) = object
        .iter()
        .find(|(_, value)| value.is_array() || value.is_object())
    {
        return Err(GrantScopeError::Schema(format!(
            "grant #{}: field '{}' must be a scalar",
            index, name
        )));
    }

    serde_json::from_value(grant.clone())
        .map_err(|e| GrantScopeError::Schema(format!("grant #{}: {}", index, e)))
}
