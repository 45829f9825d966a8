//! Workflow configuration file.
//!
//! JSON document of the form
//! `{"workflows": {<name>: <chain>}, "saved_at": <epoch seconds>}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::Error as _;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use autochain_core::Timestamp;

use crate::error::WorkflowError;
use crate::types::WorkflowChain;

#[derive(Serialize)]
struct WorkflowsFile<'a> {
    workflows: &'a BTreeMap<String, WorkflowChain>,
    saved_at: Timestamp,
}

/// Write `chains` to `path`, creating parent directories.
pub fn save_chains(
    path: &Path,
    chains: &BTreeMap<String, WorkflowChain>,
) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let doc = WorkflowsFile {
        workflows: chains,
        saved_at: Timestamp::now(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    info!(path = %path.display(), count = chains.len(), "Saved workflow configuration");
    Ok(())
}

/// Read chains from `path`.
///
/// A missing file yields no chains. Entries that do not parse as a chain are
/// logged and skipped; a document that is not JSON is an error.
pub fn load_chains(path: &Path) -> Result<Vec<WorkflowChain>, WorkflowError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No workflow configuration found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let doc: Value = serde_json::from_str(&content)?;
    let entries = match doc.get("workflows") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            return Err(WorkflowError::Serialization(serde_json::Error::custom(
                "`workflows` must be an object keyed by workflow name",
            )))
        }
    };

    let mut chains = Vec::with_capacity(entries.len());
    for (key, entry) in entries {
        match serde_json::from_value::<WorkflowChain>(entry.clone()) {
            Ok(chain) => chains.push(chain),
            Err(e) => warn!(workflow = %key, error = %e, "Skipping malformed workflow entry"),
        }
    }
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_chains;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_is_lossless() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("automation_config.json");

        let chains: BTreeMap<String, WorkflowChain> = default_chains()
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        save_chains(&path, &chains).unwrap();

        let loaded = load_chains(&path).unwrap();
        assert_eq!(loaded.len(), chains.len());
        for chain in loaded {
            assert_eq!(&chain, &chains[&chain.name]);
        }
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.json");
        let chains: BTreeMap<String, WorkflowChain> = default_chains()
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        save_chains(&path, &chains).unwrap();

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(doc["saved_at"].is_number());
        let cv = &doc["workflows"]["git_commit_validation"];
        assert_eq!(cv["trigger_contexts"][0], "git_commit");
        assert_eq!(cv["actions"][0]["action_type"], "notification");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(load_chains(&dir.path().join("absent.json")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(
            &path,
            r#"{
                "workflows": {
                    "good": {"name": "good", "trigger_contexts": ["file_change"], "actions": []},
                    "bad_context": {"name": "bad_context", "trigger_contexts": ["solar_flare"], "actions": []},
                    "no_actions": {"name": "no_actions", "trigger_contexts": []}
                },
                "saved_at": 0
            }"#,
        )
        .unwrap();

        let loaded = load_chains(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "good");
        assert_eq!(loaded[0].priority, 1);
        assert!(loaded[0].enabled);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_chains(&path),
            Err(WorkflowError::Serialization(_))
        ));

        std::fs::write(&path, r#"{"workflows": [1, 2]}"#).unwrap();
        assert!(matches!(
            load_chains(&path),
            Err(WorkflowError::Serialization(_))
        ));
    }
}
