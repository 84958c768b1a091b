//! JSON snapshots of the in-process state store
//!
//! Lets the daemon carry slot-status and alarm rows across restarts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::data::store::{MemoryStore, TableMap};
use crate::error::{PmonError, Result};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form of the store
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub tables: TableMap,
}

/// Load a store from a snapshot file. A missing file yields an empty store.
pub fn load_snapshot(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        debug!("No store snapshot at {:?}, starting empty", path);
        return Ok(MemoryStore::new());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| PmonError::FileRead { path: path.to_path_buf(), source: e })?;
    let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(PmonError::config(format!(
            "unsupported store snapshot version {} in {:?}",
            snapshot.version, path
        )));
    }

    info!("Loaded {} tables from {:?}", snapshot.tables.len(), path);
    Ok(MemoryStore::from_tables(snapshot.tables))
}

/// Save the store to a snapshot file
pub fn save_snapshot(store: &MemoryStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let snapshot = StoreSnapshot {
        version: SNAPSHOT_VERSION,
        tables: store.tables(),
    };
    let json = serde_json::to_string_pretty(&snapshot)?;

    // Write to a temp file then rename so readers never see a torn file
    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path)
        .map_err(|e| PmonError::FileWrite { path: temp_path.clone(), source: e })?;
    file.write_all(json.as_bytes())
        .map_err(|e| PmonError::FileWrite { path: temp_path.clone(), source: e })?;
    file.sync_all()
        .map_err(|e| PmonError::FileWrite { path: temp_path.clone(), source: e })?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| PmonError::FileWrite { path: path.to_path_buf(), source: e })?;

    debug!("Saved store snapshot to {:?}", path);
    Ok(())
}
