// crates/handoff-gate-config/src/catalog.rs
// ============================================================================
// Module: Reloading Plan Catalog
// Description: Plan catalog backed by the config file with mtime-based reload.
// Purpose: Let plan edits take effect without restarting the process.
// Dependencies: handoff-gate-core, crate::config
// ============================================================================

//! ## Overview
//! [`ReloadingPlanCatalog`] re-reads the config file whenever its modification
//! time changes and serves the plan table from it. A file that fails to load is
//! reported once per modification time; afterwards the last good table is
//! served until the file changes again.
//! Security posture: the reloaded file is untrusted and fully revalidated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;

use handoff_gate_core::CatalogError;
use handoff_gate_core::PlanCatalog;
use handoff_gate_core::PlanTable;

use crate::config::ConfigError;
use crate::config::HandoffGateConfig;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Reload bookkeeping guarded by the catalog mutex.
struct ReloadState {
    /// Last table that loaded successfully.
    table: Arc<PlanTable>,
    /// Modification time of the last load attempt.
    seen_modified_at: Option<SystemTime>,
    /// Whether a missing or unreadable file has already been reported.
    unreadable_reported: bool,
}

/// Plan catalog that reloads the config file when it changes.
///
/// # Invariants
/// - The served table always comes from a fully validated config.
/// - A failed reload never replaces the last good table.
pub struct ReloadingPlanCatalog {
    /// Config file path.
    path: PathBuf,
    /// Reload state.
    state: Mutex<ReloadState>,
}

impl ReloadingPlanCatalog {
    /// Loads the config at `path` and serves its plan table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the initial config fails to load.
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let config = HandoffGateConfig::load(Some(path))?;
        Self::from_config(path, &config)
    }

    /// Serves the plan table of an already loaded config, reloading from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the plan table cannot be built.
    pub fn from_config(path: &Path, config: &HandoffGateConfig) -> Result<Self, ConfigError> {
        let table = Arc::new(config.plan_table()?);
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(ReloadState {
                table,
                seen_modified_at: config.source_modified_at,
                unreadable_reported: false,
            }),
        })
    }

    /// Returns the watched config path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlanCatalog for ReloadingPlanCatalog {
    fn snapshot(&self) -> Result<Arc<PlanTable>, CatalogError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CatalogError::Unavailable("plan catalog mutex poisoned".to_string()))?;
        let modified_at = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified_at) => modified_at,
            Err(err) => {
                if state.unreadable_reported {
                    return Ok(Arc::clone(&state.table));
                }
                state.unreadable_reported = true;
                return Err(CatalogError::Unavailable(format!(
                    "{}: {err}",
                    self.path.display()
                )));
            }
        };
        state.unreadable_reported = false;
        if state.seen_modified_at == Some(modified_at) {
            return Ok(Arc::clone(&state.table));
        }
        state.seen_modified_at = Some(modified_at);
        let table = HandoffGateConfig::load(Some(&self.path))
            .and_then(|config| config.plan_table())
            .map_err(|err| match err {
                ConfigError::Io(message) => CatalogError::Unavailable(message),
                ConfigError::Parse(_) | ConfigError::Invalid(_) => {
                    CatalogError::Invalid(err.to_string())
                }
            })?;
        state.table = Arc::new(table);
        Ok(Arc::clone(&state.table))
    }
}
