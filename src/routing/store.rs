//! The active rule set.
//!
//! # Responsibilities
//! - Hold the current `RuleSet` snapshot
//! - Replace it atomically, all-or-nothing
//! - Notify observers of every published version
//!
//! # Design Decisions
//! - Readers load an `Arc` snapshot via `arc-swap` and never take a lock
//! - Writers are serialized by a mutex that readers never touch
//! - A rejected set consumes no version number

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::routing::error::RuleSetRejected;
use crate::routing::rule::Rule;
use crate::routing::snapshot::{BackendCatalog, RuleSet, Version};

/// Owner of the current rule set snapshot.
pub struct RuleStore {
    current: ArcSwap<RuleSet>,
    catalog: Arc<dyn BackendCatalog>,
    writer: Mutex<()>,
    versions: watch::Sender<Version>,
}

impl RuleStore {
    /// Create an empty store. Backend references are validated against `catalog`.
    pub fn new(catalog: Arc<dyn BackendCatalog>) -> Self {
        let (versions, _) = watch::channel(Version::INITIAL);
        Self {
            current: ArcSwap::from_pointee(RuleSet::empty()),
            catalog,
            writer: Mutex::new(()),
            versions,
        }
    }

    /// Validate `rules` and, if valid, publish them as the new snapshot.
    ///
    /// On error the previous snapshot stays active.
    pub fn replace(&self, rules: Vec<Rule>) -> Result<Version, RuleSetRejected> {
        self.replace_against(rules, self.catalog.as_ref())
    }

    /// Like [`replace`](Self::replace), but backend references are checked
    /// against `catalog` instead of the store's own.
    pub fn replace_against(
        &self,
        rules: Vec<Rule>,
        catalog: &dyn BackendCatalog,
    ) -> Result<Version, RuleSetRejected> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let version = self.current.load().version().next();
        let candidates = rules.len();
        let set = match RuleSet::build(rules, version, catalog) {
            Ok(set) => set,
            Err(rejected) => {
                tracing::warn!(
                    candidates,
                    errors = rejected.errors().len(),
                    error = %rejected,
                    "Rule set rejected, keeping current snapshot"
                );
                return Err(rejected);
            }
        };

        self.current.store(Arc::new(set));
        self.versions.send_replace(version);

        tracing::info!(version = %version, rules = candidates, "Rule set published");
        Ok(version)
    }

    /// The current snapshot. Holding it keeps that version alive even across
    /// later replacements.
    pub fn current_snapshot(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    pub fn version(&self) -> Version {
        self.current.load().version()
    }

    /// Receive every published version.
    pub fn subscribe(&self) -> watch::Receiver<Version> {
        self.versions.subscribe()
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
