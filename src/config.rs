use serde::{Deserialize, Serialize};

/// Runtime knobs of the master and its router threads.
/// Keeps threading and control-plane back-pressure small and explicit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterConfig {
    /// Number of router threads (minimum 1).
    pub threads: usize,

    /// Logical CPU cores to pin threads to, indexed by thread id
    /// (`None` = no pinning).
    pub core_ids: Option<Vec<usize>>,

    /// Max pending control-plane commands (`None` = 16).
    pub max_control_pending: Option<usize>,
}

impl MasterConfig {
    /// Single-threaded master with no pinning.
    pub fn single_thread() -> Self {
        MasterConfig {
            threads: 1,
            core_ids: None,
            max_control_pending: None,
        }
    }

    pub fn with_threads(threads: usize) -> Self {
        MasterConfig {
            threads: threads.max(1),
            ..MasterConfig::single_thread()
        }
    }

    /// Core to pin thread `tid` to, if configured.
    pub fn core_for(&self, tid: usize) -> Option<usize> {
        self.core_ids.as_ref().and_then(|ids| ids.get(tid)).copied()
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        MasterConfig::single_thread()
    }
}
