use serde::{Deserialize, Serialize};

/// Engine-wide tunables, usually loaded with [`crate::utils::params_io::load_cfg`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Worker threads draining the worklist. `0` leaves dispatch to `Graph::run_pending`.
    pub worker_threads: usize,
    /// Inline (fast path) dispatch depth per thread before submissions get queued.
    pub max_stack_depth: u32,
    /// Items dispatched per worklist visit before the node goes back to the tail.
    pub max_drain_per_node: Option<usize>,
    /// Cores to pin workers to, assigned round robin.
    pub core_ids: Vec<usize>,
    /// How long an idle worker blocks on the worklist before re-checking cancellation.
    pub idle_wait_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_stack_depth: 24,
            max_drain_per_node: None,
            core_ids: Vec::new(),
            idle_wait_ms: 50,
        }
    }
}

impl GraphConfig {
    /// Configuration with `n` worker threads and defaults otherwise.
    pub fn with_workers(n: usize) -> Self {
        Self {
            worker_threads: n,
            ..Self::default()
        }
    }
}
