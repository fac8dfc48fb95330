use crate::config::GraphConfig;
use crate::graph::core::{Graph, GraphCore};
use crate::graph::node::NodeRef;
use crate::utils::CancelToken;
use core_affinity::CoreId;
use crossbeam::channel as cbchan;
use parking_lot::Mutex;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Process-wide FIFO of nodes with runnable queued items. Each entry holds
/// one reference on its node; a node is in the list at most once (guarded by
/// its queue's worklist bit).
pub(crate) struct Worklist {
    tx: cbchan::Sender<NodeRef>,
    rx: cbchan::Receiver<NodeRef>,
}

impl Worklist {
    pub(crate) fn new() -> Self {
        let (tx, rx) = cbchan::unbounded::<NodeRef>();
        Self { tx, rx }
    }

    #[inline]
    pub(crate) fn push(&self, node: NodeRef) {
        // both halves live in GraphCore, so the channel cannot be disconnected
        let _ = self.tx.send(node);
    }

    #[inline]
    pub(crate) fn try_pop(&self) -> Option<NodeRef> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<NodeRef> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Worker threads draining the worklist.
pub(crate) struct WorkerPool {
    cancel: CancelToken,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self {
            cancel: CancelToken::new_root(),
            joins: Mutex::new(Vec::new()),
        }
    }

    /// Start `cfg.worker_threads` workers. They hold only a weak reference,
    /// so dropping the last `Graph` handle ends them too.
    pub(crate) fn spawn(&self, core: Weak<GraphCore>, cfg: &GraphConfig) -> std::io::Result<()> {
        let idle = Duration::from_millis(cfg.idle_wait_ms.max(1));
        let mut joins = self.joins.lock();

        for i in 0..cfg.worker_threads {
            let core = core.clone();
            let cancel = self.cancel.new_child();
            let pin = if cfg.core_ids.is_empty() {
                None
            } else {
                Some(cfg.core_ids[i % cfg.core_ids.len()])
            };

            let join = thread::Builder::new()
                .name(format!("ng-worker-{i}"))
                .spawn(move || {
                    if let Some(id) = pin {
                        if core_affinity::set_for_current(CoreId { id }) {
                            tracing::info!("[Worklist] worker {} pinned to core {}", i, id);
                        } else {
                            tracing::warn!("[Worklist] worker {} cannot pin core {}", i, id);
                        }
                    }
                    Self::worker_loop(core, cancel, idle);
                    tracing::debug!("[Worklist] worker {} exited", i);
                })?;
            joins.push(join);
        }
        Ok(())
    }

    fn worker_loop(core: Weak<GraphCore>, cancel: CancelToken, idle: Duration) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(core) = core.upgrade() else {
                break;
            };
            let graph = Graph::from_core(core);
            if let Some(node) = graph.core().worklist.pop_timeout(idle) {
                graph.visit(node);
            }
        }
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
        let joins: Vec<JoinHandle<()>> = self.joins.lock().drain(..).collect();
        let me = thread::current().id();
        for join in joins {
            // a worker running the shutdown itself cannot join itself
            if join.thread().id() == me {
                continue;
            }
            let _ = join.join();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.joins.lock().len()
    }
}
