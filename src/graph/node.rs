use crate::graph::hook::HookRef;
use crate::graph::ntype::{NodeBehavior, NodeType, TypeEntry};
use crate::graph::queue::{GateState, InputQueue};
use crate::msg::types::NodeInfo;
use crate::utils::SharedStr;
use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

pub type NodeRef = Arc<Node>;

/// Node is closing (or closed); new data and messages are refused.
pub(crate) const NODE_INVALID: u32 = 0x1;
/// Every item entering the node is a writer.
pub(crate) const NODE_FORCE_WRITER: u32 = 0x4;

/// Numeric node address, unique among live nodes and never zero.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:08x}]", self.0)
    }
}

/// Flag view exposed for diagnostics.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NodeFlags {
    pub valid: bool,
    pub on_worklist: bool,
    pub force_writer: bool,
}

pub struct Node {
    id: NodeId,
    name: OnceLock<SharedStr>,
    ntype: Arc<TypeEntry>,
    flags: AtomicU32,
    hooks: Mutex<AHashMap<SharedStr, HookRef>>,
    pub(crate) queue: InputQueue,
    behavior: Box<dyn NodeBehavior>,
}

impl Node {
    pub(crate) fn new(id: NodeId, ntype: Arc<TypeEntry>, behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            id,
            name: OnceLock::new(),
            ntype,
            flags: AtomicU32::new(0),
            hooks: Mutex::new(AHashMap::new()),
            queue: InputQueue::new(),
            behavior,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.get().map(SharedStr::as_str)
    }

    /// `name` if set, else the `[id]` form. Usable as a path node part.
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(n) => n.to_string(),
            None => self.id.to_string(),
        }
    }

    pub(crate) fn set_name(&self, name: SharedStr) -> bool {
        self.name.set(name).is_ok()
    }

    pub fn type_name(&self) -> &str {
        self.ntype.name.as_str()
    }

    pub fn node_type(&self) -> &dyn NodeType {
        self.ntype.ntype.as_ref()
    }

    pub(crate) fn type_entry(&self) -> &Arc<TypeEntry> {
        &self.ntype
    }

    pub fn behavior(&self) -> &dyn NodeBehavior {
        self.behavior.as_ref()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flags.load(Ordering::Acquire) & NODE_INVALID == 0
    }

    /// Marks the node closing. Returns false if it already was.
    pub(crate) fn mark_invalid(&self) -> bool {
        self.flags.fetch_or(NODE_INVALID, Ordering::AcqRel) & NODE_INVALID == 0
    }

    /// Serialize all traffic through this node.
    pub fn force_writer(&self) {
        self.flags.fetch_or(NODE_FORCE_WRITER, Ordering::AcqRel);
    }

    #[inline]
    pub fn is_force_writer(&self) -> bool {
        self.flags.load(Ordering::Acquire) & NODE_FORCE_WRITER != 0
    }

    pub fn flags(&self) -> NodeFlags {
        let f = self.flags.load(Ordering::Acquire);
        NodeFlags {
            valid: f & NODE_INVALID == 0,
            on_worklist: self.queue.is_on_worklist(),
            force_writer: f & NODE_FORCE_WRITER != 0,
        }
    }

    /// Current state of the input gate.
    pub fn gate(&self) -> GateState {
        self.queue.gate()
    }

    /// Items waiting in the input queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn numhooks(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Hook lookup through the type (which defaults to [`scan_hook`](Self::scan_hook)).
    pub fn find_hook(&self, name: &str) -> Option<HookRef> {
        self.behavior.findhook(self, name)
    }

    /// Plain lookup in the hook set.
    pub fn scan_hook(&self, name: &str) -> Option<HookRef> {
        self.hooks.lock().get(name).cloned()
    }

    /// Snapshot of the current hooks.
    pub fn hooks(&self) -> Vec<HookRef> {
        self.hooks.lock().values().cloned().collect()
    }

    /// Adds `hook` under its name unless the name is taken.
    pub(crate) fn insert_hook(&self, hook: HookRef) -> bool {
        let mut hooks = self.hooks.lock();
        let key = hook.shared_name().clone();
        if hooks.contains_key(&key) {
            return false;
        }
        hooks.insert(key, hook);
        true
    }

    /// Removes exactly `hook` (not a same-named replacement). Returns whether it was present.
    pub(crate) fn remove_hook(&self, hook: &HookRef) -> bool {
        let mut hooks = self.hooks.lock();
        match hooks.get(hook.name()) {
            Some(h) if Arc::ptr_eq(h, hook) => {
                hooks.remove(hook.name());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn take_hooks(&self) -> Vec<HookRef> {
        self.hooks.lock().drain().map(|(_, h)| h).collect()
    }

    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            name: self.name().unwrap_or_default().to_string(),
            type_name: self.type_name().to_string(),
            id: self.id.0,
            hooks: self.numhooks() as u32,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("type", &self.type_name())
            .field("flags", &self.flags())
            .finish()
    }
}
