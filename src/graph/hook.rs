use crate::graph::node::{Node, NodeRef};
use crate::utils::SharedStr;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub type HookRef = Arc<Hook>;

/// Not (yet, or any more) usable for traffic.
const HOOK_INVALID: u32 = 0x1;
/// Items arriving over this hook are writers.
const HOOK_FORCE_WRITER: u32 = 0x2;
/// Items arriving over this hook are always queued.
const HOOK_FORCE_QUEUE: u32 = 0x4;

/// One end of an edge.
///
/// `node` and `peer` are `None` once the hook is detached. Both slots are
/// read lock-free; `peer` is only written under the graph's topology lock so
/// that the two ends of a pair change together.
pub struct Hook {
    name: SharedStr,
    node: ArcSwapOption<Node>,
    peer: ArcSwapOption<Hook>,
    flags: AtomicU32,
    private: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl Hook {
    /// A fresh hook: owned by `node`, unpaired and invalid.
    pub(crate) fn new(name: &str, node: &NodeRef) -> HookRef {
        Arc::new(Self {
            name: SharedStr::new(name),
            node: ArcSwapOption::from(Some(node.clone())),
            peer: ArcSwapOption::empty(),
            flags: AtomicU32::new(HOOK_INVALID),
            private: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn shared_name(&self) -> &SharedStr {
        &self.name
    }

    /// Owning node, `None` once the hook has been destroyed.
    #[inline]
    pub fn node(&self) -> Option<NodeRef> {
        self.node.load_full()
    }

    #[inline]
    pub fn peer(&self) -> Option<HookRef> {
        self.peer.load_full()
    }

    /// Node at the other end of the edge.
    pub fn peer_node(&self) -> Option<NodeRef> {
        self.peer().and_then(|p| p.node())
    }

    pub(crate) fn set_peer(&self, peer: Option<HookRef>) {
        self.peer.store(peer);
    }

    pub(crate) fn take_peer(&self) -> Option<HookRef> {
        self.peer.swap(None)
    }

    pub(crate) fn take_node(&self) -> Option<NodeRef> {
        self.node.swap(None)
    }

    /// Is `other`'s peer slot pointing at this very hook?
    pub(crate) fn is_peer_of(self: &Arc<Self>, other: &Hook) -> bool {
        other
            .peer
            .load()
            .as_ref()
            .is_some_and(|p| Arc::ptr_eq(p, self))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flags.load(Ordering::Acquire) & HOOK_INVALID == 0
    }

    pub(crate) fn mark_invalid(&self) {
        self.flags.fetch_or(HOOK_INVALID, Ordering::AcqRel);
    }

    pub(crate) fn mark_valid(&self) {
        self.flags.fetch_and(!HOOK_INVALID, Ordering::AcqRel);
    }

    /// Items arriving over this hook run exclusively on the node.
    pub fn force_writer(&self) {
        self.flags.fetch_or(HOOK_FORCE_WRITER, Ordering::AcqRel);
    }

    #[inline]
    pub fn is_force_writer(&self) -> bool {
        self.flags.load(Ordering::Acquire) & HOOK_FORCE_WRITER != 0
    }

    /// Items arriving over this hook never take the inline fast path.
    pub fn force_queue(&self) {
        self.flags.fetch_or(HOOK_FORCE_QUEUE, Ordering::AcqRel);
    }

    #[inline]
    pub fn is_force_queue(&self) -> bool {
        self.flags.load(Ordering::Acquire) & HOOK_FORCE_QUEUE != 0
    }

    /// Attach type-private state to the hook, replacing any previous value.
    pub fn set_private<T: Any + Send + Sync>(&self, value: T) {
        *self.private.lock() = Some(Arc::new(value));
    }

    pub fn private<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let slot = self.private.lock().clone()?;
        slot.downcast::<T>().ok()
    }

    pub fn clear_private(&self) {
        self.private.lock().take();
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("node", &self.node().map(|n| n.id()))
            .field("peer", &self.peer().map(|p| p.name().to_string()))
            .field("valid", &self.is_valid())
            .finish()
    }
}
