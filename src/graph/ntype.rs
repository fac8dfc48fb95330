use crate::error::{NgError, NgResult};
use crate::graph::core::Ctx;
use crate::graph::hook::HookRef;
use crate::graph::item::Envelope;
use crate::graph::node::Node;
use crate::msg::codec::CmdDesc;
use crate::utils::SharedStr;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A registered kind of node.
///
/// The type is a factory and a description: it names the kind, owns the
/// message dialect cookie, lists the commands it understands for
/// ASCII/binary conversion, and builds one [`NodeBehavior`] per instance.
pub trait NodeType: Send + Sync + 'static {
    /// Unique type name, see [`NG_NAME_MAX`](crate::graph::NG_NAME_MAX).
    fn name(&self) -> &str;

    /// Cookie identifying this type's private message dialect.
    fn cookie(&self) -> u32 {
        0
    }

    /// Build the per-node state. Failing here aborts node creation.
    fn construct(&self) -> NgResult<Box<dyn NodeBehavior>>;

    /// Command schema of the type's dialect.
    fn commands(&self) -> &[CmdDesc] {
        &[]
    }
}

/// Per-node callbacks. Every method is optional.
///
/// Callbacks run under the node's reader/writer gate: data items usually as
/// readers (so `&self` may be entered concurrently), control messages and
/// function items as writers. State shared between readers needs interior
/// mutability.
pub trait NodeBehavior: Send + Sync + 'static {
    /// Accept or veto a new hook. The hook is not yet in the node's hook set.
    fn newhook(&self, _ctx: &Ctx<'_>, _hook: &HookRef, _name: &str) -> NgResult<()> {
        Ok(())
    }

    /// Hook lookup. Types with many hooks may keep their own index.
    fn findhook(&self, node: &Node, name: &str) -> Option<HookRef> {
        node.scan_hook(name)
    }

    /// Accept or veto the pairing of `hook` with its (already linked) peer.
    fn connect(&self, _ctx: &Ctx<'_>, _hook: &HookRef) -> NgResult<()> {
        Ok(())
    }

    /// Data arriving over `hook`. The default drops it.
    fn rcvdata(&self, _ctx: &Ctx<'_>, _hook: &HookRef, _data: Bytes) -> NgResult<()> {
        Ok(())
    }

    /// Control messages not consumed by the engine, and every response.
    /// The return value of a response delivery is ignored.
    fn rcvmsg(&self, _ctx: &Ctx<'_>, _env: Envelope, _hook: Option<&HookRef>) -> NgResult<Reply> {
        Err(NgError::Invalid)
    }

    /// `hook` was removed from this node and is no longer usable.
    fn disconnect(&self, _ctx: &Ctx<'_>, _hook: &HookRef) {}

    /// The node is being destroyed; its hooks are already gone.
    fn shutdown(&self, _ctx: &Ctx<'_>) {}
}

/// What a message handler wants sent back to the requester.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Empty, successful response.
    Ack,
    /// Successful response carrying encoded arguments.
    Args(Bytes),
    /// The handler took ownership of responding (or forwarded the request).
    Deferred,
}

impl Reply {
    /// Response with `value` encoded in the binary argument format.
    pub fn encode<T: Serialize>(value: &T) -> NgResult<Self> {
        Ok(Reply::Args(Bytes::from(bincode::serialize(value)?)))
    }
}

/// Registry entry for a type: the type itself plus its live-instance count.
pub(crate) struct TypeEntry {
    pub(crate) name: SharedStr,
    pub(crate) ntype: Box<dyn NodeType>,
    live: AtomicUsize,
}

impl TypeEntry {
    pub(crate) fn new(ntype: Box<dyn NodeType>) -> Self {
        Self {
            name: SharedStr::new(ntype.name()),
            ntype,
            live: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn inc_live(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn dec_live(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeEntry")
            .field("name", &self.name)
            .field("live", &self.live())
            .finish()
    }
}
