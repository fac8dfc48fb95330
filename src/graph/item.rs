use crate::error::NgResult;
use crate::graph::core::Ctx;
use crate::graph::hook::HookRef;
use crate::graph::node::{NodeId, NodeRef};
use crate::msg::NgMesg;
use bytes::Bytes;
use std::fmt;

/// Deferred call executed on a node under its gate.
pub type FnItem = Box<dyn FnOnce(&Ctx<'_>, Option<&HookRef>) -> NgResult<()> + Send>;

/// Invoked exactly once with the item's outcome: the handler's result, or
/// the error that prevented it from running.
pub type Completion = Box<dyn FnOnce(NgResult<()>) + Send>;

/// Concurrency class of an item on its destination node.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RwClass {
    Reader,
    Writer,
}

/// A control message plus the node responses go back to.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub msg: NgMesg,
    pub retaddr: Option<NodeId>,
}

pub enum Payload {
    Data(Bytes),
    Message(Envelope),
    Function(FnItem),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Data(b) => f.debug_tuple("Data").field(&b.len()).finish(),
            Payload::Message(env) => f.debug_tuple("Message").field(&env.msg.header).finish(),
            Payload::Function(_) => f.write_str("Function"),
        }
    }
}

/// Submission options.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SendFlags(u8);

impl SendFlags {
    pub const NONE: SendFlags = SendFlags(0);
    /// Never run inline; always go through the node's queue.
    pub const QUEUE: SendFlags = SendFlags(0x1);
    /// Report `InProgress` when the item was queued rather than run.
    pub const PROGRESS: SendFlags = SendFlags(0x2);

    #[inline]
    pub fn contains(self, other: SendFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SendFlags {
    type Output = SendFlags;

    fn bitor(self, rhs: SendFlags) -> SendFlags {
        SendFlags(self.0 | rhs.0)
    }
}

/// A unit of work moving through the graph.
///
/// Build with [`Item::data`], [`Item::msg`] or [`Item::func`], address it
/// with [`Item::to`] (or the `Graph::address_*` helpers) and hand it to
/// `Graph::submit`. The item owns its payload and its node/hook references
/// until it is dispatched or failed.
pub struct Item {
    pub(crate) payload: Payload,
    pub(crate) rw: RwClass,
    pub(crate) node: Option<NodeRef>,
    pub(crate) hook: Option<HookRef>,
    pub(crate) completion: Option<Completion>,
}

impl Item {
    fn new(payload: Payload, rw: RwClass) -> Self {
        Self {
            payload,
            rw,
            node: None,
            hook: None,
            completion: None,
        }
    }

    /// Data defaults to reader.
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self::new(Payload::Data(data.into()), RwClass::Reader)
    }

    /// Messages are writers unless flagged read-only.
    pub fn msg(msg: NgMesg, retaddr: Option<NodeId>) -> Self {
        let rw = if msg.is_readonly() {
            RwClass::Reader
        } else {
            RwClass::Writer
        };
        Self::new(Payload::Message(Envelope { msg, retaddr }), rw)
    }

    /// Function items default to writer.
    pub fn func<F>(f: F) -> Self
    where
        F: FnOnce(&Ctx<'_>, Option<&HookRef>) -> NgResult<()> + Send + 'static,
    {
        Self::new(Payload::Function(Box::new(f)), RwClass::Writer)
    }

    pub fn to(mut self, node: NodeRef, hook: Option<HookRef>) -> Self {
        self.node = Some(node);
        self.hook = hook;
        self
    }

    pub fn reader(mut self) -> Self {
        self.rw = RwClass::Reader;
        self
    }

    pub fn writer(mut self) -> Self {
        self.rw = RwClass::Writer;
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NgResult<()>) + Send + 'static,
    {
        self.completion = Some(Box::new(f));
        self
    }

    #[inline]
    pub fn rw(&self) -> RwClass {
        self.rw
    }

    pub fn node(&self) -> Option<&NodeRef> {
        self.node.as_ref()
    }

    pub fn hook(&self) -> Option<&HookRef> {
        self.hook.as_ref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("payload", &self.payload)
            .field("rw", &self.rw)
            .field("node", &self.node.as_ref().map(|n| n.id()))
            .field("hook", &self.hook.as_ref().map(|h| h.name().to_string()))
            .finish()
    }
}
