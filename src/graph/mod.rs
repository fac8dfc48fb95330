//! The node graph engine: types, nodes, hooks, items, the per-node
//! reader/writer gate and the worklist that drains it.

pub mod core;
pub mod hook;
pub mod item;
pub mod node;
pub mod ntype;
pub mod path;
pub(crate) mod queue;
pub(crate) mod sched;

pub use self::core::{Ctx, Graph};
pub use hook::{Hook, HookRef};
pub use item::{Completion, Envelope, FnItem, Item, Payload, RwClass, SendFlags};
pub use node::{Node, NodeId, NodeRef};
pub use ntype::{NodeBehavior, NodeType, Reply};
pub use queue::GateState;

/// Longest type, node or hook name, in bytes.
pub const NG_NAME_MAX: usize = 31;

/// Shared name rules: non-empty, bounded, no path separators.
pub(crate) fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= NG_NAME_MAX && !name.contains(['.', ':'])
}
