pub use crate::config::GraphConfig;
pub use crate::error::{NgError, NgResult, RecvError};
pub use crate::graph::path::{parse_path, valid_node_name};
pub use crate::graph::{
    Ctx, Envelope, GateState, Graph, Hook, HookRef, Item, Node, NodeBehavior, NodeId, NodeRef,
    NodeType, Payload, Reply, RwClass, SendFlags, NG_NAME_MAX,
};
pub use crate::msg::codec::{ArgCodec, CmdDesc};
pub use crate::msg::generic;
pub use crate::msg::types::*;
pub use crate::msg::{NgMesg, NGF_READONLY, NGF_RESP};
pub use crate::nodes::port::ControlPort;
pub use crate::nodes::register_all;
pub use crate::utils::logger::LoggerConfig;
