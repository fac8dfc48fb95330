use crate::error::{NgError, NgResult};
use crate::graph::{Ctx, HookRef, NodeBehavior, NodeType};
use bytes::Bytes;

pub const NG_RELAY_NODE_TYPE: &str = "relay";
pub const NG_RELAY_HOOK_LEFT: &str = "left";
pub const NG_RELAY_HOOK_RIGHT: &str = "right";

/// Two hooks, `left` and `right`; data entering one leaves through the other.
pub struct RelayType;

impl NodeType for RelayType {
    fn name(&self) -> &str {
        NG_RELAY_NODE_TYPE
    }

    fn construct(&self) -> NgResult<Box<dyn NodeBehavior>> {
        Ok(Box::new(Relay))
    }
}

struct Relay;

impl NodeBehavior for Relay {
    fn newhook(&self, _ctx: &Ctx<'_>, _hook: &HookRef, name: &str) -> NgResult<()> {
        match name {
            NG_RELAY_HOOK_LEFT | NG_RELAY_HOOK_RIGHT => Ok(()),
            _ => Err(NgError::Invalid),
        }
    }

    fn rcvdata(&self, ctx: &Ctx<'_>, hook: &HookRef, data: Bytes) -> NgResult<()> {
        let other = if hook.name() == NG_RELAY_HOOK_LEFT {
            NG_RELAY_HOOK_RIGHT
        } else {
            NG_RELAY_HOOK_LEFT
        };
        match ctx.find_hook(other) {
            Some(out) if out.is_valid() => ctx.send_data(&out, data),
            // nothing on the other side yet
            _ => Ok(()),
        }
    }

    fn disconnect(&self, ctx: &Ctx<'_>, _hook: &HookRef) {
        if ctx.node().numhooks() == 0 {
            let _ = ctx.rmnode_self();
        }
    }
}
