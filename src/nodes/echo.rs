use crate::error::NgResult;
use crate::graph::{Ctx, Envelope, HookRef, NodeBehavior, NodeType, Reply};
use bytes::Bytes;

pub const NG_ECHO_NODE_TYPE: &str = "echo";
pub const NGM_ECHO_COOKIE: u32 = 884639813;

/// Sends data back out the hook it came in on and answers every request
/// with its own arguments.
pub struct EchoType;

impl NodeType for EchoType {
    fn name(&self) -> &str {
        NG_ECHO_NODE_TYPE
    }

    fn cookie(&self) -> u32 {
        NGM_ECHO_COOKIE
    }

    fn construct(&self) -> NgResult<Box<dyn NodeBehavior>> {
        Ok(Box::new(Echo))
    }
}

struct Echo;

impl NodeBehavior for Echo {
    fn rcvdata(&self, ctx: &Ctx<'_>, hook: &HookRef, data: Bytes) -> NgResult<()> {
        ctx.send_data(hook, data)
    }

    fn rcvmsg(&self, _ctx: &Ctx<'_>, env: Envelope, _hook: Option<&HookRef>) -> NgResult<Reply> {
        Ok(Reply::Args(env.msg.data))
    }

    fn disconnect(&self, ctx: &Ctx<'_>, _hook: &HookRef) {
        if ctx.node().numhooks() == 0 {
            let _ = ctx.rmnode_self();
        }
    }
}
