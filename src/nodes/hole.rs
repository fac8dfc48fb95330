use crate::error::{NgError, NgResult};
use crate::graph::{Ctx, Envelope, HookRef, NodeBehavior, NodeType, Reply};
use crate::msg::codec::{ArgCodec, CmdDesc};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub const NG_HOLE_NODE_TYPE: &str = "hole";
pub const NGM_HOLE_COOKIE: u32 = 915433206;

pub const NGM_HOLE_GET_STATS: u32 = 1;
pub const NGM_HOLE_CLR_STATS: u32 = 2;

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HoleStats {
    pub frames: u64,
    pub octets: u64,
}

static HOLE_COMMANDS: [CmdDesc; 2] = [
    CmdDesc {
        cookie: NGM_HOLE_COOKIE,
        cmd: NGM_HOLE_GET_STATS,
        name: "getstats",
        request: None,
        response: Some(ArgCodec::of::<HoleStats>()),
    },
    CmdDesc {
        cookie: NGM_HOLE_COOKIE,
        cmd: NGM_HOLE_CLR_STATS,
        name: "clrstats",
        request: None,
        response: None,
    },
];

/// Discards all data, counting it.
pub struct HoleType;

impl NodeType for HoleType {
    fn name(&self) -> &str {
        NG_HOLE_NODE_TYPE
    }

    fn cookie(&self) -> u32 {
        NGM_HOLE_COOKIE
    }

    fn construct(&self) -> NgResult<Box<dyn NodeBehavior>> {
        Ok(Box::new(Hole::default()))
    }

    fn commands(&self) -> &[CmdDesc] {
        &HOLE_COMMANDS
    }
}

#[derive(Default)]
struct Hole {
    frames: AtomicU64,
    octets: AtomicU64,
}

impl NodeBehavior for Hole {
    fn rcvdata(&self, _ctx: &Ctx<'_>, _hook: &HookRef, data: Bytes) -> NgResult<()> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.octets.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn rcvmsg(&self, _ctx: &Ctx<'_>, env: Envelope, _hook: Option<&HookRef>) -> NgResult<Reply> {
        if env.msg.cookie() != NGM_HOLE_COOKIE {
            return Err(NgError::Invalid);
        }
        match env.msg.cmd() {
            NGM_HOLE_GET_STATS => Reply::encode(&HoleStats {
                frames: self.frames.load(Ordering::Relaxed),
                octets: self.octets.load(Ordering::Relaxed),
            }),
            NGM_HOLE_CLR_STATS => {
                self.frames.store(0, Ordering::Relaxed);
                self.octets.store(0, Ordering::Relaxed);
                Ok(Reply::Ack)
            }
            _ => Err(NgError::Invalid),
        }
    }

    fn disconnect(&self, ctx: &Ctx<'_>, _hook: &HookRef) {
        if ctx.node().numhooks() == 0 {
            let _ = ctx.rmnode_self();
        }
    }
}
