//! Control endpoint for code outside the graph.
//!
//! A [`ControlPort`] owns one node of type `port`. Requests sent through the
//! port carry the port's id as return address, so their responses (and any
//! data arriving on the port's hooks) end up in channels the embedder reads
//! from.

use crate::error::{NgError, NgResult, RecvError};
use crate::graph::{
    Ctx, Envelope, Graph, HookRef, Item, NodeBehavior, NodeId, NodeRef, NodeType, Reply, SendFlags,
};
use crate::msg::NgMesg;
use bytes::Bytes;
use crossbeam::channel::{self as cbchan, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const NG_PORT_NODE_TYPE: &str = "port";

/// Port nodes are only created through [`ControlPort::open`].
pub struct PortType;

impl NodeType for PortType {
    fn name(&self) -> &str {
        NG_PORT_NODE_TYPE
    }

    fn construct(&self) -> NgResult<Box<dyn NodeBehavior>> {
        Err(NgError::Invalid)
    }
}

struct Port {
    msgs: Sender<NgMesg>,
    data: Sender<(String, Bytes)>,
}

impl NodeBehavior for Port {
    fn rcvdata(&self, _ctx: &Ctx<'_>, hook: &HookRef, data: Bytes) -> NgResult<()> {
        self.data
            .send((hook.name().to_string(), data))
            .map_err(|_| NgError::NetDown)
    }

    /// Only responses reach the embedder. The port has no commands of its
    /// own, so requests are refused and the requester hears back at once.
    fn rcvmsg(&self, _ctx: &Ctx<'_>, env: Envelope, _hook: Option<&HookRef>) -> NgResult<Reply> {
        if !env.msg.is_response() {
            return Err(NgError::Invalid);
        }
        self.msgs.send(env.msg).map_err(|_| NgError::NetDown)?;
        Ok(Reply::Deferred)
    }
}

pub struct ControlPort {
    graph: Graph,
    node: NodeRef,
    msgs: Receiver<NgMesg>,
    data: Receiver<(String, Bytes)>,
    token: AtomicU32,
}

fn map_timeout(e: RecvTimeoutError) -> RecvError {
    match e {
        RecvTimeoutError::Timeout => RecvError::Timeout,
        RecvTimeoutError::Disconnected => RecvError::Disconnected,
    }
}

impl ControlPort {
    /// New port node in `graph`, registering the `port` type if needed.
    pub fn open(graph: &Graph) -> NgResult<Self> {
        match graph.register_type(PortType) {
            Ok(()) | Err(NgError::Exists) => {}
            Err(e) => return Err(e),
        }

        let (msg_tx, msg_rx) = cbchan::unbounded();
        let (data_tx, data_rx) = cbchan::unbounded();
        let node = graph.make_node_with(
            NG_PORT_NODE_TYPE,
            Box::new(Port {
                msgs: msg_tx,
                data: data_tx,
            }),
        )?;
        tracing::debug!("[Port] opened {}", node.id());

        Ok(Self {
            graph: graph.clone(),
            node,
            msgs: msg_rx,
            data: data_rx,
            token: AtomicU32::new(1),
        })
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Path addressing this port from anywhere.
    pub fn path(&self) -> String {
        format!("{}:", self.node.display_name())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Send `msg` to `path` (relative to the port). Returns the token the
    /// response will carry. Only addressing errors are returned here;
    /// everything after delivery is reported in the response.
    pub fn send(&self, path: &str, msg: NgMesg) -> NgResult<u32> {
        let token = self.token.fetch_add(1, Ordering::Relaxed);
        let (dest, hook) = self.graph.resolve_path(Some(&self.node), path)?;
        let item = Item::msg(msg.with_token(token), Some(self.node.id())).to(dest, hook);
        let _ = self.graph.submit(item, SendFlags::NONE);
        Ok(token)
    }

    pub fn recv_msg(&self, timeout: Duration) -> Result<NgMesg, RecvError> {
        self.msgs.recv_timeout(timeout).map_err(map_timeout)
    }

    pub fn try_recv_msg(&self) -> Option<NgMesg> {
        self.msgs.try_recv().ok()
    }

    /// Send then wait for the response with the matching token. Other
    /// messages received meanwhile are dropped.
    pub fn request(&self, path: &str, msg: NgMesg, timeout: Duration) -> anyhow::Result<NgMesg> {
        let token = self.send(path, msg)?;
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.graph.config().worker_threads == 0 {
                self.graph.run_pending();
            }
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            let wait = left.min(Duration::from_millis(5));
            match self.msgs.recv_timeout(wait) {
                Ok(resp) if resp.is_response() && resp.header.token == token => return Ok(resp),
                Ok(other) => {
                    tracing::debug!("[Port] dropping unrelated message {:?}", other.header);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(RecvError::Disconnected.into()),
                Err(RecvTimeoutError::Timeout) if left.is_zero() => {
                    return Err(anyhow::anyhow!("no response to token {token} within {timeout:?}"));
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Data out of the port's hook `hook`.
    pub fn send_data(&self, hook: &str, data: impl Into<Bytes>) -> NgResult<()> {
        let hook = self.node.find_hook(hook).ok_or(NgError::NotFound)?;
        self.graph.send_data(&hook, data)
    }

    /// Next data item with the name of the hook it arrived on.
    pub fn recv_data(&self, timeout: Duration) -> Result<(String, Bytes), RecvError> {
        self.data.recv_timeout(timeout).map_err(map_timeout)
    }

    pub fn try_recv_data(&self) -> Option<(String, Bytes)> {
        self.data.try_recv().ok()
    }

    /// Remove the port node. Dropping the port does the same.
    pub fn close(self) {}
}

impl Drop for ControlPort {
    fn drop(&mut self) {
        self.graph.rmnode(&self.node);
    }
}
