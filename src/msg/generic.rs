//! Commands every node understands, handled by the engine before the
//! node's own `rcvmsg`.
//!
//! `connect` is the one command touching two nodes. It never holds both
//! nodes' gates: phase 1 runs on the local node (the request handler),
//! phase 2 is queued onto the remote node, phase 3 back onto the local one.
//! The response is sent when the last phase finishes or any phase aborts;
//! an abort destroys both provisional hooks.

use crate::error::{NgError, NgResult};
use crate::graph::core::{Ctx, Graph, GraphCore};
use crate::graph::hook::{Hook, HookRef};
use crate::graph::item::{Envelope, Item, SendFlags};
use crate::graph::node::{NodeId, NodeRef};
use crate::graph::ntype::Reply;
use crate::graph::valid_name;
use crate::msg::NgMesg;
use crate::msg::codec::{self, ArgCodec, CmdDesc};
use crate::msg::types::{
    Connect, HookList, LinkInfo, MkPeer, Name, NameList, NodeInfo, RmHook, TypeList,
};
use std::sync::Weak;

pub const NGM_GENERIC_COOKIE: u32 = 1137070366;

pub const NGM_SHUTDOWN: u32 = 1;
pub const NGM_MKPEER: u32 = 2;
pub const NGM_CONNECT: u32 = 3;
pub const NGM_NAME: u32 = 4;
pub const NGM_RMHOOK: u32 = 5;
pub const NGM_NODEINFO: u32 = 6;
pub const NGM_LISTHOOKS: u32 = 7;
pub const NGM_LISTNAMES: u32 = 8;
pub const NGM_LISTNODES: u32 = 9;
pub const NGM_LISTTYPES: u32 = 10;
pub const NGM_TEXT_STATUS: u32 = 11;
pub const NGM_BINARY2ASCII: u32 = 12;
pub const NGM_ASCII2BINARY: u32 = 13;
pub const NGM_TEXT_CONFIG: u32 = 14;

const fn desc(cmd: u32, name: &'static str, request: Option<ArgCodec>, response: Option<ArgCodec>) -> CmdDesc {
    CmdDesc {
        cookie: NGM_GENERIC_COOKIE,
        cmd,
        name,
        request,
        response,
    }
}

/// Schema of the generic commands. The conversion commands carry a nested
/// message in wire form and have no ASCII rendering of their own.
pub static GENERIC_COMMANDS: [CmdDesc; 14] = [
    desc(NGM_SHUTDOWN, "shutdown", None, None),
    desc(NGM_MKPEER, "mkpeer", Some(ArgCodec::of::<MkPeer>()), None),
    desc(NGM_CONNECT, "connect", Some(ArgCodec::of::<Connect>()), None),
    desc(NGM_NAME, "name", Some(ArgCodec::of::<Name>()), None),
    desc(NGM_RMHOOK, "rmhook", Some(ArgCodec::of::<RmHook>()), None),
    desc(NGM_NODEINFO, "nodeinfo", None, Some(ArgCodec::of::<NodeInfo>())),
    desc(NGM_LISTHOOKS, "listhooks", None, Some(ArgCodec::of::<HookList>())),
    desc(NGM_LISTNAMES, "listnames", None, Some(ArgCodec::of::<NameList>())),
    desc(NGM_LISTNODES, "listnodes", None, Some(ArgCodec::of::<NameList>())),
    desc(NGM_LISTTYPES, "listtypes", None, Some(ArgCodec::of::<TypeList>())),
    desc(NGM_TEXT_STATUS, "textstatus", None, Some(ArgCodec::of::<String>())),
    desc(NGM_BINARY2ASCII, "binary2ascii", None, None),
    desc(NGM_ASCII2BINARY, "ascii2binary", None, None),
    desc(NGM_TEXT_CONFIG, "textconfig", Some(ArgCodec::of::<String>()), Some(ArgCodec::of::<String>())),
];

// ---- request builders ----

fn generic(cmd: u32, name: &str) -> NgMesg {
    NgMesg::empty(NGM_GENERIC_COOKIE, cmd, name)
}

pub fn shutdown() -> NgMesg {
    generic(NGM_SHUTDOWN, "shutdown")
}

pub fn mkpeer(type_name: &str, ourhook: &str, peerhook: &str) -> NgResult<NgMesg> {
    let args = MkPeer {
        type_name: type_name.to_string(),
        ourhook: ourhook.to_string(),
        peerhook: peerhook.to_string(),
    };
    NgMesg::request(NGM_GENERIC_COOKIE, NGM_MKPEER, "mkpeer", &args)
}

pub fn connect(path: &str, ourhook: &str, peerhook: &str) -> NgResult<NgMesg> {
    let args = Connect {
        path: path.to_string(),
        ourhook: ourhook.to_string(),
        peerhook: peerhook.to_string(),
    };
    NgMesg::request(NGM_GENERIC_COOKIE, NGM_CONNECT, "connect", &args)
}

pub fn name(name: &str) -> NgResult<NgMesg> {
    let args = Name { name: name.to_string() };
    NgMesg::request(NGM_GENERIC_COOKIE, NGM_NAME, "name", &args)
}

pub fn rmhook(ourhook: &str) -> NgResult<NgMesg> {
    let args = RmHook {
        ourhook: ourhook.to_string(),
    };
    NgMesg::request(NGM_GENERIC_COOKIE, NGM_RMHOOK, "rmhook", &args)
}

pub fn nodeinfo() -> NgMesg {
    generic(NGM_NODEINFO, "nodeinfo").readonly()
}

pub fn listhooks() -> NgMesg {
    generic(NGM_LISTHOOKS, "listhooks").readonly()
}

pub fn listnames() -> NgMesg {
    generic(NGM_LISTNAMES, "listnames").readonly()
}

pub fn listnodes() -> NgMesg {
    generic(NGM_LISTNODES, "listnodes").readonly()
}

pub fn listtypes() -> NgMesg {
    generic(NGM_LISTTYPES, "listtypes").readonly()
}

pub fn text_status() -> NgMesg {
    generic(NGM_TEXT_STATUS, "textstatus").readonly()
}

pub fn text_config(text: &str) -> NgResult<NgMesg> {
    NgMesg::request(NGM_GENERIC_COOKIE, NGM_TEXT_CONFIG, "textconfig", &text.to_string())
}

/// Ask a node to render `msg` (binary) in ASCII form.
pub fn binary2ascii(msg: &NgMesg) -> NgMesg {
    NgMesg::new(NGM_GENERIC_COOKIE, NGM_BINARY2ASCII, "binary2ascii", msg.to_bytes()).readonly()
}

/// Ask a node to encode `msg` (ASCII form, command named by `cmdstr`).
pub fn ascii2binary(msg: &NgMesg) -> NgMesg {
    NgMesg::new(NGM_GENERIC_COOKIE, NGM_ASCII2BINARY, "ascii2binary", msg.to_bytes()).readonly()
}

/// ASCII request for `cmd` with JSON `args`, ready for [`ascii2binary`].
pub fn ascii_request(cmd: &str, args: &str) -> NgMesg {
    NgMesg::new(0, 0, cmd, args.as_bytes().to_vec())
}

// ---- handler ----

pub(crate) fn handle(ctx: &Ctx<'_>, env: Envelope, hook: Option<&HookRef>) -> NgResult<Reply> {
    let graph = ctx.graph();
    let node = ctx.node();
    let msg = &env.msg;

    match msg.cmd() {
        NGM_SHUTDOWN => {
            graph.rmnode(node);
            Ok(Reply::Ack)
        }
        NGM_MKPEER => {
            let args: MkPeer = msg.args()?;
            mkpeer_local(graph, node, &args)?;
            Ok(Reply::Ack)
        }
        NGM_CONNECT => {
            let args: Connect = msg.args()?;
            connect_phase1(ctx, &args, &env)?;
            Ok(Reply::Deferred)
        }
        NGM_NAME => {
            let args: Name = msg.args()?;
            graph.name_node(node, &args.name)?;
            Ok(Reply::Ack)
        }
        NGM_RMHOOK => {
            let args: RmHook = msg.args()?;
            graph.rmhook(node, &args.ourhook)?;
            Ok(Reply::Ack)
        }
        NGM_NODEINFO => Reply::encode(&node.info()),
        NGM_LISTHOOKS => {
            let links = node
                .hooks()
                .into_iter()
                .filter_map(|h| {
                    let peer = h.peer()?;
                    let peer_node = peer.node()?;
                    Some(LinkInfo {
                        ourhook: h.name().to_string(),
                        peerhook: peer.name().to_string(),
                        nodeinfo: peer_node.info(),
                    })
                })
                .collect();
            Reply::encode(&HookList {
                nodeinfo: node.info(),
                links,
            })
        }
        NGM_LISTNAMES | NGM_LISTNODES => {
            let named_only = msg.cmd() == NGM_LISTNAMES;
            let nodes = graph
                .nodes()
                .into_iter()
                .filter(|n| n.is_valid() && (!named_only || n.name().is_some()))
                .map(|n| n.info())
                .collect();
            Reply::encode(&NameList { nodes })
        }
        NGM_LISTTYPES => Reply::encode(&TypeList { types: graph.types() }),
        NGM_BINARY2ASCII => {
            let inner = NgMesg::from_bytes(&msg.data)?;
            let out = codec::binary_to_ascii(&inner, &command_lists(node))?;
            Ok(Reply::Args(out.to_bytes()))
        }
        NGM_ASCII2BINARY => {
            let inner = NgMesg::from_bytes(&msg.data)?;
            let out = codec::ascii_to_binary(&inner, &command_lists(node))?;
            Ok(Reply::Args(out.to_bytes()))
        }
        // text config/status and anything unknown belong to the type
        _ => node.behavior().rcvmsg(ctx, env, hook),
    }
}

fn command_lists(node: &NodeRef) -> [&[CmdDesc]; 2] {
    [node.node_type().commands(), &GENERIC_COMMANDS]
}

/// Create a node of `args.type_name` and pair it with `node`. The new node
/// has no other activity yet, so everything runs here; any failure removes
/// whatever was built.
fn mkpeer_local(graph: &Graph, node: &NodeRef, args: &MkPeer) -> NgResult<()> {
    if !valid_name(&args.ourhook) || !valid_name(&args.peerhook) {
        return Err(NgError::Invalid);
    }
    let peer = graph.make_node(&args.type_name)?;

    let ours = match graph.add_hook(node, &args.ourhook) {
        Ok(h) => h,
        Err(e) => {
            graph.rmnode(&peer);
            return Err(e);
        }
    };
    let theirs = match graph.add_hook(&peer, &args.peerhook) {
        Ok(h) => h,
        Err(e) => {
            graph.destroy_hook(&ours);
            graph.rmnode(&peer);
            return Err(e);
        }
    };
    if let Err(e) = graph.connect_hooks(&ours, &theirs) {
        graph.destroy_hook(&ours);
        graph.destroy_hook(&theirs);
        graph.rmnode(&peer);
        return Err(e);
    }

    tracing::debug!(
        "[Generic] mkpeer {}:{} -> {} {}:{}",
        node.display_name(),
        args.ourhook,
        args.type_name,
        peer.id(),
        args.peerhook
    );
    Ok(())
}

/// State carried from phase to phase.
#[derive(Clone)]
struct PendingConnect {
    core: Weak<GraphCore>,
    local: HookRef,
    remote: HookRef,
    req: NgMesg,
    retaddr: Option<NodeId>,
}

impl PendingConnect {
    fn graph(&self) -> Option<Graph> {
        self.core.upgrade().map(Graph::from_core)
    }

    fn linked(&self) -> bool {
        self.local.is_peer_of(&self.remote) && self.remote.is_peer_of(&self.local)
    }

    /// Destroy the hook owned by the node we are on; the peer follows
    /// through its own node.
    fn abort(&self, graph: &Graph, on_remote: bool, err: NgError) {
        tracing::debug!(
            "[Generic] connect {} <-> {} aborted: {}",
            self.local.name(),
            self.remote.name(),
            err
        );
        let own = if on_remote { &self.remote } else { &self.local };
        graph.destroy_hook(own);
        graph.respond(&self.req, self.retaddr, Err(err));
    }
}

fn connect_phase1(ctx: &Ctx<'_>, args: &Connect, env: &Envelope) -> NgResult<()> {
    let graph = ctx.graph();
    let node = ctx.node();
    if !valid_name(&args.ourhook) || !valid_name(&args.peerhook) {
        return Err(NgError::Invalid);
    }
    let (remote_node, _) = graph.resolve_path(Some(node), &args.path)?;

    let local = graph.add_hook(node, &args.ourhook)?;
    let remote = Hook::new(&args.peerhook, &remote_node);
    if let Err(e) = graph.link_hooks(&local, &remote) {
        remote.take_node();
        graph.destroy_hook(&local);
        return Err(e);
    }

    let pending = PendingConnect {
        core: graph.downgrade(),
        local,
        remote,
        req: env.msg.clone(),
        retaddr: env.retaddr,
    };
    let on_fail = pending.clone();
    let item = Item::func(move |ctx, _| connect_phase2(ctx, pending))
        .to(remote_node, None)
        .on_complete(move |res| {
            if let Err(e) = res
                && let Some(graph) = on_fail.graph()
            {
                on_fail.abort(&graph, true, e);
            }
        });

    // a refused submission has already run the completion, which aborts
    let _ = graph.submit(item, SendFlags::QUEUE);
    Ok(())
}

/// On the remote node: validate, insert and connect its hook.
fn connect_phase2(ctx: &Ctx<'_>, p: PendingConnect) -> NgResult<()> {
    let graph = ctx.graph();
    let node = ctx.node();
    if !p.linked() {
        return Err(NgError::NetDown);
    }
    let name = p.remote.name().to_string();
    if node.find_hook(&name).is_some() {
        return Err(NgError::Exists);
    }
    node.behavior().newhook(ctx, &p.remote, &name)?;
    if !node.insert_hook(p.remote.clone()) {
        return Err(NgError::Exists);
    }
    node.behavior().connect(ctx, &p.remote)?;

    let local_node = p.local.node().ok_or(NgError::NetDown)?;
    let on_fail = p.clone();
    let item = Item::func(move |ctx, _| connect_phase3(ctx, p))
        .to(local_node, None)
        .on_complete(move |res| {
            if let Err(e) = res
                && let Some(graph) = on_fail.graph()
            {
                on_fail.abort(&graph, false, e);
            }
        });
    // failures are reported through the completion
    let _ = graph.submit(item, SendFlags::QUEUE);
    Ok(())
}

/// Back on the local node: its veto, then the pair goes live.
fn connect_phase3(ctx: &Ctx<'_>, p: PendingConnect) -> NgResult<()> {
    if !p.linked() {
        return Err(NgError::NetDown);
    }
    ctx.node().behavior().connect(ctx, &p.local)?;
    p.local.mark_valid();
    p.remote.mark_valid();
    tracing::debug!(
        "[Generic] connected {}:{} <-> {}",
        ctx.node().display_name(),
        p.local.name(),
        p.remote.name()
    );
    ctx.respond(&p.req, p.retaddr, Ok(Reply::Ack));
    Ok(())
}
