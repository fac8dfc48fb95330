use crate::config::GraphConfig;
use crate::error::{NgError, NgResult};
use crate::graph::hook::{Hook, HookRef};
use crate::graph::item::{Envelope, Item, Payload, RwClass, SendFlags};
use crate::graph::node::{Node, NodeId, NodeRef};
use crate::graph::ntype::{NodeBehavior, NodeType, Reply, TypeEntry};
use crate::graph::path::{NodeAddr, parse_node_addr, parse_path, valid_node_name};
use crate::graph::queue::Admission;
use crate::graph::sched::{WorkerPool, Worklist};
use crate::graph::valid_name;
use crate::msg::NgMesg;
use crate::msg::generic::{self, NGM_GENERIC_COOKIE};
use crate::msg::types::TypeInfo;
use crate::utils::{HealthFlag, SharedStr};
use ahash::AHashMap;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::sync::{Arc, Weak};
use std::time::Duration;

thread_local! {
    /// Inline dispatch nesting on this thread.
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    #[inline]
    fn enter() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }

    #[inline]
    fn current() -> u32 {
        DEPTH.with(|d| d.get())
    }
}

impl Drop for DepthGuard {
    #[inline]
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Registries, worklist and workers of one graph.
pub struct GraphCore {
    cfg: GraphConfig,
    types: RwLock<AHashMap<SharedStr, Arc<TypeEntry>>>,
    ids: RwLock<AHashMap<NodeId, NodeRef>>,
    names: RwLock<AHashMap<SharedStr, NodeRef>>,
    /// Serializes peer link changes so both ends of a pair move together.
    topology: Mutex<()>,
    pub(crate) worklist: Worklist,
    workers: WorkerPool,
    running: HealthFlag,
}

impl Drop for GraphCore {
    fn drop(&mut self) {
        self.workers.stop();
        self.names.get_mut().clear();
        let nodes: Vec<NodeRef> = self.ids.get_mut().drain().map(|(_, n)| n).collect();
        // hooks point at their node and at each other; cut every link
        for node in nodes {
            node.mark_invalid();
            for mut item in node.queue.flush() {
                if let Some(done) = item.take_completion() {
                    done(Err(NgError::NetDown));
                }
            }
            for hook in node.take_hooks() {
                hook.mark_invalid();
                hook.take_peer();
                hook.take_node();
            }
        }
        while self.worklist.try_pop().is_some() {}
    }
}

/// Handle to a node graph. Clones share the same graph.
///
/// A graph owns the type registry, the node name and id tables, the
/// worklist and (when configured) the worker threads draining it. Without
/// workers the embedder drives dispatch with [`Graph::run_pending`].
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphCore>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("types", &self.inner.types.read().len())
            .field("nodes", &self.inner.ids.read().len())
            .field("workers", &self.inner.workers.len())
            .field("running", &self.inner.running.get())
            .finish()
    }
}

impl Graph {
    pub fn new(cfg: GraphConfig) -> anyhow::Result<Self> {
        let inner = Arc::new(GraphCore {
            cfg,
            types: RwLock::new(AHashMap::new()),
            ids: RwLock::new(AHashMap::new()),
            names: RwLock::new(AHashMap::new()),
            topology: Mutex::new(()),
            worklist: Worklist::new(),
            workers: WorkerPool::new(),
            running: HealthFlag::new(true),
        });

        inner
            .workers
            .spawn(Arc::downgrade(&inner), &inner.cfg)
            .map_err(|e| anyhow::anyhow!("failed to start worklist workers: {e}"))?;

        tracing::info!(
            "[Graph] started with {} worker(s), stack depth {}",
            inner.cfg.worker_threads,
            inner.cfg.max_stack_depth
        );
        Ok(Self { inner })
    }

    pub(crate) fn from_core(inner: Arc<GraphCore>) -> Self {
        Self { inner }
    }

    pub(crate) fn core(&self) -> &GraphCore {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> Weak<GraphCore> {
        Arc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.cfg
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    // ---- types ----

    pub fn register_type<T: NodeType>(&self, ntype: T) -> NgResult<()> {
        let name = ntype.name().to_string();
        if !valid_name(&name) {
            return Err(NgError::Invalid);
        }
        let mut types = self.inner.types.write();
        if types.contains_key(name.as_str()) {
            return Err(NgError::Exists);
        }
        let entry = Arc::new(TypeEntry::new(Box::new(ntype)));
        types.insert(entry.name.clone(), entry);
        tracing::info!("[Graph] registered type {}", name);
        Ok(())
    }

    /// Fails with `Busy` while nodes of the type exist.
    pub fn unregister_type(&self, name: &str) -> NgResult<()> {
        let mut types = self.inner.types.write();
        let entry = types.get(name).ok_or(NgError::NotFound)?;
        if entry.live() > 0 {
            return Err(NgError::Busy);
        }
        types.remove(name);
        tracing::info!("[Graph] unregistered type {}", name);
        Ok(())
    }

    pub fn find_type(&self, name: &str) -> Option<TypeInfo> {
        self.inner.types.read().get(name).map(|e| TypeInfo {
            type_name: e.name.to_string(),
            numnodes: e.live() as u32,
        })
    }

    pub fn types(&self) -> Vec<TypeInfo> {
        let mut list: Vec<TypeInfo> = self
            .inner
            .types
            .read()
            .values()
            .map(|e| TypeInfo {
                type_name: e.name.to_string(),
                numnodes: e.live() as u32,
            })
            .collect();
        list.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        list
    }

    // ---- nodes ----

    /// New node of a registered type, built by the type's constructor.
    pub fn make_node(&self, type_name: &str) -> NgResult<NodeRef> {
        let entry = self.claim_type(type_name)?;
        match entry.ntype.construct() {
            Ok(behavior) => Ok(self.install_node(entry, behavior)),
            Err(e) => {
                entry.dec_live();
                tracing::debug!("[Graph] constructor of {} failed: {}", type_name, e);
                Err(e)
            }
        }
    }

    /// New node of a registered type with caller-built state, for types
    /// whose instances need outside resources (see `nodes::port`).
    pub fn make_node_with(&self, type_name: &str, behavior: Box<dyn NodeBehavior>) -> NgResult<NodeRef> {
        let entry = self.claim_type(type_name)?;
        Ok(self.install_node(entry, behavior))
    }

    fn claim_type(&self, type_name: &str) -> NgResult<Arc<TypeEntry>> {
        let types = self.inner.types.read();
        let entry = types.get(type_name).ok_or(NgError::NotFound)?;
        // counted under the read lock so unregister cannot slip in between
        entry.inc_live();
        Ok(entry.clone())
    }

    fn install_node(&self, entry: Arc<TypeEntry>, behavior: Box<dyn NodeBehavior>) -> NodeRef {
        let mut ids = self.inner.ids.write();
        let id = loop {
            let raw: u32 = rand::random();
            if raw != 0 && !ids.contains_key(&NodeId(raw)) {
                break NodeId(raw);
            }
        };
        let node = Arc::new(Node::new(id, entry, behavior));
        ids.insert(id, node.clone());
        drop(ids);

        tracing::debug!("[Graph] created node {} of type {}", id, node.type_name());
        node
    }

    /// Names a node. A name is set once and must be unique.
    pub fn name_node(&self, node: &NodeRef, name: &str) -> NgResult<()> {
        if !valid_node_name(name) || node.name().is_some() {
            return Err(NgError::Invalid);
        }
        let mut names = self.inner.names.write();
        if !node.is_valid() {
            return Err(NgError::Invalid);
        }
        if names.contains_key(name) {
            return Err(NgError::AddrInUse);
        }
        let key = SharedStr::new(name);
        if !node.set_name(key.clone()) {
            return Err(NgError::Invalid);
        }
        names.insert(key, node.clone());
        Ok(())
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<NodeRef> {
        self.inner.ids.read().get(&id).cloned()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeRef> {
        self.inner.names.read().get(name).cloned()
    }

    /// Node by name or `[hexid]`.
    pub fn find_node(&self, addr: &str) -> NgResult<NodeRef> {
        match parse_node_addr(addr)? {
            NodeAddr::Id(id) => self.node_by_id(id).ok_or(NgError::NotFound),
            NodeAddr::Name(name) => self.node_by_name(name).ok_or(NgError::NotFound),
            NodeAddr::Here => Err(NgError::Invalid),
        }
    }

    /// Snapshot of all live nodes, ordered by id.
    pub fn nodes(&self) -> Vec<NodeRef> {
        let mut nodes: Vec<NodeRef> = self.inner.ids.read().values().cloned().collect();
        nodes.sort_by_key(|n| n.id());
        nodes
    }

    /// Tear a node down now: fail its queued items, destroy its hooks, run
    /// the type's shutdown and forget it. A second call is a no-op.
    pub fn rmnode(&self, node: &NodeRef) {
        if !node.mark_invalid() {
            return;
        }
        tracing::debug!("[Graph] shutting down node {}", node.display_name());

        for item in node.queue.flush() {
            self.fail_item(item, NgError::NetDown);
        }

        loop {
            let hooks = node.hooks();
            if hooks.is_empty() {
                break;
            }
            for hook in hooks {
                self.destroy_hook(&hook);
            }
        }

        node.behavior().shutdown(&Ctx::new(self, node));

        if let Some(name) = node.name() {
            let mut names = self.inner.names.write();
            if names.get(name).is_some_and(|n| Arc::ptr_eq(n, node)) {
                names.remove(name);
            }
        }
        self.inner.ids.write().remove(&node.id());
        node.type_entry().dec_live();
    }

    /// Queue the node's teardown behind the work already admitted to it.
    pub fn shutdown_node(&self, node: &NodeRef) -> NgResult<()> {
        self.send_fn(
            node,
            None,
            |ctx, _| {
                ctx.graph().rmnode(ctx.node());
                Ok(())
            },
            SendFlags::QUEUE,
        )
    }

    // ---- hooks ----

    /// Adds an unpaired, invalid hook after the type accepted it.
    pub fn add_hook(&self, node: &NodeRef, name: &str) -> NgResult<HookRef> {
        if !valid_name(name) || !node.is_valid() {
            return Err(NgError::Invalid);
        }
        if node.find_hook(name).is_some() {
            return Err(NgError::Exists);
        }

        let hook = Hook::new(name, node);
        let ctx = Ctx::new(self, node);
        if let Err(e) = node.behavior().newhook(&ctx, &hook, name) {
            hook.take_node();
            return Err(e);
        }
        if !node.insert_hook(hook.clone()) {
            hook.take_node();
            return Err(NgError::Exists);
        }
        Ok(hook)
    }

    /// Cross-link two unpaired hooks.
    pub(crate) fn link_hooks(&self, h1: &HookRef, h2: &HookRef) -> NgResult<()> {
        let _topo = self.inner.topology.lock();
        if h1.peer().is_some() || h2.peer().is_some() || h1.node().is_none() || h2.node().is_none() {
            return Err(NgError::Invalid);
        }
        h1.set_peer(Some(h2.clone()));
        h2.set_peer(Some(h1.clone()));
        Ok(())
    }

    /// Pair two unpaired hooks whose nodes are both idle or owned by the
    /// caller. Both sides' connect callbacks run before the pair is usable;
    /// a veto destroys both hooks.
    pub fn connect_hooks(&self, h1: &HookRef, h2: &HookRef) -> NgResult<()> {
        self.link_hooks(h1, h2)?;

        for hook in [h1, h2] {
            let Some(node) = hook.node() else {
                self.destroy_hook(h1);
                return Err(NgError::NetDown);
            };
            if let Err(e) = node.behavior().connect(&Ctx::new(self, &node), hook) {
                tracing::debug!("[Graph] connect of {} vetoed: {}", hook.name(), e);
                self.destroy_hook(h1);
                return Err(e);
            }
        }

        h1.mark_valid();
        h2.mark_valid();
        Ok(())
    }

    /// Destroys `hook` and, through its own node's queue, its peer.
    pub fn destroy_hook(&self, hook: &HookRef) {
        hook.mark_invalid();

        let peer = {
            let _topo = self.inner.topology.lock();
            let peer = hook.take_peer();
            if let Some(p) = &peer
                && hook.is_peer_of(p)
            {
                p.set_peer(None);
            }
            peer
        };

        if let Some(peer) = peer {
            peer.mark_invalid();
            self.rmhook_self(peer);
        }

        if let Some(node) = hook.take_node()
            && node.remove_hook(hook)
        {
            node.behavior().disconnect(&Ctx::new(self, &node), hook);
        }
        hook.clear_private();
    }

    /// Ask the hook's node to destroy it under its own gate.
    fn rmhook_self(&self, hook: HookRef) {
        let Some(node) = hook.node() else {
            return;
        };
        if !node.is_valid() {
            // the node's own teardown takes care of the hook
            return;
        }
        let res = self.send_fn(
            &node,
            None,
            move |ctx, _| {
                ctx.graph().destroy_hook(&hook);
                Ok(())
            },
            SendFlags::NONE,
        );
        if let Err(e) = res {
            tracing::debug!("[Graph] peer hook removal on {} failed: {}", node.display_name(), e);
        }
    }

    pub fn find_hook(&self, node: &NodeRef, name: &str) -> Option<HookRef> {
        node.find_hook(name)
    }

    pub fn rmhook(&self, node: &NodeRef, name: &str) -> NgResult<()> {
        let hook = node.find_hook(name).ok_or(NgError::NotFound)?;
        self.destroy_hook(&hook);
        Ok(())
    }

    // ---- addressing ----

    /// Resolve `path` relative to `here`. Returns the destination node and,
    /// when hooks were traversed, the hook an item arrives over.
    pub fn resolve_path(&self, here: Option<&NodeRef>, path: &str) -> NgResult<(NodeRef, Option<HookRef>)> {
        let parsed = parse_path(path)?;
        let mut node = match parsed.node {
            NodeAddr::Here => here.cloned().ok_or(NgError::Invalid)?,
            NodeAddr::Id(id) => self.node_by_id(id).ok_or(NgError::NotFound)?,
            NodeAddr::Name(name) => self.node_by_name(name).ok_or(NgError::NotFound)?,
        };
        if !node.is_valid() {
            return Err(NgError::NotFound);
        }

        let mut arrival = None;
        for name in parsed.hooks {
            let hook = node.find_hook(name).ok_or(NgError::NotFound)?;
            let peer = hook.peer().ok_or(NgError::NotFound)?;
            if !hook.is_valid() || !peer.is_valid() {
                return Err(NgError::NotFound);
            }
            let next = peer.node().ok_or(NgError::NotFound)?;
            if !next.is_valid() {
                return Err(NgError::NotFound);
            }
            node = next;
            arrival = Some(peer);
        }
        Ok((node, arrival))
    }

    /// Address `item` to the far side of `hook`.
    pub fn address_hook(&self, item: Item, hook: &HookRef) -> NgResult<Item> {
        let peer = hook.peer().ok_or(NgError::NotConnected)?;
        if !hook.is_valid() || !peer.is_valid() {
            return Err(NgError::NotConnected);
        }
        let node = peer.node().ok_or(NgError::NotConnected)?;
        Ok(item.to(node, Some(peer)))
    }

    pub fn address_path(&self, item: Item, here: Option<&NodeRef>, path: &str) -> NgResult<Item> {
        let (node, hook) = self.resolve_path(here, path)?;
        Ok(item.to(node, hook))
    }

    pub fn address_id(&self, item: Item, id: NodeId) -> NgResult<Item> {
        let node = self.node_by_id(id).ok_or(NgError::NotFound)?;
        Ok(item.to(node, None))
    }

    // ---- submission ----

    /// Single entry point for all work. Runs the item inline when the
    /// destination's gate admits it, queues it otherwise.
    ///
    /// Returns the handler's result for inline runs, `Ok` (or `InProgress`
    /// with [`SendFlags::PROGRESS`]) when queued. An item that cannot be
    /// delivered has its completion called with the error.
    pub fn submit(&self, mut item: Item, flags: SendFlags) -> NgResult<()> {
        let Some(node) = item.node.clone() else {
            self.fail_item(item, NgError::Invalid);
            return Err(NgError::Invalid);
        };
        if !node.is_valid() {
            self.fail_item(item, NgError::NetDown);
            return Err(NgError::NetDown);
        }
        if let Payload::Data(_) = item.payload {
            let err = match &item.hook {
                None => Some(NgError::Invalid),
                Some(h) if !h.is_valid() => Some(NgError::NotConnected),
                Some(_) => None,
            };
            if let Some(err) = err {
                self.fail_item(item, err);
                return Err(err);
            }
        }

        let hook_writer = item.hook.as_ref().is_some_and(|h| h.is_force_writer());
        if node.is_force_writer() || hook_writer {
            item.rw = RwClass::Writer;
        }
        let force_queue = flags.contains(SendFlags::QUEUE)
            || item.hook.as_ref().is_some_and(|h| h.is_force_queue())
            || DepthGuard::current() >= self.inner.cfg.max_stack_depth;

        match node.queue.acquire(item, force_queue) {
            Admission::Run(item) => {
                let rw = item.rw();
                let result = {
                    let _depth = DepthGuard::enter();
                    self.dispatch(&node, item)
                };
                if node.queue.release(rw) {
                    self.arm(node);
                }
                result
            }
            Admission::Queued { arm } => {
                if arm {
                    self.arm(node);
                }
                if flags.contains(SendFlags::PROGRESS) {
                    Err(NgError::InProgress)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Data out of `hook` to its peer.
    pub fn send_data(&self, hook: &HookRef, data: impl Into<Bytes>) -> NgResult<()> {
        let item = self.address_hook(Item::data(data), hook)?;
        self.submit(item, SendFlags::NONE)
    }

    /// Request from `from` to the node at `path`; the response comes back to `from`.
    pub fn send_msg_path(&self, from: &NodeRef, path: &str, msg: NgMesg) -> NgResult<()> {
        let item = self.address_path(Item::msg(msg, Some(from.id())), Some(from), path)?;
        self.submit(item, SendFlags::NONE)
    }

    pub fn send_msg_id(&self, from: &NodeRef, id: NodeId, msg: NgMesg) -> NgResult<()> {
        let item = self.address_id(Item::msg(msg, Some(from.id())), id)?;
        self.submit(item, SendFlags::NONE)
    }

    /// Message across `hook`, arriving on its peer.
    pub fn send_msg_hook(&self, hook: &HookRef, msg: NgMesg) -> NgResult<()> {
        let retaddr = hook.node().map(|n| n.id());
        let item = self.address_hook(Item::msg(msg, retaddr), hook)?;
        self.submit(item, SendFlags::NONE)
    }

    /// Run `f` on `node` under its gate, as a writer.
    pub fn send_fn<F>(&self, node: &NodeRef, hook: Option<HookRef>, f: F, flags: SendFlags) -> NgResult<()>
    where
        F: FnOnce(&Ctx<'_>, Option<&HookRef>) -> NgResult<()> + Send + 'static,
    {
        self.submit(Item::func(f).to(node.clone(), hook), flags)
    }

    /// Answer `req` to `retaddr`. Responses themselves are never answered.
    pub fn respond(&self, req: &NgMesg, retaddr: Option<NodeId>, reply: NgResult<Reply>) {
        if req.is_response() {
            return;
        }
        let Some(retaddr) = retaddr else {
            return;
        };
        let resp = match reply {
            Ok(Reply::Deferred) => return,
            Ok(Reply::Ack) => req.response(Bytes::new(), 0),
            Ok(Reply::Args(args)) => req.response(args, 0),
            Err(e) => req.response(Bytes::new(), e.errno()),
        };
        let Some(node) = self.node_by_id(retaddr) else {
            tracing::debug!("[Graph] response to vanished node {} dropped", retaddr);
            return;
        };
        if let Err(e) = self.submit(Item::msg(resp, None).to(node, None), SendFlags::NONE) {
            tracing::debug!("[Graph] response to {} failed: {}", retaddr, e);
        }
    }

    fn fail_item(&self, mut item: Item, err: NgError) {
        if let Some(done) = item.take_completion() {
            done(Err(err));
        }
        if let Payload::Message(env) = item.payload {
            self.respond(&env.msg, env.retaddr, Err(err));
        }
    }

    // ---- dispatch ----

    #[inline]
    fn arm(&self, node: NodeRef) {
        self.inner.worklist.push(node);
    }

    /// Drain the worklist on the calling thread. Returns the number of
    /// node visits made.
    pub fn run_pending(&self) -> usize {
        let mut visits = 0;
        while let Some(node) = self.inner.worklist.try_pop() {
            self.visit(node);
            visits += 1;
        }
        visits
    }

    /// Wait until the worklist is empty and no node has queued items, or
    /// `timeout` passes. Returns whether the graph went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let backoff = crossbeam::utils::Backoff::new();
        loop {
            if self.inner.workers.len() == 0 {
                self.run_pending();
            }
            let busy = self.inner.worklist.len() > 0
                || self.inner.ids.read().values().any(|n| {
                    let gate = n.queue.gate();
                    gate.pending || gate.writer_active || gate.readers > 0
                });
            if !busy {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            if backoff.is_completed() {
                std::thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    /// One worklist visit: dispatch queued items while the gate admits them.
    pub(crate) fn visit(&self, node: NodeRef) {
        node.queue.begin_visit();
        let limit = self.inner.cfg.max_drain_per_node.unwrap_or(usize::MAX);
        let mut done = 0usize;

        while done < limit {
            let Some(item) = node.queue.dequeue() else {
                break;
            };
            let rw = item.rw();
            {
                let _depth = DepthGuard::enter();
                let _ = self.dispatch(&node, item);
            }
            if node.queue.release(rw) {
                self.arm(node.clone());
            }
            done += 1;
        }

        if done >= limit && node.queue.rearm() {
            self.arm(node);
        }
    }

    fn dispatch(&self, node: &NodeRef, mut item: Item) -> NgResult<()> {
        let completion = item.take_completion();
        let result = self.apply(node, item);
        if let Some(done) = completion {
            done(result);
        }
        result
    }

    fn apply(&self, node: &NodeRef, item: Item) -> NgResult<()> {
        let ctx = Ctx::new(self, node);
        let Item { payload, hook, .. } = item;

        match payload {
            Payload::Data(data) => match hook {
                Some(h) if h.is_valid() => node.behavior().rcvdata(&ctx, &h, data),
                _ => {
                    crate::debug_throttled!(
                        Duration::from_secs(5),
                        "[Graph] data for {} dropped on a dead hook",
                        node.display_name()
                    );
                    Err(NgError::NetDown)
                }
            },
            Payload::Message(env) => self.apply_msg(&ctx, env, hook.as_ref()),
            Payload::Function(f) => {
                if node.is_valid() {
                    f(&ctx, hook.as_ref())
                } else {
                    Err(NgError::NetDown)
                }
            }
        }
    }

    fn apply_msg(&self, ctx: &Ctx<'_>, env: Envelope, hook: Option<&HookRef>) -> NgResult<()> {
        let node = ctx.node();
        if env.msg.is_response() {
            // nobody to report a failure to
            let _ = node.behavior().rcvmsg(ctx, env, hook);
            return Ok(());
        }
        if hook.is_some_and(|h| !h.is_valid()) {
            self.respond(&env.msg, env.retaddr, Err(NgError::NetDown));
            return Err(NgError::NetDown);
        }

        let req = env.msg.clone();
        let retaddr = env.retaddr;
        let reply = if req.cookie() == NGM_GENERIC_COOKIE {
            generic::handle(ctx, env, hook)
        } else {
            node.behavior().rcvmsg(ctx, env, hook)
        };

        let result = match &reply {
            Ok(_) => Ok(()),
            Err(e) => Err(*e),
        };
        self.respond(&req, retaddr, reply);
        result
    }

    /// Stop the workers and destroy every node. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.running.take_down() {
            return;
        }
        tracing::info!("[Graph] shutting down");
        self.inner.workers.stop();
        for node in self.nodes() {
            self.rmnode(&node);
        }
        while self.inner.worklist.try_pop().is_some() {}
    }
}

/// What a node callback gets to act on the graph: the graph handle and the
/// node the callback runs on.
pub struct Ctx<'a> {
    graph: &'a Graph,
    node: &'a NodeRef,
}

impl<'a> Ctx<'a> {
    pub(crate) fn new(graph: &'a Graph, node: &'a NodeRef) -> Self {
        Self { graph, node }
    }

    #[inline]
    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    #[inline]
    pub fn node(&self) -> &'a NodeRef {
        self.node
    }

    pub fn find_hook(&self, name: &str) -> Option<HookRef> {
        self.node.find_hook(name)
    }

    pub fn send_data(&self, hook: &HookRef, data: impl Into<Bytes>) -> NgResult<()> {
        self.graph.send_data(hook, data)
    }

    /// Request to `path` (relative to this node); the response comes back here.
    pub fn send_msg(&self, path: &str, msg: NgMesg) -> NgResult<()> {
        self.graph.send_msg_path(self.node, path, msg)
    }

    pub fn send_msg_hook(&self, hook: &HookRef, msg: NgMesg) -> NgResult<()> {
        self.graph.send_msg_hook(hook, msg)
    }

    pub fn respond(&self, req: &NgMesg, retaddr: Option<NodeId>, reply: NgResult<Reply>) {
        self.graph.respond(req, retaddr, reply)
    }

    pub fn destroy_hook(&self, hook: &HookRef) {
        self.graph.destroy_hook(hook)
    }

    /// Queue this node's own shutdown.
    pub fn rmnode_self(&self) -> NgResult<()> {
        self.graph.shutdown_node(self.node)
    }
}
