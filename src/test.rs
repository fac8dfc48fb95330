#[cfg(test)]
mod tests {
    use crate::msg::generic::{self, NGM_GENERIC_COOKIE};
    use crate::nodes::hole::{HoleStats, NGM_HOLE_COOKIE, NGM_HOLE_GET_STATS};
    use crate::prelude::*;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn manual_graph() -> Graph {
        let g = Graph::new(GraphConfig::default()).expect("graph");
        register_all(&g).expect("builtin types");
        g
    }

    fn threaded_graph(workers: usize) -> Graph {
        let g = Graph::new(GraphConfig::with_workers(workers)).expect("graph");
        register_all(&g).expect("builtin types");
        g
    }

    fn id_path(node: &NodeRef) -> String {
        format!("{}:", node.id())
    }

    // ---- recording node type

    #[derive(Default)]
    struct ProbeState {
        data: Mutex<Vec<(String, Bytes)>>,
        order: Mutex<Vec<u8>>,
        disconnects: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    struct ProbeType {
        name: &'static str,
        state: Arc<ProbeState>,
        veto_newhook: Option<NgError>,
        veto_connect: Option<NgError>,
    }

    impl ProbeType {
        fn new(name: &'static str) -> (Self, Arc<ProbeState>) {
            let state = Arc::new(ProbeState::default());
            (
                Self {
                    name,
                    state: state.clone(),
                    veto_newhook: None,
                    veto_connect: None,
                },
                state,
            )
        }
    }

    impl NodeType for ProbeType {
        fn name(&self) -> &str {
            self.name
        }

        fn construct(&self) -> NgResult<Box<dyn NodeBehavior>> {
            Ok(Box::new(Probe {
                state: self.state.clone(),
                veto_newhook: self.veto_newhook,
                veto_connect: self.veto_connect,
            }))
        }
    }

    struct Probe {
        state: Arc<ProbeState>,
        veto_newhook: Option<NgError>,
        veto_connect: Option<NgError>,
    }

    impl NodeBehavior for Probe {
        fn newhook(&self, _ctx: &Ctx<'_>, _hook: &HookRef, _name: &str) -> NgResult<()> {
            self.veto_newhook.map_or(Ok(()), Err)
        }

        fn connect(&self, _ctx: &Ctx<'_>, _hook: &HookRef) -> NgResult<()> {
            self.veto_connect.map_or(Ok(()), Err)
        }

        fn rcvdata(&self, _ctx: &Ctx<'_>, hook: &HookRef, data: Bytes) -> NgResult<()> {
            if let Some(tag) = data.first() {
                self.state.order.lock().push(*tag);
            }
            self.state.data.lock().push((hook.name().to_string(), data));
            Ok(())
        }

        fn disconnect(&self, _ctx: &Ctx<'_>, _hook: &HookRef) {
            self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn shutdown(&self, _ctx: &Ctx<'_>) {
            self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// `src:out` (a hole) paired with `dst:in`.
    fn wire(g: &Graph, dst: &NodeRef) -> HookRef {
        let src = g.make_node("hole").expect("hole");
        let out = g.add_hook(&src, "out").expect("out");
        let inp = g.add_hook(dst, "in").expect("in");
        g.connect_hooks(&out, &inp).expect("connect");
        out
    }

    // ---- hooks

    #[test]
    fn add_hook_then_find_and_reject_duplicates() {
        let g = manual_graph();
        let n = g.make_node("hole").unwrap();

        let h = g.add_hook(&n, "in").unwrap();
        let found = g.find_hook(&n, "in").expect("hook present");
        assert!(Arc::ptr_eq(&found, &h));
        assert!(!h.is_valid(), "unpaired hooks are not usable");
        assert!(h.peer().is_none());

        assert_eq!(g.add_hook(&n, "in").unwrap_err(), NgError::Exists);
        assert_eq!(g.add_hook(&n, "a.b").unwrap_err(), NgError::Invalid);
        assert_eq!(g.add_hook(&n, "").unwrap_err(), NgError::Invalid);
        assert_eq!(n.numhooks(), 1);
    }

    #[test]
    fn newhook_veto_leaves_nothing_behind() {
        let g = manual_graph();
        let n = g.make_node("relay").unwrap();
        assert_eq!(g.add_hook(&n, "middle").unwrap_err(), NgError::Invalid);
        assert!(g.find_hook(&n, "middle").is_none());
        assert!(g.add_hook(&n, "left").is_ok());
    }

    #[test]
    fn destroying_one_end_destroys_the_pair() {
        let g = manual_graph();
        let port = ControlPort::open(&g).unwrap();

        let resp = port
            .request(".", generic::mkpeer("hole", "sink", "in").unwrap(), WAIT)
            .unwrap();
        assert!(resp.is_response());
        assert_eq!(resp.error(), None);

        let sink = port.node().find_hook("sink").expect("local hook");
        assert!(sink.is_valid());
        let hole = sink.peer_node().expect("peer node");
        assert_eq!(hole.type_name(), "hole");
        assert!(hole.find_hook("in").unwrap().is_valid());

        g.destroy_hook(&sink);
        g.run_pending();

        assert!(port.node().find_hook("sink").is_none());
        assert!(hole.find_hook("in").is_none());
        assert!(sink.node().is_none() && sink.peer().is_none());
        // a hole with no hooks left removes itself
        assert!(g.node_by_id(hole.id()).is_none());
    }

    #[test]
    fn rmhook_message_removes_both_ends() {
        let g = manual_graph();
        let (probe, state) = ProbeType::new("probe");
        g.register_type(probe).unwrap();
        let p = g.make_node("probe").unwrap();
        let out = wire(&g, &p);
        let src = out.node().unwrap();
        let port = ControlPort::open(&g).unwrap();

        let resp = port
            .request(&id_path(&src), generic::rmhook("out").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), None);
        g.run_pending();

        assert!(src.find_hook("out").is_none());
        assert!(p.find_hook("in").is_none());
        assert_eq!(state.disconnects.load(Ordering::SeqCst), 1);

        let resp = port
            .request(&id_path(&p), generic::rmhook("in").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), Some(NgError::NotFound));
    }

    // ---- addressing

    #[test]
    fn paths_resolve_along_hook_chains() {
        let g = manual_graph();
        let port = ControlPort::open(&g).unwrap();

        port.request(".", generic::mkpeer("relay", "r", "left").unwrap(), WAIT)
            .unwrap();
        let resp = port.request("r", generic::name("mid").unwrap(), WAIT).unwrap();
        assert_eq!(resp.error(), None);
        let resp = port
            .request("mid:", generic::mkpeer("hole", "right", "in").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), None);

        let relay = g.node_by_name("mid").expect("named relay");
        let (n, h) = g.resolve_path(None, "mid:").unwrap();
        assert!(Arc::ptr_eq(&n, &relay));
        assert!(h.is_none());

        let (hole, arrival) = g.resolve_path(None, "mid:right").unwrap();
        assert_eq!(hole.type_name(), "hole");
        assert_eq!(arrival.unwrap().name(), "in");

        let from_port = format!("{}r.right", port.path());
        let (again, _) = g.resolve_path(None, &from_port).unwrap();
        assert!(Arc::ptr_eq(&again, &hole));

        let (relative, _) = g.resolve_path(Some(port.node()), "r").unwrap();
        assert!(Arc::ptr_eq(&relative, &relay));

        let (back, arrival) = g.resolve_path(None, "mid:left").unwrap();
        assert!(Arc::ptr_eq(&back, port.node()));
        assert_eq!(arrival.unwrap().name(), "r");

        assert_eq!(g.resolve_path(None, "mid:nope").unwrap_err(), NgError::NotFound);
        assert_eq!(g.resolve_path(None, "ghost:").unwrap_err(), NgError::NotFound);
        assert_eq!(g.resolve_path(None, "r").unwrap_err(), NgError::Invalid);
        assert_eq!(g.resolve_path(None, "mid:a..b").unwrap_err(), NgError::Invalid);
        assert_eq!(g.find_node(&hole.id().to_string()).unwrap().id(), hole.id());
    }

    #[test]
    fn node_names_are_unique_and_set_once() {
        let g = manual_graph();
        let a = g.make_node("hole").unwrap();
        let b = g.make_node("hole").unwrap();

        g.name_node(&a, "alpha").unwrap();
        assert_eq!(g.name_node(&a, "beta").unwrap_err(), NgError::Invalid);
        assert_eq!(g.name_node(&b, "alpha").unwrap_err(), NgError::AddrInUse);
        assert_eq!(g.name_node(&b, "[1234]").unwrap_err(), NgError::Invalid);
        assert_eq!(g.name_node(&b, "a.b").unwrap_err(), NgError::Invalid);
        assert_eq!(g.name_node(&b, "").unwrap_err(), NgError::Invalid);
        assert!(Arc::ptr_eq(&g.node_by_name("alpha").unwrap(), &a));

        g.rmnode(&a);
        assert!(g.node_by_name("alpha").is_none());
        g.name_node(&b, "alpha").unwrap();
    }

    // ---- type registry

    #[test]
    fn types_register_once_and_stay_while_used() {
        let g = manual_graph();
        assert_eq!(g.register_type(crate::nodes::hole::HoleType).unwrap_err(), NgError::Exists);
        assert_eq!(g.make_node("nosuch").unwrap_err(), NgError::NotFound);

        let n = g.make_node("hole").unwrap();
        assert_eq!(g.find_type("hole").unwrap().numnodes, 1);
        assert_eq!(g.unregister_type("hole").unwrap_err(), NgError::Busy);

        g.rmnode(&n);
        assert_eq!(g.find_type("hole").unwrap().numnodes, 0);
        g.unregister_type("hole").unwrap();
        assert_eq!(g.make_node("hole").unwrap_err(), NgError::NotFound);
        assert_eq!(g.unregister_type("hole").unwrap_err(), NgError::NotFound);
    }

    #[test]
    fn failed_constructor_does_not_leak_a_node() {
        let g = manual_graph();
        let before = g.nodes().len();
        assert_eq!(g.make_node("port").unwrap_err(), NgError::Invalid);
        assert_eq!(g.nodes().len(), before);
        assert_eq!(g.find_type("port").unwrap().numnodes, 0);
    }

    // ---- lifecycle

    #[test]
    fn rmnode_twice_is_a_no_op() {
        let g = manual_graph();
        let (probe, state) = ProbeType::new("probe");
        g.register_type(probe).unwrap();
        let p = g.make_node("probe").unwrap();
        let out = wire(&g, &p);

        g.rmnode(&p);
        g.rmnode(&p);
        g.run_pending();

        assert!(!p.is_valid());
        assert_eq!(state.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(state.disconnects.load(Ordering::SeqCst), 1);
        assert!(g.node_by_id(p.id()).is_none());
        assert_eq!(g.find_type("probe").unwrap().numnodes, 0);
        assert!(out.peer().is_none());
        assert_eq!(g.send_data(&out, Bytes::from_static(b"x")).unwrap_err(), NgError::NotConnected);
    }

    #[test]
    fn shutdown_flushes_queued_items_with_errors() {
        let g = manual_graph();
        let (probe, state) = ProbeType::new("probe");
        g.register_type(probe).unwrap();
        let p = g.make_node("probe").unwrap();
        let port = ControlPort::open(&g).unwrap();

        let results = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..3 {
            let results = results.clone();
            let item = Item::func(|_ctx, _| Ok(()))
                .to(p.clone(), None)
                .on_complete(move |res| results.lock().push(res));
            g.submit(item, SendFlags::QUEUE).unwrap();
        }
        let query = Item::msg(generic::nodeinfo(), Some(port.id())).to(p.clone(), None);
        g.submit(query, SendFlags::QUEUE).unwrap();
        assert_eq!(p.queued(), 4);

        g.rmnode(&p);
        assert_eq!(p.queued(), 0);
        assert_eq!(*results.lock(), vec![Err(NgError::NetDown); 3]);
        assert_eq!(state.shutdowns.load(Ordering::SeqCst), 1);

        let resp = port.try_recv_msg().expect("error response");
        assert_eq!(resp.cmd(), generic::NGM_NODEINFO);
        assert_eq!(resp.error(), Some(NgError::NetDown));

        // nothing new is admitted
        let late = Item::func(|_ctx, _| Ok(())).to(p.clone(), None);
        assert_eq!(g.submit(late, SendFlags::NONE).unwrap_err(), NgError::NetDown);
        g.run_pending();
    }

    #[test]
    fn graph_shutdown_removes_every_node() {
        let g = threaded_graph(2);
        let port = ControlPort::open(&g).unwrap();
        port.request(".", generic::mkpeer("echo", "e", "in").unwrap(), WAIT)
            .unwrap();
        assert_eq!(g.nodes().len(), 2);

        g.shutdown();
        g.shutdown();
        assert!(!g.is_running());
        assert!(g.nodes().is_empty());
        assert!(!port.node().is_valid());
    }

    // ---- submission and the gate

    #[test]
    fn queued_items_run_in_submission_order() {
        let g = manual_graph();
        let (probe, state) = ProbeType::new("probe");
        g.register_type(probe).unwrap();
        let p = g.make_node("probe").unwrap();
        let out = wire(&g, &p);

        fn record(
            state: &Arc<ProbeState>,
            tag: u8,
        ) -> impl FnOnce(&Ctx<'_>, Option<&HookRef>) -> NgResult<()> + Send + 'static {
            let state = state.clone();
            move |_ctx, _hook| {
                state.order.lock().push(tag);
                Ok(())
            }
        }

        g.send_fn(&p, None, record(&state, 1), SendFlags::QUEUE).unwrap();
        let r2 = g.address_hook(Item::data(vec![2u8]), &out).unwrap();
        g.submit(r2, SendFlags::QUEUE).unwrap();
        let r3 = g.address_hook(Item::data(vec![3u8]), &out).unwrap();
        g.submit(r3, SendFlags::QUEUE).unwrap();
        g.send_fn(&p, None, record(&state, 4), SendFlags::QUEUE).unwrap();
        let r5 = g.address_hook(Item::data(vec![5u8]), &out).unwrap();
        g.submit(r5, SendFlags::QUEUE).unwrap();

        assert!(state.order.lock().is_empty(), "queued items must not run inline");
        assert!(p.flags().on_worklist);
        g.run_pending();

        assert_eq!(*state.order.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(
            p.gate(),
            GateState {
                readers: 0,
                writer_active: false,
                pending: false
            }
        );
    }

    #[test]
    fn progress_flag_reports_queued_items() {
        let g = manual_graph();
        let n = g.make_node("hole").unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let done = Arc::new(Mutex::new(None));

        let (ran2, done2) = (ran.clone(), done.clone());
        let item = Item::func(move |_ctx, _| {
            ran2.store(true, Ordering::SeqCst);
            Ok(())
        })
        .to(n.clone(), None)
        .on_complete(move |res| *done2.lock() = Some(res));

        assert_eq!(
            g.submit(item, SendFlags::QUEUE | SendFlags::PROGRESS).unwrap_err(),
            NgError::InProgress
        );
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(g.run_pending(), 1);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(*done.lock(), Some(Ok(())));

        // an inline run reports the handler's own result
        let failing = Item::func(|_ctx, _| Err(NgError::Busy)).to(n.clone(), None);
        assert_eq!(g.submit(failing, SendFlags::PROGRESS).unwrap_err(), NgError::Busy);
    }

    #[test]
    fn stack_depth_limit_defers_to_the_worklist() {
        let cfg = GraphConfig {
            max_stack_depth: 0,
            ..GraphConfig::default()
        };
        let g = Graph::new(cfg).unwrap();
        register_all(&g).unwrap();
        let n = g.make_node("hole").unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();

        g.send_fn(
            &n,
            None,
            move |_ctx, _| {
                ran2.store(true, Ordering::SeqCst);
                Ok(())
            },
            SendFlags::NONE,
        )
        .unwrap();
        assert!(!ran.load(Ordering::SeqCst));
        g.run_pending();
        assert!(ran.load(Ordering::SeqCst));
    }

    struct GaugeType(Arc<Gauge>);

    #[derive(Default)]
    struct Gauge {
        readers: AtomicUsize,
        writers: AtomicUsize,
        violations: AtomicUsize,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl Gauge {
        fn read(&self) {
            self.readers.fetch_add(1, Ordering::SeqCst);
            if self.writers.load(Ordering::SeqCst) != 0 {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            for _ in 0..64 {
                std::hint::spin_loop();
            }
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.readers.fetch_sub(1, Ordering::SeqCst);
        }

        fn write(&self) {
            if self.writers.fetch_add(1, Ordering::SeqCst) != 0 || self.readers.load(Ordering::SeqCst) != 0 {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            for _ in 0..64 {
                std::hint::spin_loop();
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.writers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct GaugeNode(Arc<Gauge>);

    impl NodeType for GaugeType {
        fn name(&self) -> &str {
            "gauge"
        }

        fn construct(&self) -> NgResult<Box<dyn NodeBehavior>> {
            Ok(Box::new(GaugeNode(self.0.clone())))
        }
    }

    impl NodeBehavior for GaugeNode {
        fn rcvdata(&self, _ctx: &Ctx<'_>, _hook: &HookRef, _data: Bytes) -> NgResult<()> {
            self.0.read();
            Ok(())
        }
    }

    #[test]
    fn readers_and_writers_never_overlap() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 500;

        let g = threaded_graph(3);
        let gauge = Arc::new(Gauge::default());
        g.register_type(GaugeType(gauge.clone())).unwrap();
        let node = g.make_node("gauge").unwrap();
        let out = wire(&g, &node);

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let g = g.clone();
                let node = node.clone();
                let out = out.clone();
                let gauge = gauge.clone();
                thread::spawn(move || {
                    for i in 0..ROUNDS {
                        if (i + t) % 5 == 0 {
                            let gauge = gauge.clone();
                            g.send_fn(
                                &node,
                                None,
                                move |_ctx, _| {
                                    gauge.write();
                                    Ok(())
                                },
                                SendFlags::NONE,
                            )
                            .unwrap();
                        } else {
                            g.send_data(&out, Bytes::from_static(b"r")).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(g.wait_idle(WAIT));
        assert_eq!(gauge.violations.load(Ordering::SeqCst), 0);
        assert_eq!(
            gauge.reads.load(Ordering::SeqCst) + gauge.writes.load(Ordering::SeqCst),
            THREADS * ROUNDS
        );
        assert_eq!(gauge.writes.load(Ordering::SeqCst), THREADS * ROUNDS / 5);
        g.shutdown();
    }

    #[test]
    fn forced_writer_hook_serializes_data() {
        let g = manual_graph();
        let (probe, _state) = ProbeType::new("probe");
        g.register_type(probe).unwrap();
        let p = g.make_node("probe").unwrap();
        let out = wire(&g, &p);
        let inp = out.peer().unwrap();
        inp.force_writer();
        inp.force_queue();

        g.send_data(&out, vec![1u8]).unwrap();
        let gate = p.gate();
        assert!(gate.pending && !gate.writer_active);
        g.run_pending();
        assert_eq!(p.queued(), 0);
    }

    // ---- control messages

    #[test]
    fn mkpeer_relay_connect_delivers_data_end_to_end() {
        let g = manual_graph();
        let (probe, state) = ProbeType::new("probe");
        g.register_type(probe).unwrap();
        let port = ControlPort::open(&g).unwrap();

        let a = g.make_node("echo").unwrap();
        // B records instead of echoing, or the data would bounce through the relay forever
        let b = g.make_node("probe").unwrap();

        let resp = port
            .request(&id_path(&a), generic::mkpeer("relay", "mirror", "left").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), None);
        let mirror = a.find_hook("mirror").expect("mirror hook on A");
        let c = mirror.peer_node().expect("relay C");
        assert_eq!(c.type_name(), "relay");
        assert_eq!(mirror.peer().unwrap().name(), "left");

        let resp = port
            .request(&id_path(&c), generic::connect(&id_path(&b), "right", "in").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), None);
        assert_eq!(resp.cmd(), generic::NGM_CONNECT);
        let right = c.find_hook("right").unwrap();
        let inp = b.find_hook("in").unwrap();
        assert!(right.is_valid() && inp.is_valid());
        assert!(Arc::ptr_eq(&right.peer().unwrap(), &inp));

        g.send_data(&mirror, Bytes::from_static(b"hello")).unwrap();
        g.run_pending();

        let got = state.data.lock().clone();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "in");
        assert_eq!(got[0].1.len(), 5);
        assert_eq!(&got[0].1[..], b"hello");
    }

    #[test]
    fn vetoed_connect_removes_both_provisional_hooks() {
        let g = manual_graph();
        let (probe, _) = ProbeType::new("probe");
        let (mut vetoer, _) = ProbeType::new("vetoer");
        vetoer.veto_newhook = Some(NgError::Busy);
        g.register_type(probe).unwrap();
        g.register_type(vetoer).unwrap();
        let port = ControlPort::open(&g).unwrap();

        let a = g.make_node("probe").unwrap();
        let b = g.make_node("vetoer").unwrap();

        let resp = port
            .request(&id_path(&a), generic::connect(&id_path(&b), "out", "in").unwrap(), WAIT)
            .unwrap();
        g.run_pending();

        assert_eq!(resp.error(), Some(NgError::Busy));
        assert!(a.find_hook("out").is_none());
        assert!(b.find_hook("in").is_none());
        assert_eq!(a.numhooks() + b.numhooks(), 0);
    }

    #[test]
    fn vetoed_local_connect_unwinds_the_remote_side() {
        let g = manual_graph();
        let (mut picky, _) = ProbeType::new("picky");
        picky.veto_connect = Some(NgError::NoMemory);
        let (probe, state) = ProbeType::new("probe");
        g.register_type(picky).unwrap();
        g.register_type(probe).unwrap();
        let port = ControlPort::open(&g).unwrap();

        let a = g.make_node("picky").unwrap();
        let b = g.make_node("probe").unwrap();

        let resp = port
            .request(&id_path(&a), generic::connect(&id_path(&b), "out", "in").unwrap(), WAIT)
            .unwrap();
        g.run_pending();

        assert_eq!(resp.error(), Some(NgError::NoMemory));
        assert!(a.find_hook("out").is_none());
        assert!(b.find_hook("in").is_none());
        // the remote hook had been inserted, so its node saw it go
        assert_eq!(state.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remote_connect_veto_removes_the_inserted_hook() {
        let g = manual_graph();
        let (probe, local) = ProbeType::new("probe");
        let (mut refuser, remote) = ProbeType::new("refuser");
        refuser.veto_connect = Some(NgError::Busy);
        g.register_type(probe).unwrap();
        g.register_type(refuser).unwrap();
        let port = ControlPort::open(&g).unwrap();

        let a = g.make_node("probe").unwrap();
        let b = g.make_node("refuser").unwrap();

        let resp = port
            .request(&id_path(&a), generic::connect(&id_path(&b), "out", "in").unwrap(), WAIT)
            .unwrap();
        g.run_pending();

        assert_eq!(resp.error(), Some(NgError::Busy));
        assert_eq!(a.numhooks() + b.numhooks(), 0);
        assert_eq!(remote.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(local.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connect_to_a_taken_hook_name_fails() {
        let g = manual_graph();
        let port = ControlPort::open(&g).unwrap();
        let a = g.make_node("relay").unwrap();
        let b = g.make_node("relay").unwrap();
        g.name_node(&b, "bee").unwrap();
        g.add_hook(&b, "left").unwrap();

        let resp = port
            .request(&id_path(&a), generic::connect("bee:", "left", "left").unwrap(), WAIT)
            .unwrap();
        g.run_pending();
        assert_eq!(resp.error(), Some(NgError::Exists));
        assert!(a.find_hook("left").is_none());
        assert_eq!(b.numhooks(), 1);

        // the relay lost its only hook and removed itself
        assert!(g.node_by_id(a.id()).is_none());

        let resp = port
            .request("bee:", generic::connect("nobody:", "right", "x").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), Some(NgError::NotFound));
        assert_eq!(b.numhooks(), 1);
    }

    #[test]
    fn mkpeer_failures_unwind_the_new_node() {
        let g = manual_graph();
        let port = ControlPort::open(&g).unwrap();
        let before = g.nodes().len();

        // relay only accepts left/right
        let resp = port
            .request(".", generic::mkpeer("relay", "r", "middle").unwrap(), WAIT)
            .unwrap();
        g.run_pending();
        assert_eq!(resp.error(), Some(NgError::Invalid));
        assert!(port.node().find_hook("r").is_none());
        assert_eq!(g.nodes().len(), before);
        assert_eq!(g.find_type("relay").unwrap().numnodes, 0);

        let resp = port
            .request(".", generic::mkpeer("nosuch", "r", "x").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), Some(NgError::NotFound));
    }

    #[test]
    fn mkpeer_connect_veto_unwinds_the_new_node() {
        let g = manual_graph();
        let (mut refuser, state) = ProbeType::new("refuser");
        refuser.veto_connect = Some(NgError::Busy);
        g.register_type(refuser).unwrap();
        let port = ControlPort::open(&g).unwrap();
        let before = g.nodes().len();

        let resp = port
            .request(".", generic::mkpeer("refuser", "r", "in").unwrap(), WAIT)
            .unwrap();
        g.run_pending();

        assert_eq!(resp.error(), Some(NgError::Busy));
        assert!(port.node().find_hook("r").is_none());
        assert_eq!(g.nodes().len(), before);
        assert_eq!(g.find_type("refuser").unwrap().numnodes, 0);
        assert_eq!(state.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(state.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn introspection_messages() {
        let g = manual_graph();
        let port = ControlPort::open(&g).unwrap();
        port.request(".", generic::mkpeer("echo", "e", "in").unwrap(), WAIT)
            .unwrap();
        port.request("e", generic::name("mirror").unwrap(), WAIT).unwrap();

        let info: NodeInfo = port
            .request("mirror:", generic::nodeinfo(), WAIT)
            .unwrap()
            .args()
            .unwrap();
        assert_eq!(info.name, "mirror");
        assert_eq!(info.type_name, "echo");
        assert_eq!(info.hooks, 1);

        let hooks: HookList = port.request(".", generic::listhooks(), WAIT).unwrap().args().unwrap();
        assert_eq!(hooks.links.len(), 1);
        assert_eq!(hooks.links[0].ourhook, "e");
        assert_eq!(hooks.links[0].peerhook, "in");
        assert_eq!(hooks.links[0].nodeinfo.name, "mirror");

        let names: NameList = port.request(".", generic::listnames(), WAIT).unwrap().args().unwrap();
        assert_eq!(names.nodes.len(), 1);
        let all: NameList = port.request(".", generic::listnodes(), WAIT).unwrap().args().unwrap();
        assert_eq!(all.nodes.len(), 2);

        let types: TypeList = port.request(".", generic::listtypes(), WAIT).unwrap().args().unwrap();
        let echo = types.types.iter().find(|t| t.type_name == "echo").unwrap();
        assert_eq!(echo.numnodes, 1);
        assert!(types.types.iter().any(|t| t.type_name == "port" && t.numnodes == 1));

        // not handled by echo's dialect: echoed back as-is
        let resp = port.request("mirror:", generic::text_status(), WAIT).unwrap();
        assert_eq!(resp.error(), None);
        // hole has no text status
        port.request(".", generic::mkpeer("hole", "h", "in").unwrap(), WAIT)
            .unwrap();
        let resp = port.request("h", generic::text_status(), WAIT).unwrap();
        assert_eq!(resp.error(), Some(NgError::Invalid));
    }

    #[test]
    fn shutdown_message_removes_the_node() {
        let g = manual_graph();
        let port = ControlPort::open(&g).unwrap();
        port.request(".", generic::mkpeer("hole", "h", "in").unwrap(), WAIT)
            .unwrap();
        let hole = port.node().find_hook("h").unwrap().peer_node().unwrap();

        let resp = port.request("h", generic::shutdown(), WAIT).unwrap();
        g.run_pending();
        assert_eq!(resp.error(), None);
        assert!(!hole.is_valid());
        assert!(port.node().find_hook("h").is_none());
        assert!(g.node_by_id(hole.id()).is_none());
    }

    #[test]
    fn ascii_and_binary_conversion_through_a_node() {
        let g = manual_graph();
        let port = ControlPort::open(&g).unwrap();
        port.request(".", generic::mkpeer("hole", "h", "in").unwrap(), WAIT)
            .unwrap();

        let ascii = generic::ascii_request("mkpeer", r#"{"type":"echo","ourhook":"a","peerhook":"b"}"#);
        let resp = port.request("h", generic::ascii2binary(&ascii), WAIT).unwrap();
        assert_eq!(resp.error(), None);
        let binary = NgMesg::from_bytes(&resp.data).unwrap();
        assert_eq!((binary.cookie(), binary.cmd()), (NGM_GENERIC_COOKIE, generic::NGM_MKPEER));
        let args: MkPeer = binary.args().unwrap();
        assert_eq!(args.type_name, "echo");
        assert_eq!(args.peerhook, "b");

        let resp = port.request("h", generic::binary2ascii(&binary), WAIT).unwrap();
        let text = NgMesg::from_bytes(&resp.data).unwrap();
        assert_eq!(text.header.cmdstr, "mkpeer");
        let v: serde_json::Value = serde_json::from_slice(&text.data).unwrap();
        assert_eq!(v["type"], "echo");
        assert_eq!(v["ourhook"], "a");

        // type-specific commands are found through the node's own type
        port.send_data("h", Bytes::from_static(b"abc")).unwrap();
        port.send_data("h", Bytes::from_static(b"de")).unwrap();
        let ascii = generic::ascii_request("getstats", "");
        let resp = port.request("h", generic::ascii2binary(&ascii), WAIT).unwrap();
        let getstats = NgMesg::from_bytes(&resp.data).unwrap().readonly();
        assert_eq!((getstats.cookie(), getstats.cmd()), (NGM_HOLE_COOKIE, NGM_HOLE_GET_STATS));

        let stats_resp = port.request("h", getstats, WAIT).unwrap();
        let stats: HoleStats = stats_resp.args().unwrap();
        assert_eq!(stats, HoleStats { frames: 2, octets: 5 });

        let resp = port.request("h", generic::binary2ascii(&stats_resp), WAIT).unwrap();
        let text = NgMesg::from_bytes(&resp.data).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&text.data).unwrap();
        assert_eq!(v["frames"], 2);

        let unknown = generic::ascii_request("frobnicate", "");
        let resp = port.request("h", generic::ascii2binary(&unknown), WAIT).unwrap();
        assert_eq!(resp.error(), Some(NgError::NotFound));
    }

    #[test]
    fn port_round_trip_with_workers() {
        let g = threaded_graph(2);
        let port = ControlPort::open(&g).unwrap();
        let resp = port
            .request(".", generic::mkpeer("echo", "e", "in").unwrap(), WAIT)
            .unwrap();
        assert_eq!(resp.error(), None);

        for i in 0..10u8 {
            port.send_data("e", vec![i; 3]).unwrap();
            let (hook, data) = port.recv_data(WAIT).unwrap();
            assert_eq!(hook, "e");
            assert_eq!(&data[..], &[i; 3]);
        }

        let resp = port
            .request("e", NgMesg::new(0x1234, 9, "anything", Bytes::from_static(b"payload")), WAIT)
            .unwrap();
        assert_eq!(&resp.data[..], b"payload");
        assert_eq!(port.send_data("nope", vec![0u8]).unwrap_err(), NgError::NotFound);
        assert!(matches!(
            port.recv_data(Duration::from_millis(10)),
            Err(RecvError::Timeout)
        ));
        g.shutdown();
    }

    #[test]
    fn requests_to_a_port_are_refused() {
        let g = manual_graph();
        let asker = ControlPort::open(&g).unwrap();
        let other = ControlPort::open(&g).unwrap();

        let resp = asker
            .request(&other.path(), NgMesg::empty(NGM_HOLE_COOKIE, NGM_HOLE_GET_STATS, "getstats"), WAIT)
            .unwrap();
        assert_eq!(resp.error(), Some(NgError::Invalid));
        assert!(other.try_recv_msg().is_none());

        // generic commands are still served by the engine
        let info: NodeInfo = asker
            .request(&other.path(), generic::nodeinfo(), WAIT)
            .unwrap()
            .args()
            .unwrap();
        assert_eq!(info.type_name, "port");
    }
}
