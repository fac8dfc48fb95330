//! Per-node admission gate.
//!
//! One status word carries the whole gate state:
//!
//! ```text
//!  bit 0      writer active
//!  bit 1      op pending (the item list is non-empty)
//!  bits 2..   reader count
//! ```
//!
//! Readers are admitted by a single `fetch_add` when neither a writer nor a
//! pending item is visible. Everything else goes through the list under the
//! mutex, and the list drains strictly FIFO: a reader at the head waits only
//! for the writer, a writer at the head waits for everyone.
//!
//! The mutex also guards the node's worklist membership, so "armed" can only
//! change together with the list.

use crate::graph::item::{Item, RwClass};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

const WRITER_ACTIVE: usize = 0x1;
const OP_PENDING: usize = 0x2;
const READER_INCREMENT: usize = 0x4;
const READER_MASK: usize = !(WRITER_ACTIVE | OP_PENDING);

/// Result of offering an item to the gate.
pub(crate) enum Admission {
    /// The caller holds a slot of the item's class and must run it, then `release`.
    Run(Item),
    /// The item was queued. `arm` means the caller must put the node on the worklist.
    Queued { arm: bool },
}

struct Pending {
    items: VecDeque<Item>,
    on_worklist: bool,
}

/// Point-in-time view of the gate, for diagnostics and tests.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GateState {
    pub readers: usize,
    pub writer_active: bool,
    pub pending: bool,
}

pub(crate) struct InputQueue {
    state: CachePadded<AtomicUsize>,
    pending: Mutex<Pending>,
}

#[inline]
fn can_proceed(rw: RwClass, state: usize) -> bool {
    match rw {
        RwClass::Reader => state & WRITER_ACTIVE == 0,
        RwClass::Writer => state & (WRITER_ACTIVE | READER_MASK) == 0,
    }
}

impl InputQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicUsize::new(0)),
            pending: Mutex::new(Pending {
                items: VecDeque::new(),
                on_worklist: false,
            }),
        }
    }

    /// Admit `item` inline if the gate allows it, queue it otherwise.
    pub(crate) fn acquire(&self, item: Item, force_queue: bool) -> Admission {
        if !force_queue {
            match item.rw() {
                RwClass::Reader => {
                    let prev = self.state.fetch_add(READER_INCREMENT, Ordering::Acquire);
                    if prev & (WRITER_ACTIVE | OP_PENDING) == 0 {
                        return Admission::Run(item);
                    }
                    // undo; the re-check under the lock below covers a
                    // releaser that saw our transient count
                    self.state.fetch_sub(READER_INCREMENT, Ordering::Release);
                }
                RwClass::Writer => {
                    let mut pending = self.pending.lock();
                    let mut cur = self.state.load(Ordering::Acquire);
                    while cur & (WRITER_ACTIVE | OP_PENDING | READER_MASK) == 0 {
                        match self.state.compare_exchange_weak(
                            cur,
                            cur | WRITER_ACTIVE,
                            Ordering::Acquire,
                            Ordering::Acquire,
                        ) {
                            Ok(_) => return Admission::Run(item),
                            Err(actual) => cur = actual,
                        }
                    }
                    let arm = self.enqueue_locked(&mut pending, item);
                    return Admission::Queued { arm };
                }
            }
        }

        let mut pending = self.pending.lock();
        let arm = self.enqueue_locked(&mut pending, item);
        Admission::Queued { arm }
    }

    fn enqueue_locked(&self, pending: &mut Pending, item: Item) -> bool {
        pending.items.push_back(item);
        let state = if pending.items.len() == 1 {
            self.state.fetch_or(OP_PENDING, Ordering::AcqRel) | OP_PENDING
        } else {
            self.state.load(Ordering::Acquire)
        };
        Self::arm_locked(pending, state)
    }

    fn arm_locked(pending: &mut Pending, state: usize) -> bool {
        if pending.on_worklist {
            return false;
        }
        match pending.items.front() {
            Some(head) if can_proceed(head.rw(), state) => {
                pending.on_worklist = true;
                true
            }
            _ => false,
        }
    }

    /// Give back a slot. Returns true when the node must be put on the worklist.
    pub(crate) fn release(&self, rw: RwClass) -> bool {
        let now = match rw {
            RwClass::Reader => {
                self.state.fetch_sub(READER_INCREMENT, Ordering::Release) - READER_INCREMENT
            }
            RwClass::Writer => self.state.fetch_and(!WRITER_ACTIVE, Ordering::Release) & !WRITER_ACTIVE,
        };
        if now & OP_PENDING == 0 {
            return false;
        }
        let mut pending = self.pending.lock();
        let state = self.state.load(Ordering::Acquire);
        Self::arm_locked(&mut pending, state)
    }

    /// Pop the head item if the gate lets it run now; the returned item
    /// holds a slot of its class.
    pub(crate) fn dequeue(&self) -> Option<Item> {
        let mut pending = self.pending.lock();
        let rw = pending.items.front()?.rw();
        match rw {
            RwClass::Reader => {
                let prev = self.state.fetch_add(READER_INCREMENT, Ordering::Acquire);
                if prev & WRITER_ACTIVE != 0 {
                    self.state.fetch_sub(READER_INCREMENT, Ordering::Release);
                    return None;
                }
            }
            RwClass::Writer => {
                let mut cur = self.state.load(Ordering::Acquire);
                loop {
                    if cur & (WRITER_ACTIVE | READER_MASK) != 0 {
                        return None;
                    }
                    match self.state.compare_exchange_weak(
                        cur,
                        cur | WRITER_ACTIVE,
                        Ordering::Acquire,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break,
                        Err(actual) => cur = actual,
                    }
                }
            }
        }
        let item = pending.items.pop_front();
        if pending.items.is_empty() {
            self.state.fetch_and(!OP_PENDING, Ordering::Release);
        }
        item
    }

    /// The node was popped off the worklist; later arming may queue it again.
    pub(crate) fn begin_visit(&self) {
        self.pending.lock().on_worklist = false;
    }

    /// Re-arm after a bounded drain left runnable work behind.
    pub(crate) fn rearm(&self) -> bool {
        let mut pending = self.pending.lock();
        let state = self.state.load(Ordering::Acquire);
        Self::arm_locked(&mut pending, state)
    }

    /// Remove every queued item (they hold no slots).
    pub(crate) fn flush(&self) -> Vec<Item> {
        let mut pending = self.pending.lock();
        let items: Vec<Item> = pending.items.drain(..).collect();
        self.state.fetch_and(!OP_PENDING, Ordering::Release);
        items
    }

    pub(crate) fn is_on_worklist(&self) -> bool {
        self.pending.lock().on_worklist
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().items.len()
    }

    pub(crate) fn gate(&self) -> GateState {
        let s = self.state.load(Ordering::Acquire);
        GateState {
            readers: (s & READER_MASK) / READER_INCREMENT,
            writer_active: s & WRITER_ACTIVE != 0,
            pending: s & OP_PENDING != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn reader(tag: u8) -> Item {
        Item::data(Bytes::from(vec![tag]))
    }

    fn writer(tag: u8) -> Item {
        Item::data(Bytes::from(vec![tag])).writer()
    }

    fn tag(item: &Item) -> u8 {
        match item.payload() {
            crate::graph::item::Payload::Data(b) => b[0],
            _ => unreachable!(),
        }
    }

    fn run(adm: Admission) -> Item {
        match adm {
            Admission::Run(item) => item,
            Admission::Queued { .. } => panic!("expected inline admission"),
        }
    }

    fn queued(adm: Admission) -> bool {
        match adm {
            Admission::Queued { arm } => arm,
            Admission::Run(_) => panic!("expected queueing"),
        }
    }

    #[test]
    fn readers_share_and_writer_waits() {
        let q = InputQueue::new();
        let r1 = run(q.acquire(reader(1), false));
        let r2 = run(q.acquire(reader(2), false));
        assert_eq!(q.gate().readers, 2);

        // writer refused while readers are active, not runnable yet
        assert!(!queued(q.acquire(writer(3), false)));
        assert!(q.gate().pending);

        // a later reader must queue behind the writer
        assert!(!queued(q.acquire(reader(4), false)));

        assert!(!q.release(r1.rw()));
        // last reader out makes the writer runnable
        assert!(q.release(r2.rw()));

        q.begin_visit();
        let w = q.dequeue().expect("writer runnable");
        assert_eq!(tag(&w), 3);
        assert!(q.gate().writer_active);
        assert_eq!(q.gate().readers, 0);
        assert!(q.dequeue().is_none(), "reader must wait for the writer");

        assert!(q.release(w.rw()));
        q.begin_visit();
        let r = q.dequeue().expect("reader runnable");
        assert_eq!(tag(&r), 4);
        assert!(!q.gate().pending);
        assert!(!q.release(r.rw()));
        assert_eq!(
            q.gate(),
            GateState {
                readers: 0,
                writer_active: false,
                pending: false
            }
        );
    }

    #[test]
    fn queued_items_drain_fifo_across_classes() {
        let q = InputQueue::new();
        assert!(queued(q.acquire(writer(1), true)));
        assert!(!queued(q.acquire(reader(2), true)));
        assert!(!queued(q.acquire(reader(3), true)));
        assert!(!queued(q.acquire(writer(4), true)));

        q.begin_visit();
        let w1 = q.dequeue().unwrap();
        assert_eq!(tag(&w1), 1);
        assert!(q.dequeue().is_none());
        q.release(w1.rw());

        let r2 = q.dequeue().unwrap();
        let r3 = q.dequeue().unwrap();
        assert_eq!((tag(&r2), tag(&r3)), (2, 3));
        assert_eq!(q.gate().readers, 2);
        assert!(q.dequeue().is_none(), "writer waits for both readers");
        q.release(r2.rw());
        assert!(q.dequeue().is_none());
        q.release(r3.rw());
        let w4 = q.dequeue().unwrap();
        assert_eq!(tag(&w4), 4);
        assert_eq!(q.len(), 0);
        q.release(w4.rw());
    }

    #[test]
    fn arming_happens_once_until_visited() {
        let q = InputQueue::new();
        assert!(queued(q.acquire(reader(1), true)));
        assert!(q.is_on_worklist());
        assert!(!queued(q.acquire(reader(2), true)));
        q.begin_visit();
        assert!(!q.is_on_worklist());
        assert!(q.rearm());
        assert!(!q.rearm());
    }

    #[test]
    fn flush_clears_pending() {
        let q = InputQueue::new();
        let w = run(q.acquire(writer(9), false));
        q.acquire(reader(1), false);
        q.acquire(reader(2), false);
        assert_eq!(q.flush().len(), 2);
        assert!(!q.gate().pending);
        assert!(!q.release(w.rw()));
        assert!(matches!(q.acquire(reader(3), false), Admission::Run(_)));
    }
}
