// Virtual-time timer manager. The interpreter advances a global nanosecond
// clock by a fixed delta per step; everything that needs to happen "later"
// (VIA underflows, Cuda shift-register interrupts, VBL, DMA pacing) sits in
// one min-heap keyed by absolute expiry. Ties fire in insertion order.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::rc::Rc;

pub const NS_PER_SEC: u64 = 1_000_000_000;

pub fn usecs_to_nsecs(us: u64) -> u64 {
    us * 1000
}

pub fn msecs_to_nsecs(ms: u64) -> u64 {
    ms * 1_000_000
}

pub type Callback = Rc<dyn Fn()>;
pub type TimersPtr = Rc<RefCell<TimerManager>>;

struct HeapSlot {
    deadline: u64,
    seq: u64,
    id: u32,
}

// BinaryHeap is a max-heap; invert the ordering so the earliest deadline
// (and, among equals, the earliest insertion) surfaces first.
impl Ord for HeapSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapSlot {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for HeapSlot {}

struct TimerRec {
    interval: Option<u64>, // None for one-shot
    cb: Callback,
}

pub struct TimerManager {
    now: u64,
    seq: u64,
    next_id: u32,
    heap: BinaryHeap<HeapSlot>,
    live: HashMap<u32, TimerRec>,
    immediate: VecDeque<Callback>,
    deterministic: bool,
}

impl TimerManager {
    pub fn new() -> Self {
        TimerManager {
            now: 0,
            seq: 0,
            next_id: 1,
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            immediate: VecDeque::new(),
            deterministic: false,
        }
    }

    pub fn current_time_ns(&self) -> u64 {
        self.now
    }

    pub fn advance(&mut self, delta_ns: u64) {
        self.now = self.now.saturating_add(delta_ns);
    }

    pub fn set_deterministic(&mut self, value: bool) {
        self.deterministic = value;
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    fn push_slot(&mut self, id: u32, deadline: u64) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(HeapSlot { deadline, seq, id });
    }

    fn deadline_after(&self, delay_ns: u64) -> u64 {
        // A deadline beyond 2^63 ns clamps to never-expire.
        if delay_ns > i64::max_value() as u64 {
            u64::max_value()
        } else {
            self.now.saturating_add(delay_ns)
        }
    }

    pub fn add_oneshot_timer(&mut self, delay_ns: u64, cb: Callback) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, TimerRec { interval: None, cb });
        let deadline = self.deadline_after(delay_ns);
        self.push_slot(id, deadline);
        id
    }

    pub fn add_cyclic_timer(&mut self, interval_ns: u64, cb: Callback) -> u32 {
        if interval_ns == 0 {
            panic!("Cyclic timer with zero period!");
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, TimerRec { interval: Some(interval_ns), cb });
        let deadline = self.deadline_after(interval_ns);
        self.push_slot(id, deadline);
        id
    }

    /// Runs after the current instruction completes.
    pub fn add_immediate_timer(&mut self, cb: Callback) {
        self.immediate.push_back(cb);
    }

    /// Idempotent; safe to call on an already-expired id.
    pub fn cancel_timer(&mut self, id: u32) {
        self.live.remove(&id);
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|s| s.deadline)
    }

    /// Detach everything due at the current time. The callbacks are cloned
    /// out so the caller can drop the manager borrow before invoking them;
    /// a callback is then free to schedule or cancel timers.
    pub fn take_due(&mut self) -> Vec<Callback> {
        let mut due: Vec<Callback> = self.immediate.drain(..).collect();
        loop {
            match self.heap.peek() {
                Some(slot) if slot.deadline <= self.now => {}
                _ => break,
            }
            let slot = self.heap.pop().unwrap();
            let (reinsert, cb) = match self.live.get(&slot.id) {
                Some(rec) => (rec.interval, Some(Rc::clone(&rec.cb))),
                None => (None, None), // cancelled
            };
            if let Some(cb) = cb {
                due.push(cb);
                match reinsert {
                    Some(interval) => {
                        let deadline = slot.deadline.saturating_add(interval);
                        self.push_slot(slot.id, deadline);
                    }
                    None => {
                        self.live.remove(&slot.id);
                    }
                }
            }
        }
        due
    }
}

/// Fire everything due right now, repeating while callbacks keep scheduling
/// zero-delay work. No manager borrow is held while a callback runs.
pub fn run_due(timers: &TimersPtr) {
    loop {
        let due = timers.borrow_mut().take_due();
        if due.is_empty() {
            return;
        }
        for cb in due {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<u32>>>, tag: u32) -> Callback {
        let log = Rc::clone(log);
        Rc::new(move || log.borrow_mut().push(tag))
    }

    #[test]
    fn expiry_order_with_fifo_ties() {
        let timers = Rc::new(RefCell::new(TimerManager::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        timers.borrow_mut().add_oneshot_timer(100, recorder(&log, 1));
        timers.borrow_mut().add_oneshot_timer(50, recorder(&log, 2));
        timers.borrow_mut().add_oneshot_timer(100, recorder(&log, 3));
        timers.borrow_mut().advance(100);
        run_due(&timers);
        assert_eq!(*log.borrow(), vec![2, 1, 3]);
    }

    #[test]
    fn cyclic_reschedules_and_cancel_is_idempotent() {
        let timers = Rc::new(RefCell::new(TimerManager::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = timers.borrow_mut().add_cyclic_timer(10, recorder(&log, 7));
        timers.borrow_mut().advance(35);
        run_due(&timers);
        assert_eq!(log.borrow().len(), 3);
        timers.borrow_mut().cancel_timer(id);
        timers.borrow_mut().cancel_timer(id);
        timers.borrow_mut().advance(100);
        run_due(&timers);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn immediate_runs_before_heap_entries() {
        let timers = Rc::new(RefCell::new(TimerManager::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        timers.borrow_mut().add_oneshot_timer(0, recorder(&log, 1));
        timers.borrow_mut().add_immediate_timer(recorder(&log, 2));
        run_due(&timers);
        assert_eq!(*log.borrow(), vec![2, 1]);
    }

    #[test]
    fn far_deadline_clamps_to_never() {
        let timers = Rc::new(RefCell::new(TimerManager::new()));
        let log = Rc::new(RefCell::new(Vec::new()));
        timers.borrow_mut().add_oneshot_timer(u64::max_value() - 5, recorder(&log, 1));
        timers.borrow_mut().advance(u64::max_value() / 2);
        run_due(&timers);
        assert!(log.borrow().is_empty());
    }
}
