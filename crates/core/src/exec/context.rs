use rustc_hash::FxHashMap;

use crate::addr::Address;
use crate::table::DataTable;

use super::timer::TimerState;

/// Discriminates the per-address persistent state slots. Every edge-aware
/// instruction keeps its own previous value, keyed by `(slot, address)`,
/// so two contacts on the same address never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum StateSlot {
    StrRising,
    StrFalling,
    AndRising,
    AndFalling,
    OrRising,
    OrFalling,
    PulseCoil,
    CountUp,
    CountDown,
    UdcUp,
    UdcDown,
    ShiftClock,
}

/// Mutable state threaded through every operation of a scan.
#[derive(Debug)]
pub struct ExecutionContext {
    pub table: DataTable,
    pub(crate) stack: Vec<bool>,
    pub(crate) top: bool,
    pub(crate) edges: FxHashMap<(StateSlot, Address), bool>,
    pub(crate) timers: FxHashMap<Address, TimerState>,
    pub(crate) call_depth: u32,
    /// Duration of the previous scan, the time base for timers.
    pub(crate) scan_time_ms: f64,
}

impl ExecutionContext {
    pub(crate) fn new(table: DataTable) -> Self {
        Self {
            table,
            stack: Vec::new(),
            top: false,
            edges: FxHashMap::default(),
            timers: FxHashMap::default(),
            call_depth: 0,
            scan_time_ms: 0.0,
        }
    }

    /// Every network starts from a clean stack.
    pub(crate) fn reset_logic(&mut self) {
        self.stack.clear();
        self.top = false;
    }

    pub(crate) fn push(&mut self, value: bool) {
        self.stack.push(value);
        self.top = value;
    }

    pub(crate) fn replace_top(&mut self, value: bool) {
        match self.stack.last_mut() {
            Some(slot) => *slot = value,
            None => self.stack.push(value),
        }
        self.top = value;
    }

    pub(crate) fn pop(&mut self) -> bool {
        let value = self.stack.pop().unwrap_or(false);
        self.top = self.stack.last().copied().unwrap_or(false);
        value
    }

    /// Block input `depth` positions below the stack top; missing inputs
    /// read as false.
    pub(crate) fn input(&self, depth: usize) -> bool {
        if depth == 0 {
            return self.top;
        }
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|at| self.stack.get(at))
            .copied()
            .unwrap_or(false)
    }

    /// Updates the remembered value for `(slot, addr)` and reports the
    /// observed transition as `(rising, falling)`.
    pub(crate) fn transition(
        &mut self,
        slot: StateSlot,
        addr: Address,
        current: bool,
    ) -> (bool, bool) {
        let previous = self
            .edges
            .insert((slot, addr), current)
            .unwrap_or(false);
        (current && !previous, previous && !current)
    }

    pub(crate) fn timer_state(&mut self, bit: Address) -> &mut TimerState {
        self.timers.entry(bit).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_top_tracks_pushes_and_pops() {
        let mut ctx = ExecutionContext::new(DataTable::new());
        assert!(!ctx.top);
        ctx.push(true);
        ctx.push(false);
        assert!(!ctx.top);
        assert!(!ctx.pop());
        assert!(ctx.top);
        assert!(ctx.pop());
        assert!(!ctx.top);
        assert!(!ctx.pop());
    }

    #[test]
    fn block_inputs_read_from_the_top_down() {
        let mut ctx = ExecutionContext::new(DataTable::new());
        ctx.push(true); // deepest: up / data
        ctx.push(false); // middle: down / clock
        ctx.push(true); // top: reset
        assert!(ctx.input(0));
        assert!(!ctx.input(1));
        assert!(ctx.input(2));
        assert!(!ctx.input(3));
    }

    #[test]
    fn transitions_are_tracked_per_slot_and_address() {
        let mut ctx = ExecutionContext::new(DataTable::new());
        let addr: Address = "X1".parse().expect("address");
        assert_eq!(ctx.transition(StateSlot::StrRising, addr, true), (true, false));
        assert_eq!(ctx.transition(StateSlot::StrRising, addr, true), (false, false));
        // A different slot on the same address has independent history.
        assert_eq!(ctx.transition(StateSlot::AndRising, addr, true), (true, false));
        assert_eq!(ctx.transition(StateSlot::StrRising, addr, false), (false, true));
    }
}
