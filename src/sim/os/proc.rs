use std::fmt;

use serde::Serialize;

use crate::sim::{cpu::Cpu, inst::*};

pub const MAX_PRIORITY: u32 = 31;
pub const DEFAULT_PRIORITY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    NewProcess,
    Ready,
    Running,
    WaitingAsleep,
    WaitingOnLock,
    WaitingOnEvent,
    Terminated,
}

impl ProcState {
    pub fn is_runnable(self) -> bool {
        matches!(self, ProcState::NewProcess | ProcState::Ready)
    }

    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            ProcState::WaitingAsleep | ProcState::WaitingOnLock | ProcState::WaitingOnEvent
        )
    }
}

/// Process control block. Offsets are relative to the process's own
/// address space.
pub struct Proc {
    pub pid: u32,
    pub state: ProcState,
    pub priority: u32,
    pub time_quantum: u32,

    pub memory_size: u32,
    pub code_size: u32,
    pub data_size: u32,
    pub stack_size: u32,
    pub heap_start: u32,
    pub heap_end: u32,
    /// Page table indices of the heap, in address order.
    pub heap_pages: Vec<usize>,

    pub regs: [u32; NUM_REGISTERS],
    pub sf: bool,
    pub zf: bool,

    pub clock_cycles: u64,
    pub context_switches: u32,
    pub page_faults: u32,
    pub sleep_counter: u32,
    pub waiting_lock: u32,
    pub waiting_event: u32,
}

impl Proc {
    pub fn new(pid: u32, memory_size: u32, code_size: u32, data_size: u32, stack_size: u32) -> Proc {
        let mut regs = [0; NUM_REGISTERS];
        regs[REG_PID] = pid;
        regs[REG_DATA] = code_size;
        regs[REG_SP] = memory_size.saturating_sub(1);
        regs[REG_IP] = 0;
        Proc {
            pid,
            state: ProcState::NewProcess,
            priority: DEFAULT_PRIORITY,
            time_quantum: 5,
            memory_size,
            code_size,
            data_size,
            stack_size,
            heap_start: code_size + data_size,
            heap_end: memory_size.saturating_sub(stack_size),
            heap_pages: Vec::new(),
            regs,
            sf: false,
            zf: false,
            clock_cycles: 0,
            context_switches: 0,
            page_faults: 0,
            sleep_counter: 0,
            waiting_lock: 0,
            waiting_event: 0,
        }
    }

    pub fn ip(&self) -> u32 {
        self.regs[REG_IP]
    }

    pub fn sp(&self) -> u32 {
        self.regs[REG_SP]
    }

    /// Lowest stack pointer value a push may leave behind.
    pub fn stack_limit(&self) -> u32 {
        self.memory_size
            .saturating_sub(1)
            .saturating_sub(self.stack_size)
    }

    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority.min(MAX_PRIORITY);
    }

    pub fn go_running(&mut self, cpu: &mut Cpu) {
        self.state = ProcState::Running;
        cpu.load(&self.regs, self.sf, self.zf);
    }

    /// Save the executor state back and count the switch. A process that
    /// blocked during its slice keeps its waiting state.
    pub fn go_ready(&mut self, cpu: &Cpu) {
        if !self.state.is_waiting() {
            self.state = ProcState::Ready;
        }
        self.context_switches += 1;
        self.regs = *cpu.registers();
        self.sf = cpu.sf();
        self.zf = cpu.zf();
    }

    pub fn exit(&mut self) {
        self.state = ProcState::Terminated;
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ProcState::Terminated
    }

    pub fn stats(&self) -> ProcStats {
        ProcStats {
            pid: self.pid,
            page_faults: self.page_faults,
            clock_cycles: self.clock_cycles,
            context_switches: self.context_switches,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcStats {
    pub pid: u32,
    pub page_faults: u32,
    pub clock_cycles: u64,
    pub context_switches: u32,
}

impl fmt::Display for ProcStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Removed Exited Process # {}", self.pid)?;
        writeln!(f, "  # of Page Faults:      {}", self.page_faults)?;
        writeln!(f, "  # of Clock Cycles:     {}", self.clock_cycles)?;
        write!(f, "  # of Context Switches: {}", self.context_switches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_layout() {
        let p = Proc::new(3, 256, 48, 32, 64);
        assert_eq!(ProcState::NewProcess, p.state);
        assert_eq!(0, p.ip());
        assert_eq!(255, p.sp());
        assert_eq!(3, p.regs[REG_PID]);
        assert_eq!(48, p.regs[REG_DATA]);
        assert_eq!(80, p.heap_start);
        assert_eq!(192, p.heap_end);
        assert_eq!(191, p.stack_limit());
    }

    #[test]
    fn test_priority_is_clamped() {
        let mut p = Proc::new(1, 256, 16, 32, 64);
        p.set_priority(100);
        assert_eq!(MAX_PRIORITY, p.priority);
        p.set_priority(4);
        assert_eq!(4, p.priority);
    }

    #[test]
    fn test_context_round_trip() {
        let mut cpu = Cpu::new();
        let mut p = Proc::new(2, 256, 16, 32, 64);
        p.go_running(&mut cpu);
        assert_eq!(ProcState::Running, p.state);
        assert_eq!(255, cpu.sp());

        cpu.set_ip(17);
        cpu.set_flags(true, false);
        p.go_ready(&cpu);
        assert_eq!(ProcState::Ready, p.state);
        assert_eq!(17, p.ip());
        assert!(p.sf);
        assert_eq!(1, p.context_switches);

        p.state = ProcState::WaitingOnEvent;
        p.go_ready(&cpu);
        assert_eq!(ProcState::WaitingOnEvent, p.state);
    }
}
