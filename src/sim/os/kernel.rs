use log::{debug, info, warn};
use serde::Serialize;

use super::proc::{Proc, ProcState, ProcStats};
use crate::config::Config;
use crate::sim::{
    error::{Error, Res},
    machine::Machine,
    ram::round_to_boundary,
};

pub const NUM_LOCKS: usize = 10;
pub const NUM_EVENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventState {
    #[default]
    NonSignaled,
    Signaled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// In the order the processes were reaped.
    pub stats: Vec<ProcStats>,
    pub clock: u64,
}

/// Maps a lock or event id onto its table slot. Ids outside `1..=max`
/// have no slot.
pub(super) fn slot(id: u32, max: usize) -> Option<usize> {
    if id >= 1 && id as usize <= max {
        Some(id as usize)
    } else {
        None
    }
}

pub struct Kernel {
    pub(super) procs: Vec<Proc>,
    /// 0 when free, otherwise the pid of the holder. Slot 0 is unused.
    pub(super) locks: [u32; NUM_LOCKS + 1],
    pub(super) events: [EventState; NUM_EVENTS + 1],
    pub(super) config: Config,
    next_pid: u32,
    summary: RunSummary,
}

impl Kernel {
    pub fn new(config: &Config) -> Kernel {
        Kernel {
            procs: Vec::new(),
            locks: [0; NUM_LOCKS + 1],
            events: [EventState::NonSignaled; NUM_EVENTS + 1],
            config: config.clone(),
            next_pid: 0,
            summary: RunSummary::default(),
        }
    }

    pub fn procs(&self) -> &[Proc] {
        &self.procs
    }

    pub fn proc(&self, pid: u32) -> Option<&Proc> {
        self.procs.iter().find(|p| p.pid == pid)
    }

    pub fn lock_holder(&self, id: u32) -> Option<u32> {
        slot(id, NUM_LOCKS)
            .map(|n| self.locks[n])
            .filter(|holder| *holder != 0)
    }

    pub fn event(&self, id: u32) -> Option<EventState> {
        slot(id, NUM_EVENTS).map(|n| self.events[n])
    }

    /// Create a process from a program image. Running out of pages here is
    /// fatal for the whole run.
    pub fn create_process(&mut self, m: &mut Machine, image: &[u8]) -> Res<u32> {
        let memory_size = self.config.process_memory;
        if image.len() > memory_size as usize {
            return Err(Error::ImageTooLarge {
                image: image.len(),
                memory: memory_size,
            });
        }
        self.next_pid += 1;
        let pid = self.next_pid;
        m.mem.map_process_memory(memory_size, pid)?;
        m.mem.write_bytes(pid, 0, image)?;

        let code_size = round_to_boundary(image.len() as u32, m.mem.page_size()).ok_or(
            Error::ImageTooLarge {
                image: image.len(),
                memory: memory_size,
            },
        )?;
        let mut p = Proc::new(
            pid,
            memory_size,
            code_size,
            self.config.data_size,
            self.config.stack_size,
        );
        p.time_quantum = self.config.time_quantum;
        p.heap_pages = m.mem.heap_pages_for(pid, p.heap_start, p.heap_end);
        debug!(
            "created process {}: code {} bytes, heap {}..{} ({} pages)",
            pid,
            code_size,
            p.heap_start,
            p.heap_end,
            p.heap_pages.len()
        );
        self.procs.push(p);
        Ok(pid)
    }

    fn release_locks_of(&mut self, pid: u32) {
        for lock in self.locks.iter_mut().filter(|l| **l == pid) {
            *lock = 0;
        }
    }

    /// Remove every terminated process, giving back its pages and locks.
    fn reap(&mut self, m: &mut Machine) -> Res<()> {
        let mut i = 0;
        while i < self.procs.len() {
            if !self.procs[i].is_terminated() {
                i += 1;
                continue;
            }
            let mut p = self.procs.remove(i);
            p.page_faults = m.mem.page_faults_for(p.pid);
            m.mem.release_process(p.pid)?;
            p.heap_pages.clear();
            self.release_locks_of(p.pid);

            let stats = p.stats();
            info!("{}", stats);
            self.summary.stats.push(stats);
            if self.config.dump_physical_memory {
                debug!("physical memory:\n{}", m.dump_ram());
            }
        }
        Ok(())
    }

    /// Highest priority first; among equals, whoever has run the least.
    pub(super) fn sort_run_queue(&mut self) {
        self.procs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.clock_cycles.cmp(&b.clock_cycles))
        });
    }

    /// One pass over the waiting processes. Returns true if anything woke up.
    pub(super) fn wake_scan(&mut self, skip: Option<usize>) -> bool {
        let mut woke = false;
        for (i, p) in self.procs.iter_mut().enumerate() {
            if Some(i) == skip {
                continue;
            }
            match p.state {
                // a counter of 0 sleeps until something else intervenes
                ProcState::WaitingAsleep if p.sleep_counter != 0 => {
                    p.sleep_counter -= 1;
                    if p.sleep_counter == 0 {
                        p.state = ProcState::Ready;
                        woke = true;
                    }
                }
                ProcState::WaitingOnEvent => {
                    let n = p.waiting_event as usize;
                    if self.events[n] == EventState::Signaled {
                        self.events[n] = EventState::NonSignaled;
                        p.waiting_event = 0;
                        p.state = ProcState::Ready;
                        woke = true;
                    }
                }
                ProcState::WaitingOnLock => {
                    let n = p.waiting_lock as usize;
                    if self.locks[n] == 0 {
                        self.locks[n] = p.pid;
                        p.waiting_lock = 0;
                        p.state = ProcState::Ready;
                        woke = true;
                    }
                }
                _ => {}
            }
        }
        woke
    }

    fn check_cycle_limit(&self, m: &Machine) -> Res<()> {
        match self.config.max_cycles {
            Some(max) if m.cpu.clock() > max => Err(Error::CycleLimit(max)),
            _ => Ok(()),
        }
    }

    // Nothing is ready: let one clock cycle pass so sleepers can count down.
    fn idle(&mut self, m: &mut Machine) -> Res<()> {
        self.wake_scan(None);
        m.cpu.tick();
        self.check_cycle_limit(m)?;
        let progress = self.procs.iter().any(|p| {
            p.state.is_runnable() || (p.state == ProcState::WaitingAsleep && p.sleep_counter != 0)
        });
        if !progress {
            let pids = self.procs.iter().map(|p| p.pid).collect();
            return Err(Error::Deadlock { pids });
        }
        Ok(())
    }

    /// Bind the process at `idx` and run it until its quantum runs out, it
    /// blocks or terminates, or another process wakes up.
    pub(super) fn run_slice(&mut self, m: &mut Machine, idx: usize) -> Res<()> {
        let pid = self.procs[idx].pid;
        self.procs[idx].go_running(&mut m.cpu);
        if self.config.dump_context_switch {
            info!("Switching in Process {} with ip at {}", pid, m.cpu.ip());
        }

        let mut preempt = false;
        loop {
            match self.dispatch(m, idx) {
                Ok(()) => self.procs[idx].clock_cycles += 1,
                Err(Error::Fault(fault)) => {
                    warn!("{}", fault);
                    if self.config.dump_registers {
                        warn!("\n{}", m.cpu);
                    }
                    self.procs[idx].exit();
                }
                Err(e) => return Err(e),
            }
            if self.config.dump_registers {
                debug!("\n{}", m.cpu);
            }
            preempt |= self.wake_scan(Some(idx));
            self.check_cycle_limit(m)?;

            let p = &self.procs[idx];
            if p.state != ProcState::Running {
                break;
            }
            if p.clock_cycles % p.time_quantum as u64 == 0 || preempt {
                break;
            }
        }

        if !self.procs[idx].is_terminated() {
            self.procs[idx].go_ready(&m.cpu);
            if self.config.dump_context_switch {
                info!("Switching out Process {} with ip at {}", pid, m.cpu.ip());
            }
        }
        m.cpu.clear();
        Ok(())
    }

    /// Run until the run queue is empty.
    pub fn run(&mut self, m: &mut Machine) -> Res<RunSummary> {
        loop {
            self.reap(m)?;
            self.sort_run_queue();
            if self.procs.is_empty() {
                info!("No Processes");
                let mut summary = std::mem::take(&mut self.summary);
                summary.clock = m.cpu.clock();
                return Ok(summary);
            }
            if !self.procs.iter().any(|p| p.state.is_runnable()) {
                self.idle(m)?;
                continue;
            }
            for idx in 0..self.procs.len() {
                if self.procs[idx].state.is_runnable() {
                    self.run_slice(m, idx)?;
                }
            }
        }
    }
}
