use log::{debug, info, warn};

use super::kernel::{slot, EventState, Kernel, NUM_EVENTS, NUM_LOCKS};
use super::proc::ProcState;
use crate::sim::{
    error::{Fault, Res},
    inst::Opcode,
    machine::Machine,
};

impl Kernel {
    /// Execute one instruction of the process at `idx`, which must be bound
    /// to the executor.
    pub(super) fn dispatch(&mut self, m: &mut Machine, idx: usize) -> Res<()> {
        let pid = self.procs[idx].pid;
        let op = m.fetch_opcode(pid)?;
        let mut args = [0u32; 2];
        for arg in args.iter_mut().take(op.arity()) {
            *arg = m.fetch_operand(pid)?;
        }
        if self.config.dump_instruction {
            debug!(" Pid:{} {} {:?}", pid, op, &args[..op.arity()]);
        }
        let [a, b] = args;

        match op {
            Opcode::Noop => {}
            Opcode::Incr => {
                let r = m.register_mut(pid, a)?;
                *r = r.wrapping_add(1);
            }
            Opcode::Addi => {
                let r = m.register_mut(pid, a)?;
                *r = r.wrapping_add(b);
            }
            Opcode::Addr => {
                let value = m.register(pid, b)?;
                let r = m.register_mut(pid, a)?;
                *r = r.wrapping_add(value);
            }
            Opcode::Cmpi => {
                let value = m.register(pid, a)?;
                m.cpu.compare(value, b);
            }
            Opcode::Cmpr => {
                let lhs = m.register(pid, a)?;
                let rhs = m.register(pid, b)?;
                m.cpu.compare(lhs, rhs);
            }

            Opcode::Movi => m.set_register(pid, a, b)?,
            Opcode::Movr => {
                let value = m.register(pid, b)?;
                m.set_register(pid, a, value)?;
            }
            Opcode::Movmr => {
                let addr = m.register(pid, b)?;
                let value = m.mem.read_word(pid, addr)?;
                m.set_register(pid, a, value)?;
            }
            Opcode::Movrm => {
                let addr = m.register(pid, a)?;
                let value = m.register(pid, b)?;
                m.mem.write_word(pid, addr, value)?;
            }
            Opcode::Movmm => {
                let dst = m.register(pid, a)?;
                let src = m.register(pid, b)?;
                let value = m.mem.read_word(pid, src)?;
                m.mem.write_word(pid, dst, value)?;
            }

            // Offsets are relative to the instruction that follows, and
            // negative ones are stored two's-complement.
            Opcode::Jmp => self.jump_if(m, pid, a, true)?,
            Opcode::Jlt => {
                let taken = m.cpu.sf();
                self.jump_if(m, pid, a, taken)?
            }
            Opcode::Jgt => {
                let taken = !m.cpu.sf();
                self.jump_if(m, pid, a, taken)?
            }
            Opcode::Je => {
                let taken = m.cpu.zf();
                self.jump_if(m, pid, a, taken)?
            }
            Opcode::Call => {
                let offset = m.register(pid, a)?;
                let ret = m.cpu.ip();
                self.push(m, idx, ret)?;
                m.cpu.set_ip(ret.wrapping_add(offset));
            }
            Opcode::Callm => {
                let addr = m.register(pid, a)?;
                let offset = m.mem.read_byte(pid, addr)? as u32;
                let ret = m.cpu.ip();
                self.push(m, idx, ret)?;
                m.cpu.set_ip(ret.wrapping_add(offset));
            }
            Opcode::Ret => {
                let ret = self.pop(m, idx)?;
                m.cpu.set_ip(ret);
            }

            Opcode::Pushr => {
                let value = m.register(pid, a)?;
                self.push(m, idx, value)?;
            }
            Opcode::Pushi => self.push(m, idx, a)?,
            Opcode::Popr => {
                let value = self.pop(m, idx)?;
                m.set_register(pid, a, value)?;
            }
            Opcode::Popm => {
                let value = self.pop(m, idx)?;
                let addr = m.register(pid, a)?;
                m.mem.write_word(pid, addr, value)?;
            }

            Opcode::Printr => {
                let value = m.register(pid, a)?;
                m.console.write_value(value)?;
            }
            Opcode::Printm => {
                let addr = m.register(pid, a)?;
                let value = m.mem.read_byte(pid, addr)?;
                m.console.write_value(value as u32)?;
            }
            Opcode::Input => {
                let value = m.console.read_value()?;
                m.set_register(pid, a, value)?;
            }

            Opcode::Alloc => {
                let bytes = m.register(pid, a)?;
                let addr = m.mem.allocate_heap(pid, &self.procs[idx].heap_pages, bytes)?;
                m.set_register(pid, b, addr)?;
            }
            Opcode::FreeMemory => {
                let addr = m.register(pid, a)?;
                let freed = m.mem.free_heap(pid, &self.procs[idx].heap_pages, addr)?;
                if freed == 0 {
                    warn!("process {} freed {} which was never allocated", pid, addr);
                }
            }
            Opcode::MemoryClear => {
                let start = m.register(pid, a)?;
                let len = m.register(pid, b)?;
                m.mem.set_memory(pid, start, len, 0)?;
            }
            Opcode::MapSharedMem => {
                let region = m.register(pid, a)?;
                let start = m.mem.map_shared_region(region, pid);
                m.set_register(pid, b, start)?;
            }

            Opcode::SetPriority => {
                let priority = m.register(pid, a)?;
                self.procs[idx].set_priority(priority);
            }
            Opcode::Sleep => {
                let cycles = m.register(pid, a)?;
                let p = &mut self.procs[idx];
                p.sleep_counter = cycles;
                p.state = ProcState::WaitingAsleep;
            }
            Opcode::Exit => self.procs[idx].exit(),
            Opcode::TerminateProcess => {
                let target = m.register(pid, a)?;
                match self.procs.iter_mut().find(|p| p.pid == target) {
                    Some(p) => {
                        p.exit();
                        info!("Process {} has forcibly terminated Process {}", pid, target);
                    }
                    None => warn!("process {} tried to terminate unknown process {}", pid, target),
                }
            }

            Opcode::AcquireLock => {
                let id = m.register(pid, a)?;
                if let Some(n) = slot(id, NUM_LOCKS) {
                    match self.locks[n] {
                        0 => self.locks[n] = pid,
                        holder if holder == pid => {}
                        _ => {
                            let p = &mut self.procs[idx];
                            p.waiting_lock = id;
                            p.state = ProcState::WaitingOnLock;
                        }
                    }
                }
            }
            Opcode::ReleaseLock => {
                let id = m.register(pid, a)?;
                if let Some(n) = slot(id, NUM_LOCKS) {
                    if self.locks[n] == pid {
                        self.locks[n] = 0;
                    }
                }
            }
            Opcode::SignalEvent => {
                let id = m.register(pid, a)?;
                if let Some(n) = slot(id, NUM_EVENTS) {
                    self.events[n] = EventState::Signaled;
                }
            }
            Opcode::WaitEvent => {
                let id = m.register(pid, a)?;
                if slot(id, NUM_EVENTS).is_some() {
                    let p = &mut self.procs[idx];
                    p.waiting_event = id;
                    p.state = ProcState::WaitingOnEvent;
                }
            }
        }

        m.cpu.tick();
        Ok(())
    }

    fn jump_if(&self, m: &mut Machine, pid: u32, reg: u32, taken: bool) -> Res<()> {
        let offset = m.register(pid, reg)?;
        if taken {
            m.cpu.set_ip(m.cpu.ip().wrapping_add(offset));
        }
        Ok(())
    }

    fn push(&self, m: &mut Machine, idx: usize, value: u32) -> Res<()> {
        let p = &self.procs[idx];
        let sp = m.cpu.sp().wrapping_sub(4);
        m.cpu.set_sp(sp);
        let limit = p.stack_limit();
        if sp < limit {
            return Err(Fault::Stack {
                pid: p.pid,
                excess: limit - sp,
            }
            .into());
        }
        m.mem.write_word(p.pid, sp, value)
    }

    // Popped slots are zeroed.
    fn pop(&self, m: &mut Machine, idx: usize) -> Res<u32> {
        let pid = self.procs[idx].pid;
        let sp = m.cpu.sp();
        let value = m.mem.read_word(pid, sp)?;
        m.mem.set_memory(pid, sp, 4, 0)?;
        m.cpu.set_sp(sp.wrapping_add(4));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Program;
    use crate::config::Config;
    use crate::sim::console::{Console, Transcript};
    use crate::sim::error::Error;

    fn load(src: &str, input: &str) -> (Machine, Kernel, Transcript) {
        let config = Config::default();
        let (console, transcript) = Console::capture(input);
        let mut m = Machine::new(&config, console).unwrap();
        let mut kernel = Kernel::new(&config);
        let image = Program::parse(src).unwrap().memory_image();
        kernel.create_process(&mut m, &image).unwrap();
        kernel.procs[0].go_running(&mut m.cpu);
        (m, kernel, transcript)
    }

    fn step(m: &mut Machine, kernel: &mut Kernel, n: usize) {
        for _ in 0..n {
            kernel.dispatch(m, 0).unwrap();
        }
    }

    #[test]
    fn test_arithmetic_and_compare() {
        let src = "Movi r1 $5\nIncr r1\nAddi r1 $10\nMovi r2 $4\nAddr r1 r2\nCmpi r1 $20\nCmpr r2 r1";
        let (mut m, mut kernel, _) = load(src, "");
        step(&mut m, &mut kernel, 6);
        assert_eq!(20, m.cpu.register(1).unwrap());
        assert!(m.cpu.zf() && !m.cpu.sf());
        step(&mut m, &mut kernel, 1);
        assert!(m.cpu.sf() && !m.cpu.zf());
        assert_eq!(7, m.cpu.clock());
    }

    #[test]
    fn test_memory_moves() {
        let src = "Movi r1 $100\nMovi r2 $77\nMovrm r1 r2\nMovmr r3 r1\nMovi r4 $120\nMovmm r4 r1\nMovr r5 r4";
        let (mut m, mut kernel, _) = load(src, "");
        step(&mut m, &mut kernel, 7);
        assert_eq!(77, m.cpu.register(3).unwrap());
        assert_eq!(77, m.mem.read_word(1, 120).unwrap());
        assert_eq!(120, m.cpu.register(5).unwrap());
    }

    #[test]
    fn test_relative_jumps() {
        // Jmp skips the 9-byte Movi that follows it
        let src = "Movi r1 $9\nJmp r1\nMovi r2 $1\nMovi r3 $-23\nCmpi r2 $0\nJe r3";
        let (mut m, mut kernel, _) = load(src, "");
        step(&mut m, &mut kernel, 3);
        assert_eq!(0, m.cpu.register(2).unwrap());
        assert_eq!(32, m.cpu.ip());
        step(&mut m, &mut kernel, 2);
        assert_eq!(23, m.cpu.ip());
        step(&mut m, &mut kernel, 1);
        assert_eq!(32, m.cpu.ip());
    }

    #[test]
    fn test_call_and_ret() {
        // the subroutine sits right after the Exit
        let src = "Movi r1 $1\nCall r1\nExit\nMovi r2 $3\nRet";
        let (mut m, mut kernel, _) = load(src, "");
        step(&mut m, &mut kernel, 2);
        assert_eq!(15, m.cpu.ip());
        assert_eq!(251, m.cpu.sp());
        assert_eq!(14, m.mem.read_word(1, 251).unwrap());
        step(&mut m, &mut kernel, 2);
        assert_eq!(14, m.cpu.ip());
        assert_eq!(255, m.cpu.sp());
        assert_eq!(0, m.mem.read_word(1, 251).unwrap());
        assert_eq!(3, m.cpu.register(2).unwrap());
    }

    #[test]
    fn test_stack_push_pop() {
        let src = "Pushi $9\nMovi r1 $4\nPushr r1\nPopr r2\nMovi r3 $100\nPopm r3";
        let (mut m, mut kernel, _) = load(src, "");
        step(&mut m, &mut kernel, 6);
        assert_eq!(4, m.cpu.register(2).unwrap());
        assert_eq!(9, m.mem.read_word(1, 100).unwrap());
        assert_eq!(255, m.cpu.sp());
    }

    #[test]
    fn test_stack_overflow_faults() {
        let (mut m, mut kernel, _) = load(&"Pushi $1\n".repeat(17), "");
        step(&mut m, &mut kernel, 16);
        assert_eq!(191, m.cpu.sp());
        match kernel.dispatch(&mut m, 0) {
            Err(Error::Fault(Fault::Stack { pid, excess })) => assert_eq!((1, 4), (pid, excess)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_print_and_input() {
        let src = "Input r1\nPrintr r1\nMovi r2 $60\nMovrm r2 r1\nPrintm r2";
        let (mut m, mut kernel, transcript) = load(src, "300\n");
        step(&mut m, &mut kernel, 5);
        // Printm prints a single byte
        assert_eq!(vec!["300", "44"], transcript.lines());
    }

    #[test]
    fn test_malformed_input_is_fatal() {
        let (mut m, mut kernel, _) = load("Input r1", "x\n");
        assert!(matches!(kernel.dispatch(&mut m, 0), Err(Error::Input(_))));
    }

    #[test]
    fn test_invalid_register_and_opcode() {
        let (mut m, mut kernel, _) = load("Incr r12", "");
        assert!(matches!(
            kernel.dispatch(&mut m, 0),
            Err(Error::InvalidRegister { pid: 1, index: 12 })
        ));

        let (mut m, mut kernel, _) = load("Noop", "");
        m.mem.write_byte(1, 1, 200).unwrap();
        step(&mut m, &mut kernel, 1);
        assert!(matches!(
            kernel.dispatch(&mut m, 0),
            Err(Error::InvalidOpcode { ip: 1, opcode: 200, .. })
        ));
    }

    #[test]
    fn test_heap_and_clear() {
        let src = "Movi r1 $20\nAlloc r1 r2\nMovi r3 $5\nMovrm r2 r3\nMovi r4 $4\nMemoryClear r2 r4\nFreeMemory r2";
        let (mut m, mut kernel, _) = load(src, "");
        step(&mut m, &mut kernel, 4);
        let addr = m.cpu.register(2).unwrap();
        assert_eq!(kernel.procs[0].heap_start, addr);
        assert_eq!(5, m.mem.read_word(1, addr).unwrap());
        step(&mut m, &mut kernel, 2);
        assert_eq!(0, m.mem.read_word(1, addr).unwrap());
        step(&mut m, &mut kernel, 1);
        let heap = &kernel.procs[0].heap_pages;
        assert!(heap.iter().all(|&i| m.mem.pages()[i].heap_alloc.is_none()));
    }

    #[test]
    fn test_priority_sleep_and_exit() {
        let src = "Movi r1 $40\nSetPriority r1\nMovi r2 $3\nSleep r2\nExit";
        let (mut m, mut kernel, _) = load(src, "");
        step(&mut m, &mut kernel, 2);
        assert_eq!(31, kernel.procs[0].priority);
        step(&mut m, &mut kernel, 2);
        assert_eq!(ProcState::WaitingAsleep, kernel.procs[0].state);
        assert_eq!(3, kernel.procs[0].sleep_counter);
        kernel.procs[0].state = ProcState::Running;
        step(&mut m, &mut kernel, 1);
        assert!(kernel.procs[0].is_terminated());
    }

    #[test]
    fn test_map_shared_memory() {
        let (mut m, mut kernel, _) = load("Movi r1 $1\nMapSharedMem r1 r2", "");
        step(&mut m, &mut kernel, 2);
        // right after the last of the 16 process pages
        assert_eq!(256, m.cpu.register(2).unwrap());
        m.mem.write_word(1, 256, 42).unwrap();
        assert_eq!(42, m.mem.read_word(1, 256).unwrap());
    }
}
