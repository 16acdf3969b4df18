use std::fmt;

use super::inst::*;

/// The register file, flags and global clock of the single executor.
/// Whichever process the kernel has bound owns these values until it is
/// switched out again.
pub struct Cpu {
    regs: [u32; NUM_REGISTERS],
    sf: bool,
    zf: bool,
    clock: u64,
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu {
            regs: [0; NUM_REGISTERS],
            sf: false,
            zf: false,
            clock: 0,
        }
    }

    pub fn register(&self, index: u32) -> Option<u32> {
        self.regs.get(index as usize).copied()
    }

    pub fn register_mut(&mut self, index: u32) -> Option<&mut u32> {
        self.regs.get_mut(index as usize)
    }

    pub fn registers(&self) -> &[u32; NUM_REGISTERS] {
        &self.regs
    }

    pub fn sp(&self) -> u32 {
        self.regs[REG_SP]
    }

    pub fn set_sp(&mut self, sp: u32) {
        self.regs[REG_SP] = sp;
    }

    pub fn ip(&self) -> u32 {
        self.regs[REG_IP]
    }

    pub fn set_ip(&mut self, ip: u32) {
        self.regs[REG_IP] = ip;
    }

    pub fn sf(&self) -> bool {
        self.sf
    }

    pub fn zf(&self) -> bool {
        self.zf
    }

    pub fn set_flags(&mut self, sf: bool, zf: bool) {
        self.sf = sf;
        self.zf = zf;
    }

    /// Compare `a` with `b`. The sign flag means "less than" and the zero flag
    /// "equal", so at most one of them is ever set.
    pub fn compare(&mut self, a: u32, b: u32) {
        self.zf = a == b;
        self.sf = a < b;
    }

    pub fn load(&mut self, regs: &[u32; NUM_REGISTERS], sf: bool, zf: bool) {
        self.regs = *regs;
        self.sf = sf;
        self.zf = zf;
    }

    /// Wipe the register file between processes. The clock survives.
    pub fn clear(&mut self) {
        self.regs = [0; NUM_REGISTERS];
        self.sf = false;
        self.zf = false;
    }

    pub fn tick(&mut self) {
        self.clock += 1;
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let r = &self.regs;
        writeln!(f, "CPU Registers: r1 {:<8}          r6  {:<8}", r[1], r[6])?;
        writeln!(f, "               r2 {:<8}          r7  {:<8}", r[2], r[7])?;
        writeln!(f, "               r3 {:<8}    (pid) r8  {:<8}", r[3], r[8])?;
        writeln!(f, "               r4 {:<8}   (data) r9  {:<8}", r[4], r[9])?;
        writeln!(f, "               r5 {:<8}     (sp) r10 {}", r[5], r[10])?;
        writeln!(f, "               sf {:<8}          ip  {}", self.sf, r[11])?;
        write!(f, "               zf {:<8}", self.zf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_never_sets_both_flags() {
        let mut cpu = Cpu::new();
        cpu.compare(1, 2);
        assert!(cpu.sf() && !cpu.zf());
        cpu.compare(2, 2);
        assert!(!cpu.sf() && cpu.zf());
        cpu.compare(3, 2);
        assert!(!cpu.sf() && !cpu.zf());
    }

    #[test]
    fn register_bounds() {
        let mut cpu = Cpu::new();
        *cpu.register_mut(3).unwrap() = 7;
        assert_eq!(Some(7), cpu.register(3));
        assert_eq!(None, cpu.register(12));
        assert!(cpu.register_mut(99).is_none());
        cpu.set_ip(40);
        cpu.set_sp(200);
        assert_eq!(Some(40), cpu.register(REG_IP as u32));
        assert_eq!(Some(200), cpu.register(REG_SP as u32));
    }

    #[test]
    fn clear_keeps_clock() {
        let mut cpu = Cpu::new();
        cpu.tick();
        cpu.tick();
        cpu.set_flags(true, false);
        cpu.set_ip(9);
        cpu.clear();
        assert_eq!(0, cpu.ip());
        assert!(!cpu.sf());
        assert_eq!(2, cpu.clock());
    }
}
