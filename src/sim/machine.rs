use super::{
    console::Console,
    cpu::Cpu,
    error::{Error, Res},
    inst::{decode_opcode, Opcode},
    os::{
        paging::AddressSpace,
        swap::{FileSwapStore, MemorySwapStore, SwapStore},
    },
};
use crate::config::Config;

/// Everything a process touches while it is bound: the executor's registers,
/// the paged memory and the console.
pub struct Machine {
    pub cpu: Cpu,
    pub mem: AddressSpace,
    pub console: Console,
}

impl Machine {
    pub fn new(config: &Config, console: Console) -> Res<Machine> {
        let swap: Box<dyn SwapStore> = match &config.swap_dir {
            Some(dir) => Box::new(FileSwapStore::new(dir)?),
            None => Box::new(MemorySwapStore::new()),
        };
        Ok(Machine {
            cpu: Cpu::new(),
            mem: AddressSpace::new(&config.memory_layout(), swap)?,
            console,
        })
    }

    /// Read the opcode byte at ip and step past it.
    pub fn fetch_opcode(&mut self, pid: u32) -> Res<Opcode> {
        let ip = self.cpu.ip();
        let byte = self.mem.read_byte(pid, ip)?;
        let op = decode_opcode(byte).ok_or(Error::InvalidOpcode {
            pid,
            ip,
            opcode: byte,
        })?;
        self.cpu.set_ip(ip.wrapping_add(1));
        Ok(op)
    }

    pub fn fetch_operand(&mut self, pid: u32) -> Res<u32> {
        let ip = self.cpu.ip();
        let value = self.mem.read_word(pid, ip)?;
        self.cpu.set_ip(ip.wrapping_add(4));
        Ok(value)
    }

    pub fn register(&self, pid: u32, index: u32) -> Res<u32> {
        self.cpu
            .register(index)
            .ok_or(Error::InvalidRegister { pid, index })
    }

    pub fn register_mut(&mut self, pid: u32, index: u32) -> Res<&mut u32> {
        self.cpu
            .register_mut(index)
            .ok_or(Error::InvalidRegister { pid, index })
    }

    pub fn set_register(&mut self, pid: u32, index: u32, value: u32) -> Res<()> {
        *self.register_mut(pid, index)? = value;
        Ok(())
    }

    pub fn dump_ram(&self) -> String {
        self.mem.ram().dump(None, None)
    }
}
