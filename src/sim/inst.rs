use std::fmt;

/// Register indices with a fixed meaning. Index 0 is never used by programs.
pub const REG_PID: usize = 8;
pub const REG_DATA: usize = 9;
pub const REG_SP: usize = 10;
pub const REG_IP: usize = 11;
pub const NUM_REGISTERS: usize = 12;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Opcode {
    Noop = 0,
    Incr = 1,
    Addi = 2,
    Addr = 3,
    Pushr = 4,
    Pushi = 5,
    Movi = 6,
    Movr = 7,
    Movmr = 8,
    Movrm = 9,
    Movmm = 10,
    Printr = 11,
    Printm = 12,
    Jmp = 13,
    Cmpi = 14,
    Cmpr = 15,
    Jlt = 16,
    Jgt = 17,
    Je = 18,
    Call = 19,
    Callm = 20,
    Ret = 21,
    Alloc = 22,
    AcquireLock = 23,
    ReleaseLock = 24,
    Sleep = 25,
    SetPriority = 26,
    Exit = 27,
    FreeMemory = 28,
    MapSharedMem = 29,
    SignalEvent = 30,
    WaitEvent = 31,
    Input = 32,
    MemoryClear = 33,
    TerminateProcess = 34,
    Popr = 35,
    Popm = 36,
}

const OPCODES: [Opcode; 37] = [
    Opcode::Noop,
    Opcode::Incr,
    Opcode::Addi,
    Opcode::Addr,
    Opcode::Pushr,
    Opcode::Pushi,
    Opcode::Movi,
    Opcode::Movr,
    Opcode::Movmr,
    Opcode::Movrm,
    Opcode::Movmm,
    Opcode::Printr,
    Opcode::Printm,
    Opcode::Jmp,
    Opcode::Cmpi,
    Opcode::Cmpr,
    Opcode::Jlt,
    Opcode::Jgt,
    Opcode::Je,
    Opcode::Call,
    Opcode::Callm,
    Opcode::Ret,
    Opcode::Alloc,
    Opcode::AcquireLock,
    Opcode::ReleaseLock,
    Opcode::Sleep,
    Opcode::SetPriority,
    Opcode::Exit,
    Opcode::FreeMemory,
    Opcode::MapSharedMem,
    Opcode::SignalEvent,
    Opcode::WaitEvent,
    Opcode::Input,
    Opcode::MemoryClear,
    Opcode::TerminateProcess,
    Opcode::Popr,
    Opcode::Popm,
];

impl Opcode {
    pub fn all() -> &'static [Opcode] {
        &OPCODES
    }

    /// Number of 4-byte operands following the opcode byte.
    pub fn arity(self) -> usize {
        match self {
            Opcode::Noop | Opcode::Ret | Opcode::Exit => 0,
            Opcode::Incr
            | Opcode::Pushr
            | Opcode::Pushi
            | Opcode::Printr
            | Opcode::Printm
            | Opcode::Jmp
            | Opcode::Jlt
            | Opcode::Jgt
            | Opcode::Je
            | Opcode::Call
            | Opcode::Callm
            | Opcode::AcquireLock
            | Opcode::ReleaseLock
            | Opcode::Sleep
            | Opcode::SetPriority
            | Opcode::FreeMemory
            | Opcode::SignalEvent
            | Opcode::WaitEvent
            | Opcode::Input
            | Opcode::TerminateProcess
            | Opcode::Popr
            | Opcode::Popm => 1,
            Opcode::Addi
            | Opcode::Addr
            | Opcode::Movi
            | Opcode::Movr
            | Opcode::Movmr
            | Opcode::Movrm
            | Opcode::Movmm
            | Opcode::Cmpi
            | Opcode::Cmpr
            | Opcode::Alloc
            | Opcode::MapSharedMem
            | Opcode::MemoryClear => 2,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Noop => "Noop",
            Opcode::Incr => "Incr",
            Opcode::Addi => "Addi",
            Opcode::Addr => "Addr",
            Opcode::Pushr => "Pushr",
            Opcode::Pushi => "Pushi",
            Opcode::Movi => "Movi",
            Opcode::Movr => "Movr",
            Opcode::Movmr => "Movmr",
            Opcode::Movrm => "Movrm",
            Opcode::Movmm => "Movmm",
            Opcode::Printr => "Printr",
            Opcode::Printm => "Printm",
            Opcode::Jmp => "Jmp",
            Opcode::Cmpi => "Cmpi",
            Opcode::Cmpr => "Cmpr",
            Opcode::Jlt => "Jlt",
            Opcode::Jgt => "Jgt",
            Opcode::Je => "Je",
            Opcode::Call => "Call",
            Opcode::Callm => "Callm",
            Opcode::Ret => "Ret",
            Opcode::Alloc => "Alloc",
            Opcode::AcquireLock => "AcquireLock",
            Opcode::ReleaseLock => "ReleaseLock",
            Opcode::Sleep => "Sleep",
            Opcode::SetPriority => "SetPriority",
            Opcode::Exit => "Exit",
            Opcode::FreeMemory => "FreeMemory",
            Opcode::MapSharedMem => "MapSharedMem",
            Opcode::SignalEvent => "SignalEvent",
            Opcode::WaitEvent => "WaitEvent",
            Opcode::Input => "Input",
            Opcode::MemoryClear => "MemoryClear",
            Opcode::TerminateProcess => "TerminateProcess",
            Opcode::Popr => "Popr",
            Opcode::Popm => "Popm",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        OPCODES
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

pub fn decode_opcode(x: u8) -> Option<Opcode> {
    OPCODES.get(x as usize).copied()
}

pub fn encode_opcode(op: Opcode) -> u8 {
    op as u8
}
