use thiserror::Error;

use super::os::swap::SwapError;

/// Faults raised by a single process. The kernel terminates the offending
/// process and keeps running everything else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("process {pid} tried to access memory at address {addr} and will be terminated")]
    Memory { pid: u32, addr: u32 },
    #[error("process {pid} tried to push {excess} too many bytes on to the stack and will be terminated")]
    Stack { pid: u32, excess: u32 },
    #[error("process {pid} tried to alloc {bytes} bytes more from the heap than were free and will be terminated")]
    Heap { pid: u32, bytes: u32 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("out of memory: process {pid} requested {bytes} more bytes than were available")]
    OutOfMemory { pid: u32, bytes: u32 },
    #[error("program image of {image} bytes does not fit in {memory} bytes of process memory")]
    ImageTooLarge { image: usize, memory: u32 },
    #[error("process {pid} hit invalid opcode {opcode} at ip {ip}")]
    InvalidOpcode { pid: u32, ip: u32, opcode: u8 },
    #[error("process {pid} referenced invalid register r{index}")]
    InvalidRegister { pid: u32, index: u32 },
    #[error("malformed input: {0:?}")]
    Input(String),
    #[error("swap failure: {0}")]
    Swap(#[from] SwapError),
    #[error("console i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("deadlock: processes {pids:?} are waiting and nothing can wake them")]
    Deadlock { pids: Vec<u32> },
    #[error("clock exceeded the limit of {0} cycles")]
    CycleLimit(u64),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Error::Fault(f) => Some(f),
            _ => None,
        }
    }
}

pub type Res<T> = Result<T, Error>;
