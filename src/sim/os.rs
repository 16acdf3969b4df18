pub mod kernel;
pub mod paging;
pub mod proc;
pub mod swap;
mod syscall;
