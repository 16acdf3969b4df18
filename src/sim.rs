pub mod console;
pub mod cpu;
pub mod error;
pub mod inst;
pub mod machine;
pub mod os;
pub mod ram;
