use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sim::error::{Error, Res};
use crate::sim::os::paging::MemoryLayout;
use crate::sim::ram::round_to_boundary;

/// Settings read once at startup. Every key is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub physical_memory: u32,
    pub virtual_memory: u32,
    pub page_size: u32,
    pub process_memory: u32,
    pub stack_size: u32,
    pub data_size: u32,
    pub shared_region_size: u32,
    pub shared_regions: u32,
    pub time_quantum: u32,
    pub max_cycles: Option<u64>,
    pub swap_dir: Option<PathBuf>,

    pub dump_instruction: bool,
    pub dump_registers: bool,
    pub dump_physical_memory: bool,
    pub dump_context_switch: bool,
    pub dump_program: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            physical_memory: 512,
            virtual_memory: 1024,
            page_size: 16,
            process_memory: 256,
            stack_size: 64,
            data_size: 32,
            shared_region_size: 32,
            shared_regions: 2,
            time_quantum: 5,
            max_cycles: None,
            swap_dir: None,
            dump_instruction: false,
            dump_registers: false,
            dump_physical_memory: false,
            dump_context_switch: false,
            dump_program: false,
        }
    }
}

impl Config {
    pub fn from_json(src: &str) -> Res<Config> {
        serde_json::from_str(src).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Res<Config> {
        let src = fs::read_to_string(path)?;
        Config::from_json(&src)
    }

    pub fn validate(&self) -> Res<()> {
        let invalid = |msg: String| Err(Error::Config(msg));
        if self.page_size == 0 {
            return invalid("page_size must be non-zero".to_string());
        }
        if self.physical_memory < self.page_size {
            return invalid(format!(
                "physical_memory {} is smaller than one page",
                self.physical_memory
            ));
        }
        if self.virtual_memory < self.physical_memory {
            return invalid(format!(
                "virtual_memory {} is smaller than physical_memory {}",
                self.virtual_memory, self.physical_memory
            ));
        }
        for (name, bytes) in [
            ("physical_memory", self.physical_memory),
            ("virtual_memory", self.virtual_memory),
            ("process_memory", self.process_memory),
            ("shared_region_size", self.shared_region_size),
        ] {
            if round_to_boundary(bytes, self.page_size).is_none() {
                return invalid(format!("{} {} cannot be rounded to a page", name, bytes));
            }
        }
        let reserved = self.stack_size.checked_add(self.data_size);
        if reserved.map_or(true, |r| r > self.process_memory) {
            return invalid(format!(
                "stack_size {} plus data_size {} exceed process_memory {}",
                self.stack_size, self.data_size, self.process_memory
            ));
        }
        if self.time_quantum == 0 {
            return invalid("time_quantum must be non-zero".to_string());
        }
        Ok(())
    }

    pub fn memory_layout(&self) -> MemoryLayout {
        MemoryLayout {
            physical_memory: self.physical_memory,
            virtual_memory: self.virtual_memory,
            page_size: self.page_size,
            shared_region_size: self.shared_region_size,
            shared_regions: self.shared_regions,
        }
    }
}
