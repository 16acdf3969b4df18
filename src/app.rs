use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::{
    asm::Program,
    config::Config,
    sim::{
        console::Console,
        machine::Machine,
        os::kernel::{Kernel, RunSummary},
    },
};

pub fn load_program(path: &Path) -> Result<Program> {
    let src = fs::read_to_string(path)
        .with_context(|| format!("failed to read program {}", path.display()))?;
    Program::parse(&src).with_context(|| format!("failed to parse program {}", path.display()))
}

/// Build the machine and kernel and create one process per program file.
pub fn boot(config: &Config, files: &[PathBuf], console: Console) -> Result<(Machine, Kernel)> {
    config.validate().context("invalid configuration")?;
    let mut machine = Machine::new(config, console).context("failed to build the machine")?;
    let mut kernel = Kernel::new(config);

    for path in files {
        let program = load_program(path)?;
        if config.dump_program {
            info!("{}:\n{}", path.display(), program);
        }
        let pid = kernel
            .create_process(&mut machine, &program.memory_image())
            .with_context(|| format!("failed to create a process for {}", path.display()))?;
        info!("loaded {} as process {}", path.display(), pid);
    }
    Ok((machine, kernel))
}

pub fn run(config: &Config, files: &[PathBuf], console: Console) -> Result<RunSummary> {
    let (mut machine, mut kernel) = boot(config, files, console)?;
    let summary = kernel.run(&mut machine)?;
    Ok(summary)
}
