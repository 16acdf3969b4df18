use std::fs;

use tinyos::asm::Program;
use tinyos::config::Config;
use tinyos::sim::console::Console;
use tinyos::sim::error::{Error, Res};
use tinyos::sim::machine::Machine;
use tinyos::sim::os::kernel::{Kernel, RunSummary};

fn run_programs(config: &Config, srcs: &[&str], input: &str) -> (Res<RunSummary>, Vec<String>) {
    let (console, transcript) = Console::capture(input);
    let mut m = Machine::new(config, console).unwrap();
    let mut kernel = Kernel::new(config);
    for src in srcs {
        let image = Program::parse(src).unwrap().memory_image();
        kernel.create_process(&mut m, &image).unwrap();
    }
    let res = kernel.run(&mut m);
    (res, transcript.lines())
}

#[test]
fn increment_and_print() {
    let (res, out) = run_programs(
        &Config::default(),
        &["Movi r1 $5\nIncr r1\nPrintr r1\nExit"],
        "",
    );
    let summary = res.unwrap();
    assert_eq!(vec!["6"], out);
    assert_eq!(1, summary.stats.len());
    assert_eq!(4, summary.stats[0].clock_cycles);
}

#[test]
fn numeric_opcodes() {
    let (res, out) = run_programs(&Config::default(), &["6 r1 $5\n1 r1\n11 r1\n27"], "");
    res.unwrap();
    assert_eq!(vec!["6"], out);
}

#[test]
fn input_is_read_per_line() {
    let (res, out) = run_programs(
        &Config::default(),
        &["Input r1\nAddi r1 $1\nPrintr r1\nExit"],
        "41\n",
    );
    res.unwrap();
    assert_eq!(vec!["42"], out);
}

#[test]
fn alloc_until_heap_is_exhausted() {
    let src = "Movi r1 $64\nAlloc r1 r2\nPrintr r2\nAlloc r1 r3\nPrintr r3\nExit";

    // heap spans 80..448, room for both
    let roomy = Config {
        process_memory: 512,
        ..Config::default()
    };
    let (res, out) = run_programs(&roomy, &[src], "");
    res.unwrap();
    assert_eq!(vec!["80", "144"], out);

    // heap spans 80..192, the second request does not fit
    let (res, out) = run_programs(&Config::default(), &[src], "");
    let summary = res.unwrap();
    assert_eq!(vec!["80"], out);
    assert_eq!(1, summary.stats.len());
}

#[test]
fn alloc_that_cannot_fit_faults_only_the_caller() {
    let huge = "Movi r1 $-1\nAlloc r1 r2\nPrintr r2\nExit";
    let empty = "Movi r1 $0\nAlloc r1 r2\nPrintr r2\nExit";
    let fine = "Printr r8\nExit";
    let (res, out) = run_programs(&Config::default(), &[huge, empty, fine], "");
    let summary = res.unwrap();
    assert_eq!(vec!["3"], out);
    assert_eq!(3, summary.stats.len());
}

#[test]
fn higher_priority_runs_first() {
    let low = "Noop\nNoop\nNoop\nNoop\nNoop\nPrintr r8\nExit";
    let high = "Movi r1 $9\nSetPriority r1\nNoop\nNoop\nNoop\nPrintr r8\nExit";
    let (res, out) = run_programs(&Config::default(), &[low, high], "");
    res.unwrap();
    assert_eq!(vec!["2", "1"], out);
}

#[test]
fn lock_is_held_exclusively() {
    let first = "Movi r1 $1\nAcquireLock r1\nMovi r2 $100\nPrintr r2\nNoop\n\
                 Noop\nMovi r2 $101\nPrintr r2\nReleaseLock r1\nExit";
    let second = "Movi r1 $1\nAcquireLock r1\nMovi r2 $200\nPrintr r2\nReleaseLock r1\nExit";
    let (res, out) = run_programs(&Config::default(), &[first, second], "");
    res.unwrap();
    assert_eq!(vec!["100", "101", "200"], out);
}

#[test]
fn event_wakes_exactly_one_waiter() {
    let signal = "Movi r1 $3\nSignalEvent r1\nExit";
    let wait = "Movi r1 $3\nWaitEvent r1\nPrintr r8\nExit";
    let (res, out) = run_programs(&Config::default(), &[signal, wait, wait], "");
    assert_eq!(vec!["2"], out);
    match res {
        Err(Error::Deadlock { pids }) => assert_eq!(vec![3], pids),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn sleeper_wakes_while_idle() {
    let (res, out) = run_programs(
        &Config::default(),
        &["Movi r1 $3\nSleep r1\nPrintr r8\nExit"],
        "",
    );
    let summary = res.unwrap();
    assert_eq!(vec!["1"], out);
    assert_eq!(7, summary.clock);
    assert_eq!(4, summary.stats[0].clock_cycles);
}

#[test]
fn faults_only_terminate_the_offender() {
    let wild = "Movi r1 $5000\nMovmr r2 r1\nPrintr r8\nExit";
    // calls itself until the stack runs out
    let recursive = "Movi r1 $-5\nCall r1";
    let fine = "Printr r8\nExit";
    let (res, out) = run_programs(&Config::default(), &[wild, recursive, fine], "");
    let summary = res.unwrap();
    assert_eq!(vec!["3"], out);
    assert_eq!(3, summary.stats.len());
}

#[test]
fn terminate_another_process() {
    let killer = "Movi r1 $2\nTerminateProcess r1\nPrintr r8\nExit";
    let victim = "Printr r8\nExit";
    let (res, out) = run_programs(&Config::default(), &[killer, victim], "");
    let summary = res.unwrap();
    assert_eq!(vec!["1"], out);
    let victim_stats = summary.stats.iter().find(|s| s.pid == 2).unwrap();
    assert_eq!(0, victim_stats.clock_cycles);
}

#[test]
fn shared_memory_between_processes() {
    let writer = "Movi r1 $1\nMapSharedMem r1 r2\nMovi r3 $42\nMovrm r2 r3\nMovi r4 $1\n\
                  SignalEvent r4\nExit";
    let reader = "Movi r4 $1\nWaitEvent r4\nMovi r1 $1\nMapSharedMem r1 r2\nMovmr r3 r2\n\
                  Printr r3\nExit";
    let (res, out) = run_programs(&Config::default(), &[writer, reader], "");
    res.unwrap();
    assert_eq!(vec!["42"], out);
}

#[test]
fn pages_survive_swapping_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        physical_memory: 64,
        process_memory: 256,
        stack_size: 32,
        data_size: 16,
        shared_regions: 0,
        swap_dir: Some(dir.path().to_path_buf()),
        ..Config::default()
    };
    let src = "Movi r1 $160\nMovi r2 $11\nMovrm r1 r2\n\
               Movi r1 $200\nMovi r2 $22\nMovrm r1 r2\n\
               Movi r1 $160\nMovmr r3 r1\nPrintr r3\n\
               Movi r1 $200\nMovmr r3 r1\nPrintr r3\nExit";
    let (res, out) = run_programs(&config, &[src], "");
    let summary = res.unwrap();
    assert_eq!(vec!["11", "22"], out);
    assert!(summary.stats[0].page_faults > 0);
    // every record is discarded when the process is released
    assert_eq!(0, fs::read_dir(dir.path()).unwrap().count());
}

#[test]
fn out_of_memory_at_creation_is_fatal() {
    let config = Config {
        virtual_memory: 512,
        shared_regions: 0,
        ..Config::default()
    };
    let (console, _) = Console::capture("");
    let mut m = Machine::new(&config, console).unwrap();
    let mut kernel = Kernel::new(&config);
    let image = Program::parse("Exit").unwrap().memory_image();
    kernel.create_process(&mut m, &image).unwrap();
    kernel.create_process(&mut m, &image).unwrap();
    match kernel.create_process(&mut m, &image) {
        Err(Error::OutOfMemory { pid, bytes }) => assert_eq!((3, 256), (pid, bytes)),
        other => panic!("unexpected {:?}", other),
    }
}
