//! cowmon: boots a small address space, forks it, and hands the result to
//! the kernel monitor.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use cowfork::{fork, Fork};
use cowfork_api::{EnvId, ErrorContext, Primitive, PteFlags, Syscalls, UserMemory, VirtAddr, PAGE_SIZE};
use cowfork_kernel::{Kernel, KernelConfig, Monitor, UserEnv};
use cowfork_memory::DEFAULT_LAYOUT;
use log::{Level, LevelFilter, Metadata, Record};

/// Logger writing `[LEVEL] message` lines to stderr
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        eprintln!("[{}] {}", level, record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn init_logger() {
    let level = std::env::var("COWMON_LOG")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Warn);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

const MAGIC_TEXT: u32 = 0x7e57_c0de;
const MAGIC_HEAP: u32 = 0x00c0_ffee;
const MAGIC_CHILD: u32 = 0x0000_beef;

fn heap() -> VirtAddr {
    DEFAULT_LAYOUT.utext.offset(PAGE_SIZE)
}

/// Parent side: a text page, a heap page and a stack page, then fork.
fn populate_and_fork(ctx: &UserEnv) -> cowfork::Result<Fork> {
    let text = DEFAULT_LAYOUT.utext;
    for va in [text, heap(), DEFAULT_LAYOUT.stack_page()] {
        ctx.page_alloc(EnvId::CURRENT, va, PteFlags::USER_RW)
            .context(Primitive::PageAlloc)?;
    }
    ctx.store_u32(text, MAGIC_TEXT);
    ctx.page_map(EnvId::CURRENT, text, EnvId::CURRENT, text, PteFlags::USER_READ)
        .context(Primitive::PageMap)?;
    ctx.store_u32(heap(), MAGIC_HEAP);
    Ok(fork(ctx))
}

fn boot(kernel: &Arc<Kernel>) -> Result<(EnvId, EnvId), Box<dyn Error>> {
    let parent = kernel.create_env()?;
    let child = match kernel.run(parent, populate_and_fork)?? {
        Fork::Parent(child) => child,
        Fork::Child => return Err("fork returned the child sentinel to the parent".into()),
    };
    // the child resumes from fork and dirties its copy of the heap
    kernel.run(child, |ctx| {
        if fork(ctx) == Fork::Child {
            ctx.store_u32(heap(), MAGIC_CHILD);
        }
    })?;
    Ok((parent, child))
}

fn main() -> ExitCode {
    init_logger();
    let kernel = Kernel::new(KernelConfig::default());
    let (parent, child) = match boot(&kernel) {
        Ok(ids) => ids,
        Err(err) => {
            eprintln!("cowmon: boot failed: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut monitor = Monitor::new(Arc::clone(&kernel), parent);
    let mut greeting = String::new();
    let _ = monitor.banner(&mut greeting);
    print!("{}", greeting);
    println!("Environment {} forked {}; heap page at {}.", parent, child, heap());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("K> ");
        let _ = stdout.flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => print!("{}", monitor.execute(&line)),
            Err(err) => {
                eprintln!("cowmon: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }
    println!();
    ExitCode::SUCCESS
}
