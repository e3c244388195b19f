//! Kernel monitor
//!
//! A small command interpreter for inspecting and poking an environment's
//! address space. Each command gets the whitespace-separated words of its
//! line and writes its report to a text sink.

mod commands;

use std::fmt::{self, Write};
use std::sync::Arc;

use cowfork_api::EnvId;

use crate::kernel::Kernel;

pub use commands::{COMMANDS, DUMPMEM_MAX_WORDS};

/// Words a command line may hold, the command name included
pub const MAXARGS: usize = 16;

/// Handler signature shared by every command
pub type CommandFn = fn(&mut Monitor, &[&str], &mut dyn Write) -> fmt::Result;

/// One entry of the command table
pub struct Command {
    /// Word that invokes the command
    pub name: &'static str,
    /// One-line description for `help`
    pub desc: &'static str,
    /// Handler
    pub func: CommandFn,
}

/// Interactive monitor bound to a kernel and a target environment
pub struct Monitor {
    kernel: Arc<Kernel>,
    target: EnvId,
}

impl Monitor {
    /// Creates a monitor inspecting `target`
    pub fn new(kernel: Arc<Kernel>, target: EnvId) -> Self {
        Self { kernel, target }
    }

    /// The kernel being inspected
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Environment whose address space virtual-address commands act on
    pub fn target(&self) -> EnvId {
        self.target
    }

    pub(crate) fn set_target(&mut self, target: EnvId) {
        self.target = target;
    }

    /// Greeting printed when an interactive session starts
    pub fn banner(&self, out: &mut dyn Write) -> fmt::Result {
        writeln!(out, "Welcome to the cowfork kernel monitor!")?;
        writeln!(out, "Type 'help' for a list of commands.")
    }

    /// Parses and runs one command line
    pub fn runcmd(&mut self, line: &str, out: &mut dyn Write) -> fmt::Result {
        let argv: Vec<&str> = line.split_whitespace().collect();
        if argv.len() >= MAXARGS {
            return writeln!(out, "Too many arguments (max {})", MAXARGS);
        }
        let Some(name) = argv.first() else {
            return Ok(());
        };
        match COMMANDS.iter().find(|command| command.name == *name) {
            Some(command) => (command.func)(self, &argv, out),
            None => writeln!(out, "Unknown command '{}'", name),
        }
    }

    /// Runs one command line and returns what it printed
    pub fn execute(&mut self, line: &str) -> String {
        let mut out = String::new();
        self.runcmd(line, &mut out).ok();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

    fn monitor() -> Monitor {
        let kernel = Kernel::new(KernelConfig::default());
        let env = kernel.create_env().expect("env");
        Monitor::new(kernel, env)
    }

    #[test]
    fn test_blank_line_prints_nothing() {
        assert_eq!(monitor().execute("  \t "), "");
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(monitor().execute("frobnicate now"), "Unknown command 'frobnicate'\n");
    }

    #[test]
    fn test_too_many_arguments() {
        let line = vec!["help"; MAXARGS].join(" ");
        assert_eq!(monitor().execute(&line), "Too many arguments (max 16)\n");
        let line = vec!["help"; MAXARGS - 1].join(" ");
        assert!(monitor().execute(&line).starts_with("help - "));
    }
}
