//! Shell commands that expose the debugger to the user.
//!
//! The application owns the shell: it reads a line, and hands it to
//! [`execute`] together with a [`CommandContext`]. Every handler reports to the
//! console and returns `0` on success and `-1` on failure.

use crate::config::Config;
use crate::console::{ByteSink, Console};
use crate::console_line;
use crate::control::MonitorControl;
use crate::error::Error;
use crate::fpb::Fpb;
use crate::log;
use crate::memory::MemoryInterface;
use num_traits::Num;

/// Maximum number of whitespace separated words in one command line.
pub const MAX_ARGS: usize = 16;

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    /// The target memory.
    pub memory: &'a mut dyn MemoryInterface,
    /// Output towards the user.
    pub console: Console<&'a mut dyn ByteSink>,
    /// Used by `debug_mon_en`.
    pub config: Config,
    /// Issues a breakpoint instruction, for `bkpt`.
    pub trap: fn(),
}

impl<'a> CommandContext<'a> {
    /// Create a context over `memory` and `output`.
    pub fn new(
        memory: &'a mut dyn MemoryInterface,
        output: &'a mut dyn ByteSink,
        config: Config,
        trap: fn(),
    ) -> Self {
        Self {
            memory,
            console: Console::new(output),
            config,
            trap,
        }
    }
}

/// A command handler. `argv[0]` is the command name.
pub type Handler = fn(&mut CommandContext<'_>, &[&str]) -> i32;

/// An entry of the command table.
pub struct ShellCommand {
    /// Name typed by the user.
    pub command: &'static str,
    /// One line of help.
    pub help_text: &'static str,
    /// Called with the whole argument vector.
    pub handler: Handler,
}

static BKPT: ShellCommand = ShellCommand {
    command: "bkpt",
    help_text: "Issue a Breakpoint Instruction",
    handler: |context, _| {
        (context.trap)();
        0
    },
};

static DEBUG_MON_EN: ShellCommand = ShellCommand {
    command: "debug_mon_en",
    help_text: "Enable Monitor Debug Mode",
    handler: |context, _| {
        let result = enable_monitor(context);
        report(context, result)
    },
};

static DEBUG_MON_OFF: ShellCommand = ShellCommand {
    command: "debug_mon_off",
    help_text: "Disable Monitor Debug Mode",
    handler: |context, _| {
        MonitorControl::new(&mut *context.memory).disable();
        console_line!(context.console, "Monitor Mode Debug Disabled!");
        0
    },
};

static FPB_DUMP: ShellCommand = ShellCommand {
    command: "fpb_dump",
    help_text: "Dump Active FPB Settings",
    handler: |context, _| {
        let result = Fpb::new(&mut *context.memory)
            .dump_all(&mut context.console)
            .map_err(Error::from);
        report(context, result)
    },
};

static FPB_SET_BREAKPOINT: ShellCommand = ShellCommand {
    command: "fpb_set_breakpoint",
    help_text: "Set Breakpoint [Comp Id] [Address]",
    handler: |context, argv| {
        let [_, comp_id, address, ..] = argv else {
            console_line!(context.console, "Expected [Comp Id] [Address]");
            return -1;
        };
        let (Some(comp_id), Some(address)) = (
            parse_argument::<usize>(context, comp_id),
            parse_argument::<u32>(context, address),
        ) else {
            return -1;
        };

        let result = set_breakpoint(context, comp_id, address);
        report(context, result)
    },
};

static FPB_CLEAR_BREAKPOINT: ShellCommand = ShellCommand {
    command: "fpb_clear_breakpoint",
    help_text: "Clear Breakpoint [Comp Id]",
    handler: |context, argv| {
        let [_, comp_id, ..] = argv else {
            console_line!(context.console, "Expected [Comp Id]");
            return -1;
        };
        let Some(comp_id) = parse_argument::<usize>(context, comp_id) else {
            return -1;
        };

        let result = clear_breakpoint(context, comp_id);
        report(context, result)
    },
};

static HELP: ShellCommand = ShellCommand {
    command: "help",
    help_text: "Lists all commands",
    handler: |context, _| {
        for command in SHELL_COMMANDS {
            console_line!(
                context.console,
                "{}: {}",
                command.command,
                command.help_text
            );
        }
        0
    },
};

/// Every command, in the order `help` lists them.
pub static SHELL_COMMANDS: &[&ShellCommand] = &[
    &BKPT,
    &DEBUG_MON_EN,
    &DEBUG_MON_OFF,
    &FPB_DUMP,
    &FPB_SET_BREAKPOINT,
    &FPB_CLEAR_BREAKPOINT,
    &HELP,
];

/// Look up a command by name.
pub fn find(command: &str) -> Option<&'static ShellCommand> {
    SHELL_COMMANDS
        .iter()
        .copied()
        .find(|candidate| candidate.command == command)
}

/// Run the command named by `argv[0]`.
///
/// An empty argument vector does nothing and succeeds.
pub fn dispatch(context: &mut CommandContext<'_>, argv: &[&str]) -> i32 {
    let Some(name) = argv.first() else {
        return 0;
    };

    match find(name) {
        Some(command) => {
            log::debug!("Running command {:?}", argv);
            (command.handler)(context, argv)
        }
        None => {
            console_line!(context.console, "Unknown command: {}", name);
            console_line!(context.console, "Type 'help' to list all commands");
            -1
        }
    }
}

/// Split `line` on whitespace and run it.
///
/// Words beyond [`MAX_ARGS`] are dropped.
pub fn execute(context: &mut CommandContext<'_>, line: &str) -> i32 {
    let mut argv = [""; MAX_ARGS];
    let mut argc = 0;

    for (slot, word) in argv.iter_mut().zip(line.split_ascii_whitespace()) {
        *slot = word;
        argc += 1;
    }

    dispatch(context, &argv[..argc])
}

/// Parse an unsigned number the way C's `strtoul(.., 0)` does.
///
/// `0x` selects hexadecimal and a leading `0` octal. `0b` for binary is
/// accepted as well. Anything else is decimal.
pub fn parse_number<T: Num>(input: &str) -> Option<T> {
    let (digits, radix) = if let Some(hex) = strip_radix_prefix(input, 'x') {
        (hex, 16)
    } else if let Some(binary) = strip_radix_prefix(input, 'b') {
        (binary, 2)
    } else if let Some(octal) = input.strip_prefix('0').filter(|rest| !rest.is_empty()) {
        (octal, 8)
    } else {
        (input, 10)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }

    T::from_str_radix(digits, radix).ok()
}

/// Print the outcome of a command and turn it into its status.
pub fn report(context: &mut CommandContext<'_>, result: Result<(), Error>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(error) => {
            console_line!(context.console, "{}", error);
            -1
        }
    }
}

fn enable_monitor(context: &mut CommandContext<'_>) -> Result<(), Error> {
    let config = context.config;
    MonitorControl::new(&mut *context.memory).enable(&config)?;
    console_line!(context.console, "Monitor Mode Debug Enabled!");
    Ok(())
}

fn set_breakpoint(
    context: &mut CommandContext<'_>,
    comp_id: usize,
    address: u32,
) -> Result<(), Error> {
    let mut fpb = Fpb::new(&mut *context.memory);
    let result = fpb.set_breakpoint(comp_id, address);
    let outcome = match result {
        Ok(()) => "Succeeded",
        Err(_) => "Failed",
    };
    console_line!(
        context.console,
        "Set breakpoint on address {:#x} in FP_COMP[{}] {}",
        address,
        comp_id,
        outcome
    );
    result?;
    Ok(())
}

fn clear_breakpoint(context: &mut CommandContext<'_>, comp_id: usize) -> Result<(), Error> {
    Fpb::new(&mut *context.memory).clear_breakpoint(comp_id)?;
    console_line!(context.console, "Cleared FP_COMP[{}]", comp_id);
    Ok(())
}

fn strip_radix_prefix(input: &str, radix: char) -> Option<&str> {
    let rest = input.strip_prefix('0')?;
    rest.strip_prefix(radix)
        .or_else(|| rest.strip_prefix(radix.to_ascii_uppercase()))
}

fn parse_argument<T: Num>(context: &mut CommandContext<'_>, argument: &str) -> Option<T> {
    let number = parse_number(argument);
    if number.is_none() {
        console_line!(context.console, "Invalid number '{}'", argument);
    }
    number
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::{FpbError, MonitorError};
    use crate::memory::MemoryMappedRegister;
    use crate::test::MockMemory;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    #[test_case("0x080009A4", Some(0x0800_09a4); "hex")]
    #[test_case("0X1f", Some(0x1f); "upper case hex")]
    #[test_case("017", Some(15); "octal")]
    #[test_case("010", Some(8); "leading zero is octal")]
    #[test_case("08", None; "not an octal digit")]
    #[test_case("0o17", None; "no octal prefix")]
    #[test_case("0b101", Some(5); "binary")]
    #[test_case("42", Some(42); "decimal")]
    #[test_case("0", Some(0); "zero")]
    #[test_case("0x", None; "prefix only")]
    #[test_case("-1", None; "negative")]
    #[test_case("12ab", None; "garbage")]
    #[test_case("0x1_0000_0000", None; "separators")]
    fn numbers(input: &str, expected: Option<u32>) {
        assert_eq!(parse_number::<u32>(input), expected);
    }

    fn run(memory: &mut MockMemory, line: &str) -> (i32, String) {
        let mut output = Vec::new();
        let status = {
            let mut context = CommandContext::new(memory, &mut output, Config::default(), || {});
            execute(&mut context, line)
        };
        (status, String::from_utf8(output).unwrap())
    }

    #[test]
    fn set_breakpoint() {
        let mut memory = MockMemory::with_fpb(0x0000_0260, 6);

        let (status, output) = run(&mut memory, "fpb_set_breakpoint 1 0x08000142");

        assert_eq!(status, 0);
        assert_eq!(
            output,
            "Set breakpoint on address 0x8000142 in FP_COMP[1] Succeeded\r\n"
        );
    }

    #[test]
    fn set_breakpoint_out_of_range() {
        let mut memory = MockMemory::with_fpb(0x0000_0260, 6);

        let (status, output) = run(&mut memory, "fpb_set_breakpoint 6 0x08000142");

        assert_eq!(status, -1);
        let failed = "Set breakpoint on address 0x8000142 in FP_COMP[6] Failed\r\n";
        assert!(output.starts_with(failed));
    }

    #[test_case("fpb_set_breakpoint 1", "Expected [Comp Id] [Address]\r\n"; "missing address")]
    #[test_case("fpb_set_breakpoint one 0x10", "Invalid number 'one'\r\n"; "bad comp id")]
    #[test_case("fpb_clear_breakpoint", "Expected [Comp Id]\r\n"; "missing comp id")]
    #[test_case("frobnicate 1 2", "Unknown command: frobnicate\r\nType 'help' to list all commands\r\n"; "unknown")]
    fn rejected(line: &str, message: &str) {
        let mut memory = MockMemory::with_fpb(0x0000_0260, 6);

        let (status, output) = run(&mut memory, line);

        assert_eq!(status, -1);
        assert_eq!(output, message);
        assert!(memory.writes().is_empty());
    }

    #[test]
    fn empty_line_does_nothing() {
        let mut memory = MockMemory::new();

        assert_eq!(run(&mut memory, "  \t "), (0, String::new()));
    }

    #[test]
    fn help_lists_every_command() {
        let mut memory = MockMemory::new();

        let (status, output) = run(&mut memory, "help");

        assert_eq!(status, 0);
        assert_eq!(output.lines().count(), SHELL_COMMANDS.len());
        let help_line = "fpb_set_breakpoint: Set Breakpoint [Comp Id] [Address]\r\n";
        assert!(output.contains(help_line));
    }

    #[test]
    fn bkpt_runs_the_trap() {
        static TRAPS: AtomicUsize = AtomicUsize::new(0);

        let mut memory = MockMemory::new();
        let mut output = Vec::new();
        let mut context = CommandContext::new(&mut memory, &mut output, Config::default(), || {
            TRAPS.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(execute(&mut context, "bkpt"), 0);
        assert_eq!(TRAPS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn report_prints_errors_and_maps_status() {
        let mut memory = MockMemory::new();
        let mut output = Vec::new();
        let mut context = CommandContext::new(&mut memory, &mut output, Config::default(), || {});

        let revision = Error::from(FpbError::UnsupportedRevision(1));
        let halting = Error::from(MonitorError::AlreadyUnderHaltingDebug);

        assert_eq!(report(&mut context, Ok(())), 0);
        assert_eq!(report(&mut context, Err(revision)), -1);
        assert_eq!(report(&mut context, Err(halting)), -1);
        drop(context);

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "FPB revision 1 is not supported, only revision 0 comparators can be programmed.\r\n\
             Halting debug is enabled, monitor mode debug cannot be enabled.\r\n"
        );
    }

    #[test]
    fn monitor_enable_is_refused_under_halting_debug() {
        let mut memory = MockMemory::with_debug_registers(0x0000_0260, 6, 0);
        memory.add_word(crate::registers::Dhcsr::ADDRESS, 1);

        let (status, output) = run(&mut memory, "debug_mon_en");

        assert_eq!(status, -1);
        assert_eq!(
            output,
            "Halting debug is enabled, monitor mode debug cannot be enabled.\r\n"
        );
    }
}
