use std::io::{BufRead, Write};
use std::ops::ControlFlow;
use std::str::FromStr;

use common::constants::MAX_INSTRUCTIONS_TO_PRINT;
use common::Word;
use emulator::{Cpu, Emulator, StepControl, StepMonitor, StepRecord};
use strum::{EnumMessage, IntoEnumIterator};
use strum_macros::{EnumIter, EnumMessage, EnumString, IntoStaticStr};
use thiserror::Error;

pub mod expr;
pub mod watchpoint;

use self::expr::{evaluate, EvalContext, ExprError};
use self::watchpoint::{WatchpointChange, WatchpointError, WatchpointPool};

pub const PROMPT: &str = "(rvdb) ";

/// Words printed per line by `x`.
const WORDS_PER_LINE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, EnumIter, EnumMessage)]
#[strum(serialize_all = "lowercase")]
pub enum Command {
    #[strum(message = "Display information about all supported commands")]
    Help,
    #[strum(message = "Continue the execution of the program")]
    C,
    #[strum(message = "Exit rvdb")]
    Q,
    #[strum(message = "Step N instructions, 1 if omitted: si [N]")]
    Si,
    #[strum(message = "Print registers or watchpoints: info r | info w")]
    Info,
    #[strum(message = "Print N words of memory starting at EXPR: x N EXPR")]
    X,
    #[strum(message = "Print the value of an expression: p EXPR")]
    P,
    #[strum(message = "Stop when the value of an expression changes: w EXPR")]
    W,
    #[strum(message = "Delete a watchpoint: d N")]
    D,
}

impl Command {
    fn describe(self) -> String {
        let name: &'static str = self.into();
        format!("{name} - {}", self.get_message().unwrap_or_default())
    }
}

#[derive(Debug, Error)]
pub enum SdbError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// returned when a command's arguments do not parse
    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Watchpoint(#[from] WatchpointError),

    /// returned when the debugger cannot write its output
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SdbError {
    /// Fatal errors end the session; everything else is reported and the
    /// prompt comes back.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SdbError::Io(_))
    }
}

/// Watches execution on behalf of the debugger: echoes instructions when
/// asked to and stops the run when a watchpoint changes.
struct WatchMonitor<'a, W: Write> {
    watchpoints: &'a mut WatchpointPool,
    changes: Vec<WatchpointChange>,
    out: &'a mut W,
    echo: bool,
    error: Option<SdbError>,
}

impl<W: Write> StepMonitor for WatchMonitor<'_, W> {
    fn on_step(&mut self, step: &StepRecord, cpu: &Cpu) -> StepControl {
        if self.echo {
            let decode = &step.decode;
            if let Err(err) = writeln!(
                self.out,
                "{:#010x}: {:08x}\t{}",
                decode.pc, decode.word, step.entry.name
            ) {
                self.error = Some(err.into());
                return StepControl::Stop;
            }
        }
        match self.watchpoints.detect_changes(cpu, &mut self.changes) {
            Ok(0) => StepControl::Continue,
            Ok(_) => StepControl::Stop,
            Err(err) => {
                self.error = Some(err.into());
                StepControl::Stop
            }
        }
    }
}

/// Simple debugger: reads commands, drives the emulator and reports back
/// on `out`.
pub struct Debugger<W: Write> {
    emulator: Emulator,
    watchpoints: WatchpointPool,
    /// Number of the next `p` result.
    print_counter: usize,
    batch: bool,
    out: W,
}

impl<W: Write> Debugger<W> {
    pub fn new(emulator: Emulator, out: W) -> Self {
        Debugger {
            emulator,
            watchpoints: WatchpointPool::new(),
            print_counter: 0,
            batch: false,
            out,
        }
    }

    /// In batch mode `mainloop` runs the program once without reading
    /// commands.
    pub fn set_batch_mode(&mut self) {
        self.batch = true;
    }

    pub fn emulator(&self) -> &Emulator {
        &self.emulator
    }

    pub fn watchpoints(&self) -> &WatchpointPool {
        &self.watchpoints
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Reads and executes commands until `q` or end of input. Only fatal
    /// errors are returned.
    pub fn mainloop<R: BufRead>(&mut self, input: R) -> Result<(), SdbError> {
        if self.batch {
            self.run(u64::MAX)?;
            return Ok(());
        }
        let mut lines = input.lines();
        loop {
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            match self.execute(&line?) {
                Ok(ControlFlow::Break(())) => break,
                Ok(ControlFlow::Continue(())) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => writeln!(self.out, "{err}")?,
            }
        }
        Ok(())
    }

    /// Executes one command line. `Break` ends the session.
    pub fn execute(&mut self, line: &str) -> Result<ControlFlow<()>, SdbError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ControlFlow::Continue(()));
        }
        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (line, ""),
        };
        let command =
            Command::from_str(name).map_err(|_| SdbError::UnknownCommand(name.to_string()))?;
        tracing::debug!(?command, args, "execute");

        match command {
            Command::Help => self.cmd_help(args)?,
            Command::C => {
                self.run(u64::MAX)?;
            }
            Command::Q => {
                self.emulator.set_quit();
                return Ok(ControlFlow::Break(()));
            }
            Command::Si => self.cmd_si(args)?,
            Command::Info => self.cmd_info(args)?,
            Command::X => self.cmd_x(args)?,
            Command::P => self.cmd_p(args)?,
            Command::W => self.cmd_w(args)?,
            Command::D => self.cmd_d(args)?,
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Runs at most `steps` instructions, `u64::MAX` for no limit, and
    /// reports the watchpoints that stopped the run.
    pub fn run(&mut self, steps: u64) -> Result<Vec<WatchpointChange>, SdbError> {
        if self.emulator.state().has_ended() {
            writeln!(
                self.out,
                "Program execution has ended. To restart the program, exit rvdb and run again."
            )?;
            return Ok(Vec::new());
        }
        let mut monitor = WatchMonitor {
            watchpoints: &mut self.watchpoints,
            changes: Vec::new(),
            out: &mut self.out,
            echo: steps < MAX_INSTRUCTIONS_TO_PRINT,
            error: None,
        };
        self.emulator.run(steps, &mut monitor);
        let WatchMonitor { changes, error, .. } = monitor;
        if let Some(err) = error {
            return Err(err);
        }
        for change in &changes {
            writeln!(
                self.out,
                "\nwatchpoint {}: {}\n\nOld value = {}\nNew value = {}",
                change.no, change.expr, change.old_value, change.new_value
            )?;
        }
        if let Some(report) = self.emulator.end_report() {
            writeln!(self.out, "{report}")?;
            writeln!(
                self.out,
                "total guest instructions = {}",
                self.emulator.statistics().instructions
            )?;
        }
        Ok(changes)
    }

    fn cmd_help(&mut self, args: &str) -> Result<(), SdbError> {
        if args.is_empty() {
            for command in Command::iter() {
                writeln!(self.out, "{}", command.describe())?;
            }
            return Ok(());
        }
        let command =
            Command::from_str(args).map_err(|_| SdbError::UnknownCommand(args.to_string()))?;
        writeln!(self.out, "{}", command.describe())?;
        Ok(())
    }

    fn cmd_si(&mut self, args: &str) -> Result<(), SdbError> {
        let steps = match args {
            "" => 1,
            _ => {
                let count = single_argument(args)?
                    .parse::<i64>()
                    .map_err(|_| SdbError::InvalidArgument(format!("invalid step count '{args}'")))?;
                // any negative count runs without limit
                u64::try_from(count).unwrap_or(u64::MAX)
            }
        };
        self.run(steps)?;
        Ok(())
    }

    fn cmd_info(&mut self, args: &str) -> Result<(), SdbError> {
        match args {
            "r" => write!(self.out, "{}", self.emulator.get_cpu().dump_registers())?,
            "w" => self.print_watchpoints()?,
            "" => {
                return Err(SdbError::InvalidArgument(
                    "info needs an argument: r or w".to_string(),
                ))
            }
            _ => {
                return Err(SdbError::InvalidArgument(format!(
                    "Unknown info argument '{args}', expected r or w"
                )))
            }
        }
        Ok(())
    }

    fn print_watchpoints(&mut self) -> Result<(), SdbError> {
        if self.watchpoints.is_empty() {
            writeln!(self.out, "No watchpoints.")?;
            return Ok(());
        }
        writeln!(self.out, "{:<8}{:<12}{}", "Num", "Value", "What")?;
        for wp in self.watchpoints.iter() {
            writeln!(self.out, "{:<8}{:<12}{}", wp.no(), wp.last_value(), wp.expr())?;
        }
        Ok(())
    }

    fn cmd_x(&mut self, args: &str) -> Result<(), SdbError> {
        let usage = || SdbError::InvalidArgument("usage: x N EXPR".to_string());
        let (count, expr) = args.split_once(char::is_whitespace).ok_or_else(usage)?;
        let count = count.parse::<usize>().map_err(|_| usage())?;
        let cpu = self.emulator.get_cpu();
        let base = evaluate(expr, cpu)?;

        let mut result = Ok(());
        for i in 0..count {
            let address = base.wrapping_add((i * 4) as Word);
            if i % WORDS_PER_LINE == 0 {
                if i > 0 {
                    writeln!(self.out)?;
                }
                write!(self.out, "{address:#010x}:")?;
            }
            match cpu.read_word(address) {
                Some(value) => write!(self.out, "\t{value:#010x}")?,
                None => {
                    result = Err(ExprError::Memory(address).into());
                    break;
                }
            }
        }
        if count > 0 {
            writeln!(self.out)?;
        }
        result
    }

    fn cmd_p(&mut self, args: &str) -> Result<(), SdbError> {
        let value = evaluate(args, self.emulator.get_cpu())?;
        writeln!(self.out, "${} = {value}", self.print_counter)?;
        self.print_counter += 1;
        Ok(())
    }

    fn cmd_w(&mut self, args: &str) -> Result<(), SdbError> {
        let no = self.watchpoints.watch(args, self.emulator.get_cpu())?;
        let value = self
            .watchpoints
            .get(no)
            .map(|wp| wp.last_value())
            .unwrap_or_default();
        writeln!(self.out, "watchpoint {no}: {args}, initial value: {value}")?;
        Ok(())
    }

    fn cmd_d(&mut self, args: &str) -> Result<(), SdbError> {
        let no = single_argument(args)?
            .parse::<usize>()
            .map_err(|_| SdbError::InvalidArgument(format!("invalid watchpoint number '{args}'")))?;
        self.watchpoints.delete(no)?;
        Ok(())
    }
}

/// Rejects empty arguments and arguments with more than one word.
fn single_argument(args: &str) -> Result<&str, SdbError> {
    let mut words = args.split_whitespace();
    match (words.next(), words.next()) {
        (Some(word), None) => Ok(word),
        (None, _) => Err(SdbError::InvalidArgument("missing argument".to_string())),
        (Some(_), Some(extra)) => Err(SdbError::InvalidArgument(format!(
            "unexpected argument '{extra}'"
        ))),
    }
}

#[cfg(test)]
mod test_sdb {
    use common::constants::RESET_VECTOR;
    use common::words_to_bytes;
    use emulator::{EmulatorConfig, ExecState};

    use super::*;

    fn debugger(program: &[Word]) -> Debugger<Vec<u8>> {
        let mut emulator = Emulator::new(EmulatorConfig {
            memory_size: 0x1000,
            ..Default::default()
        });
        emulator.load_bytes(&words_to_bytes(program)).unwrap();
        Debugger::new(emulator, Vec::new())
    }

    fn execute(debugger: &mut Debugger<Vec<u8>>, line: &str) {
        assert_eq!(ControlFlow::Continue(()), debugger.execute(line).unwrap());
    }

    fn output(debugger: &Debugger<Vec<u8>>) -> String {
        String::from_utf8(debugger.output().clone()).unwrap()
    }

    // addi a0, x0, 1; addi a0, a0, 1; addi a0, a0, 1; ebreak
    const COUNTER: [Word; 4] = [0x00100513, 0x00150513, 0x00150513, 0x00100073];

    #[test]
    fn command_names() {
        let names: Vec<&'static str> = Command::iter().map(|c| c.into()).collect();
        assert_eq!(
            vec!["help", "c", "q", "si", "info", "x", "p", "w", "d"],
            names
        );
        assert_eq!(Ok(Command::Si), Command::from_str("si"));
        assert!(Command::from_str("SI").is_err());
    }

    #[test]
    fn watchpoint_stops_run_early() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "w $a0");
        let changes = debugger.run(3).unwrap();
        assert_eq!(1, changes.len());
        assert_eq!(0, changes[0].old_value);
        assert_eq!(1, changes[0].new_value);
        assert_eq!(&ExecState::Stopped, debugger.emulator().state());
        assert_eq!(RESET_VECTOR + 4, debugger.emulator().get_cpu().read_pc());
        assert!(output(&debugger).contains("Old value = 0\nNew value = 1"));
    }

    #[test]
    fn continue_stops_at_each_change() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "w $a0");
        for expected in 1..=3 {
            let changes = debugger.run(u64::MAX).unwrap();
            assert_eq!(expected, changes[0].new_value);
        }
        assert!(debugger.run(u64::MAX).unwrap().is_empty());
        assert!(matches!(
            debugger.emulator().state(),
            ExecState::Trapped { value: 3, .. }
        ));
    }

    #[test]
    fn echoes_short_runs() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "si 2");
        let text = output(&debugger);
        assert!(text.contains("0x80000000: 00100513\taddi"));
        assert!(text.contains("0x80000004: 00150513\taddi"));

        let mut debugger = self::debugger(&COUNTER);
        execute(&mut debugger, "c");
        assert_eq!(
            "rvdb: HIT BAD TRAP at pc = 0x8000000c (a0 = 0x3)\n\
             total guest instructions = 4\n",
            output(&debugger)
        );
    }

    #[test]
    fn si_arguments() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "si");
        assert_eq!(RESET_VECTOR + 4, debugger.emulator().get_cpu().read_pc());
        assert!(matches!(
            debugger.execute("si 12ab"),
            Err(SdbError::InvalidArgument(_))
        ));
        assert!(matches!(
            debugger.execute("si 1 2"),
            Err(SdbError::InvalidArgument(_))
        ));
        assert_eq!(RESET_VECTOR + 4, debugger.emulator().get_cpu().read_pc());
        execute(&mut debugger, "si -1");
        assert!(debugger.emulator().state().has_ended());
    }

    #[test]
    fn print_counts_results() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "p 1 + 2");
        execute(&mut debugger, "p $pc");
        assert_eq!("$0 = 3\n$1 = 2147483648\n", output(&debugger));
        assert!(matches!(
            debugger.execute("p 1/0"),
            Err(SdbError::Expr(ExprError::DivideByZero))
        ));
        execute(&mut debugger, "p 4");
        assert!(output(&debugger).ends_with("$2 = 4\n"));
    }

    #[test]
    fn examine_memory() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "x 5 $pc");
        assert_eq!(
            "0x80000000:\t0x00100513\t0x00150513\t0x00150513\t0x00100073\n\
             0x80000010:\t0x00000000\n",
            output(&debugger)
        );
        assert!(matches!(
            debugger.execute("x 5"),
            Err(SdbError::InvalidArgument(_))
        ));
        assert!(matches!(
            debugger.execute("x 2 0x80000ffc"),
            Err(SdbError::Expr(ExprError::Memory(0x80001000)))
        ));
    }

    #[test]
    fn watchpoint_commands() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "w $a0 + 1");
        execute(&mut debugger, "w $pc");
        execute(&mut debugger, "info w");
        let text = output(&debugger);
        assert!(text.contains("watchpoint 0: $a0 + 1, initial value: 1\n"));
        assert!(text.contains("watchpoint 1: $pc, initial value: 2147483648\n"));
        assert!(text.contains("1       2147483648  $pc\n0       1           $a0 + 1\n"));

        execute(&mut debugger, "d 0");
        assert_eq!(1, debugger.watchpoints().iter().count());
        assert!(matches!(
            debugger.execute("d 0"),
            Err(SdbError::Watchpoint(WatchpointError::NotFound(0)))
        ));
        assert!(matches!(
            debugger.execute("w $nope"),
            Err(SdbError::Watchpoint(WatchpointError::Expr(
                ExprError::UnknownRegister(_)
            )))
        ));
    }

    #[test]
    fn info_registers() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "info r");
        let text = output(&debugger);
        assert!(text.starts_with("pc"));
        assert!(text.contains("0x80000000"));
        assert!(matches!(
            debugger.execute("info"),
            Err(SdbError::InvalidArgument(_))
        ));
        assert!(matches!(
            debugger.execute("info x"),
            Err(SdbError::InvalidArgument(_))
        ));
    }

    #[test]
    fn help_and_unknown_commands() {
        let mut debugger = debugger(&COUNTER);
        execute(&mut debugger, "help");
        assert_eq!(Command::iter().count(), output(&debugger).lines().count());
        execute(&mut debugger, "help si");
        assert!(output(&debugger).ends_with("si - Step N instructions, 1 if omitted: si [N]\n"));
        assert!(matches!(
            debugger.execute("help nope"),
            Err(SdbError::UnknownCommand(_))
        ));
        assert!(matches!(
            debugger.execute("frobnicate"),
            Err(SdbError::UnknownCommand(_))
        ));
    }

    #[test]
    fn quit_ends_session() {
        let mut debugger = debugger(&COUNTER);
        assert_eq!(ControlFlow::Break(()), debugger.execute("q").unwrap());
        assert!(!debugger.emulator().is_exit_status_bad());
    }
}
