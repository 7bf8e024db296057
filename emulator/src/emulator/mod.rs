use std::path::Path;
use std::time::{Duration, Instant};

use common::constants::{
    BUILTIN_IMAGE, BYTES_PER_INSTRUCTION, DEFAULT_MEMORY_SIZE, RAM_START_ADDRESS, RESET_VECTOR,
    RETURN_VALUE_REGISTER, SYSCALL_EXIT,
};
use common::{words_to_bytes, VAddr, Word};
use thiserror::Error;

use crate::instruction::{self, InstructionPattern};

pub mod cpu;
pub mod memory;
pub mod mmu;

use self::cpu::{Cpu, Decode, Trap, TrapType};

/// Memory layout of the emulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorConfig {
    pub memory_base: VAddr,
    pub memory_size: u64,
    /// Initial pc; raw images are loaded here.
    pub reset_vector: VAddr,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            memory_base: RAM_START_ADDRESS,
            memory_size: DEFAULT_MEMORY_SIZE,
            reset_vector: RESET_VECTOR,
        }
    }
}

/// Execution state of the machine between and during `run` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecState {
    Running,
    Stopped,
    /// Hit the debug breakpoint. `value` is the return value register.
    Trapped { pc: VAddr, value: Word },
    /// Could not continue: illegal instruction, access fault or an
    /// unsupported environment call.
    Aborted { pc: VAddr, trap: Trap },
    /// The program made the exit call.
    Halted { pc: VAddr, code: Word },
    /// The debugger asked to leave.
    Quit,
}

impl ExecState {
    /// True once the program can make no further progress.
    pub fn has_ended(&self) -> bool {
        matches!(
            self,
            ExecState::Trapped { .. } | ExecState::Aborted { .. } | ExecState::Halted { .. }
        )
    }
}

/// One retired instruction, handed to the [`StepMonitor`] after its side
/// effects are visible.
#[derive(Debug, Clone, Copy)]
pub struct StepRecord {
    pub decode: Decode,
    pub entry: &'static InstructionPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    Stop,
}

/// Observes execution one instruction at a time.
pub trait StepMonitor {
    fn on_step(&mut self, step: &StepRecord, cpu: &Cpu) -> StepControl;
}

impl StepMonitor for () {
    fn on_step(&mut self, _step: &StepRecord, _cpu: &Cpu) -> StepControl {
        StepControl::Continue
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Retired guest instructions, over all runs.
    pub instructions: u64,
    /// Host time spent inside `run`.
    pub host_time: Duration,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("image of {size} bytes does not fit in {capacity} bytes of memory at {base:#010x}")]
    TooLarge { size: u64, capacity: u64, base: VAddr },
}

/// RV32IM machine: a hart, its memory, and the trap controller driving it.
///
/// ```ignore
/// let mut emulator = Emulator::new(EmulatorConfig::default());
/// emulator.load_builtin_image()?;
/// emulator.run(u64::MAX, &mut ());
/// assert!(!emulator.is_exit_status_bad());
/// ```
#[derive(Clone, Debug)]
pub struct Emulator {
    config: EmulatorConfig,
    cpu: Cpu,
    state: ExecState,
    stats: Statistics,
}

impl Emulator {
    /// Creates a new `Emulator` with zeroed memory and the pc at the reset
    /// vector.
    ///
    /// # Arguments
    /// * `config`
    pub fn new(config: EmulatorConfig) -> Self {
        let mut cpu = Cpu::new(config.memory_base, config.memory_size);
        cpu.update_pc(config.reset_vector);
        Emulator {
            config,
            cpu,
            state: ExecState::Stopped,
            stats: Statistics::default(),
        }
    }

    /// Reads a raw binary image from `path` and places it at the reset
    /// vector. Returns the image size in bytes.
    pub fn load_image(&mut self, path: &Path) -> Result<usize, ImageError> {
        let data = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let size = self.load_bytes(&data)?;
        tracing::info!("The image is {}, size = {size}", path.display());
        Ok(size)
    }

    /// Loads the built-in program, used when no image is given.
    pub fn load_builtin_image(&mut self) -> Result<usize, ImageError> {
        tracing::info!("No image is given. Use the default built-in image.");
        self.load_bytes(&words_to_bytes(&BUILTIN_IMAGE))
    }

    /// Copies `data` to the reset vector.
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<usize, ImageError> {
        if data.is_empty() {
            return Ok(0);
        }
        let EmulatorConfig {
            memory_base,
            memory_size,
            reset_vector,
        } = self.config;
        let too_large = ImageError::TooLarge {
            size: data.len() as u64,
            capacity: memory_size,
            base: memory_base,
        };
        let mmu = self.cpu.get_mut_mmu();
        if !mmu.in_bounds(reset_vector, data.len() as u64) {
            return Err(too_large);
        }
        mmu.store_bytes(reset_vector, data).map_err(|_| too_large)?;
        Ok(data.len())
    }

    /// Executes at most `steps` instructions; `u64::MAX` runs until the
    /// program ends. `monitor` sees every retired instruction and may stop
    /// the run early.
    ///
    /// # Arguments
    /// * `steps` Step budget
    /// * `monitor`
    #[tracing::instrument(skip(self, monitor))]
    pub fn run(&mut self, steps: u64, monitor: &mut dyn StepMonitor) {
        match self.state {
            ExecState::Trapped { .. } | ExecState::Aborted { .. } | ExecState::Halted { .. } => {
                tracing::info!(
                    "Program execution has ended. To restart the program, exit rvdb and run again."
                );
                return;
            }
            _ => self.state = ExecState::Running,
        }

        let start = Instant::now();
        let mut remaining = steps;
        while remaining > 0 {
            if steps != u64::MAX {
                remaining -= 1;
            }
            self.step(monitor);
            if self.state != ExecState::Running {
                break;
            }
        }
        self.stats.host_time += start.elapsed();

        match &self.state {
            ExecState::Running => self.state = ExecState::Stopped,
            ExecState::Trapped { .. } | ExecState::Aborted { .. } | ExecState::Halted { .. } => {
                self.report_end();
                self.report_statistics();
            }
            ExecState::Stopped | ExecState::Quit => {}
        }
    }

    fn step(&mut self, monitor: &mut dyn StepMonitor) {
        let pc = self.cpu.read_pc();
        match self.cpu.exec_once() {
            Ok((decode, entry)) => self.retire(StepRecord { decode, entry }, monitor),
            Err(trap) => {
                // ebreak and ecall complete before trapping
                if matches!(
                    trap.trap_type,
                    TrapType::Breakpoint | TrapType::EnvironmentCall
                ) {
                    if let Ok(word) = self.cpu.get_mmu().fetch_word(pc) {
                        let next = pc.wrapping_add(BYTES_PER_INSTRUCTION);
                        let decode = Decode {
                            pc,
                            snpc: next,
                            dnpc: next,
                            word,
                        };
                        let entry = instruction::lookup(word);
                        self.retire(StepRecord { decode, entry }, monitor);
                    }
                }
                self.state = self.trap_state(pc, trap);
            }
        }
    }

    fn retire(&mut self, record: StepRecord, monitor: &mut dyn StepMonitor) {
        self.stats.instructions += 1;
        tracing::trace!(
            "{:#010x}: {:08x} {}",
            record.decode.pc,
            record.decode.word,
            record.entry.name
        );
        if monitor.on_step(&record, &self.cpu) == StepControl::Stop
            && self.state == ExecState::Running
        {
            self.state = ExecState::Stopped;
        }
    }

    fn trap_state(&self, pc: VAddr, trap: Trap) -> ExecState {
        match trap.trap_type {
            TrapType::Breakpoint => ExecState::Trapped {
                pc,
                value: trap.value as Word,
            },
            TrapType::EnvironmentCall if trap.value == SYSCALL_EXIT as u64 => ExecState::Halted {
                pc,
                code: self.cpu.read_register(RETURN_VALUE_REGISTER),
            },
            _ => ExecState::Aborted { pc, trap },
        }
    }

    /// Describes how the program ended, or `None` while it can still run.
    pub fn end_report(&self) -> Option<String> {
        let report = match &self.state {
            ExecState::Trapped { pc, value: 0 } => format!("rvdb: HIT GOOD TRAP at pc = {pc:#010x}"),
            ExecState::Trapped { pc, value } => {
                format!("rvdb: HIT BAD TRAP at pc = {pc:#010x} (a0 = {value:#x})")
            }
            ExecState::Halted { pc, code } => {
                format!("rvdb: program exited with code {code} at pc = {pc:#010x}")
            }
            ExecState::Aborted { pc, trap } => format!("rvdb: ABORT at pc = {pc:#010x}: {trap}"),
            ExecState::Running | ExecState::Stopped | ExecState::Quit => return None,
        };
        Some(report)
    }

    fn report_end(&self) {
        let Some(report) = self.end_report() else {
            return;
        };
        if self.is_exit_status_bad() {
            tracing::error!("{report}");
        } else {
            tracing::info!("{report}");
        }
    }

    fn report_statistics(&self) {
        let micros = self.stats.host_time.as_micros();
        tracing::info!("host time spent = {micros} us");
        tracing::info!("total guest instructions = {}", self.stats.instructions);
        if micros > 0 {
            let frequency = self.stats.instructions as u128 * 1_000_000 / micros;
            tracing::info!("simulation frequency = {frequency} inst/s");
        } else {
            tracing::info!("Finish running in less than 1 us and can not calculate the simulation frequency");
        }
    }

    pub fn state(&self) -> &ExecState {
        &self.state
    }

    /// Marks the session as deliberately ended by the user.
    pub fn set_quit(&mut self) {
        self.state = ExecState::Quit;
    }

    /// Whether the process should exit with a failure status.
    pub fn is_exit_status_bad(&self) -> bool {
        !matches!(
            self.state,
            ExecState::Quit
                | ExecState::Trapped { value: 0, .. }
                | ExecState::Halted { code: 0, .. }
        )
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Returns immutable reference to `Cpu`.
    pub fn get_cpu(&self) -> &Cpu {
        &self.cpu
    }
}
