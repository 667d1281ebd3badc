//! Loading LC-3 object images and executing them.
mod instruction;
mod opcodes;
#[cfg(test)]
mod test_helpers;
mod trap_routines;

pub use instruction::{Instruction, Operation};
pub use trap_routines::TrapRoutine;

use crate::errors::{ExecutionError, LoadProgramError};
use crate::hardware::keyboard::{KeyboardInputProvider, TerminalInputProvider};
use crate::hardware::registers::Registers;
use crate::hardware::Memory;
use crate::terminal;
use std::io;
use std::io::Write;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Number of executed instructions between two checks for pending terminal events,
/// so CTRL-C is seen by programs that never touch the keyboard.
const EVENT_CHECK_INTERVAL: u32 = 4096;

/// Whether the machine still fetches instructions.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MachineState {
    Running,
    Halted,
}

/// The public facing emulator used to run LC-3 programs.
pub struct Emulator {
    registers: Registers,
    memory: Memory,
    stdout: Box<dyn Write>,
    state: MachineState,
    raw_terminal: bool,
    interrupted: Arc<AtomicBool>,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates an emulator on the hosting terminal with the object file at `path` loaded.
///
/// # Errors
/// See [`Emulator::load_program_file`]
pub fn from_program(path: impl AsRef<Path>) -> Result<Emulator, LoadProgramError> {
    let mut emu = Emulator::new();
    emu.load_program_file(path)?;
    Ok(emu)
}

/// Creates an emulator on the hosting terminal with `program` loaded,
/// its first word being the `.ORIG` header.
///
/// # Errors
/// See [`Emulator::load_program`]
pub fn from_program_words(program: &[u16]) -> Result<Emulator, LoadProgramError> {
    let mut emu = Emulator::new();
    emu.load_program(program)?;
    Ok(emu)
}

impl Emulator {
    /// Emulator reading keys from and writing output to the hosting terminal,
    /// which is put into raw mode while executing.
    #[must_use]
    pub fn new() -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        let mut emu = Self::with_console(
            Box::new(TerminalInputProvider::with_interrupt_flag(Arc::clone(
                &interrupted,
            ))),
            Box::new(terminal::RawModeWriter::new(io::stdout())),
        );
        emu.raw_terminal = true;
        emu.interrupted = interrupted;
        emu
    }

    /// Emulator with explicit keyboard and output stream, the terminal mode is left untouched.
    ///
    /// # Example
    /// ```
    /// use lc3_vm::emulator::Emulator;
    /// use lc3_vm::hardware::keyboard::ScriptedInputProvider;
    ///
    /// let mut emu = Emulator::with_console(
    ///     Box::new(ScriptedInputProvider::new(b"")),
    ///     Box::new(std::io::sink()),
    /// );
    /// // .ORIG x3000, ADD R0, R0, #5, HALT
    /// emu.load_program(&[0x3000, 0x1025, 0xF025]).unwrap();
    /// emu.execute().unwrap();
    /// assert_eq!(emu.registers().get(lc3_vm::hardware::registers::Reg::R0).as_decimal(), 5);
    /// ```
    #[must_use]
    pub fn with_console(
        keyboard: Box<dyn KeyboardInputProvider>,
        stdout: Box<dyn Write>,
    ) -> Self {
        Self {
            registers: Registers::new(),
            memory: Memory::new(keyboard),
            stdout,
            state: MachineState::Running,
            raw_terminal: false,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Loads an object file: big-endian u16 words, the first one being the `.ORIG` address the
    /// rest is loaded at.
    ///
    /// # Errors
    /// - File cannot be read
    /// - any error of [`Emulator::load_program_bytes`]
    pub fn load_program_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadProgramError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| LoadProgramError::ProgramNotReadable {
            file: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.load_program_bytes(&bytes)
    }

    /// Loads the big-endian byte representation of a program with `.ORIG` header.
    ///
    /// # Errors
    /// - Program has an odd number of bytes
    /// - any error of [`Emulator::load_program`]
    pub fn load_program_bytes(&mut self, bytes: &[u8]) -> Result<(), LoadProgramError> {
        let chunks = bytes.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            return Err(LoadProgramError::ProgramTruncated {
                byte_count: bytes.len(),
            });
        }
        let program: Vec<u16> = chunks
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        self.load_program(&program)
    }

    /// Loads a program into memory at the address given by its first word, the `.ORIG` header.
    /// Several programs can be loaded one after another, later ones overwrite overlapping words.
    ///
    /// # Errors
    /// - Program is missing valid .ORIG header
    /// - Program has no words following the header
    /// - Program does not fit between its origin and the end of memory
    pub fn load_program(&mut self, program: &[u16]) -> Result<(), LoadProgramError> {
        let Some((origin, rest)) = program.split_first() else {
            return Err(LoadProgramError::ProgramMissingOrigHeader);
        };
        if rest.is_empty() {
            return Err(LoadProgramError::ProgramEmpty { origin: *origin });
        }
        self.memory.load_program(*origin, rest)
    }

    /// Runs the loaded program from the current PC until it halts.
    ///
    /// # Errors
    /// - Program contains a reserved opcode or calls an unknown trap routine
    /// - Reading keyboard or writing output failed
    /// - CTRL-C was pressed, SIGINT or SIGTERM was received or the
    ///   [interrupt flag](Emulator::interrupt_flag) was set
    pub fn execute(&mut self) -> Result<(), ExecutionError> {
        let _lock = self
            .raw_terminal
            .then(|| terminal::set_terminal_raw(io::stdout(), &self.interrupted));
        self.state = MachineState::Running;
        let mut executed: u32 = 0;
        let mut check_events = true;
        loop {
            // best-effort, without a terminal signals still interrupt
            if check_events && executed % EVENT_CHECK_INTERVAL == 0 {
                if let Err(e) = self.memory.keyboard().check_events() {
                    eprintln!("Could not check terminal events: {e}");
                    check_events = false;
                }
            }
            executed = executed.wrapping_add(1);
            if self.is_interrupted() {
                return Err(ExecutionError::Interrupted);
            }
            if let ControlFlow::Break(res) = self.step() {
                return res;
            }
        }
    }

    /// Fetches, decodes and executes the single instruction at PC.
    ///
    /// Breaks with `Ok(())` when the program halted.
    pub fn step(&mut self) -> ControlFlow<Result<(), ExecutionError>> {
        let address = self.registers.pc().as_binary();
        let bits = match self.memory.read(address) {
            Ok(bits) => bits,
            Err(e) => return ControlFlow::Break(Err(e)),
        };
        self.registers.set_pc(address.wrapping_add(1));
        let i = Instruction::from(bits);
        let res = match i.operation() {
            Operation::Add => {
                opcodes::add(i, &mut self.registers);
                Ok(())
            }
            Operation::And => {
                opcodes::and(i, &mut self.registers);
                Ok(())
            }
            Operation::Not => {
                opcodes::not(i, &mut self.registers);
                Ok(())
            }
            Operation::Br => {
                opcodes::br(i, &mut self.registers);
                Ok(())
            }
            Operation::Jmp => {
                opcodes::jmp_or_ret(i, &mut self.registers);
                Ok(())
            }
            Operation::Jsr => {
                opcodes::jsr(i, &mut self.registers);
                Ok(())
            }
            Operation::Lea => {
                opcodes::lea(i, &mut self.registers);
                Ok(())
            }
            Operation::Ld => opcodes::ld(i, &mut self.registers, &mut self.memory),
            Operation::Ldi => opcodes::ldi(i, &mut self.registers, &mut self.memory),
            Operation::Ldr => opcodes::ldr(i, &mut self.registers, &mut self.memory),
            Operation::St => {
                opcodes::st(i, &self.registers, &mut self.memory);
                Ok(())
            }
            Operation::Sti => opcodes::sti(i, &self.registers, &mut self.memory),
            Operation::Str => {
                opcodes::str(i, &self.registers, &mut self.memory);
                Ok(())
            }
            Operation::Trap => return self.trap(i, address),
            Operation::Rti | Operation::Reserved => Err(ExecutionError::ReservedOpcode {
                opcode: i.op_code(),
                instruction: bits,
                address,
            }),
        };
        match res {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(Err(e)),
        }
    }

    fn trap(&mut self, i: Instruction, address: u16) -> ControlFlow<Result<(), ExecutionError>> {
        let Some(routine) = TrapRoutine::n(i.trap_vector()) else {
            return ControlFlow::Break(Err(ExecutionError::UnknownTrapRoutine {
                vector: i.trap_vector(),
                address,
            }));
        };
        let res = match routine {
            TrapRoutine::GetC => trap_routines::get_c(&mut self.registers, self.memory.keyboard()),
            TrapRoutine::Out => trap_routines::out(&self.registers, &mut self.stdout),
            TrapRoutine::PutS => {
                trap_routines::put_s(&self.registers, &self.memory, &mut self.stdout)
            }
            TrapRoutine::In => trap_routines::in_trap(
                &mut self.registers,
                self.memory.keyboard(),
                &mut self.stdout,
            ),
            TrapRoutine::PutSp => {
                trap_routines::put_sp(&self.registers, &self.memory, &mut self.stdout)
            }
            TrapRoutine::Halt => trap_routines::halt(&mut self.stdout),
        };
        if matches!(res, ControlFlow::Break(Ok(()))) {
            self.state = MachineState::Halted;
        }
        res
    }

    fn is_interrupted(&mut self) -> bool {
        self.interrupted.load(Ordering::SeqCst) || self.memory.keyboard().is_interrupted()
    }

    /// Flag stopping [`Emulator::execute`] before the next instruction once set,
    /// e.g. from another thread. Signal handlers set it while the terminal is raw.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.registers
    }
    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }
    #[must_use]
    pub const fn state(&self) -> MachineState {
        self.state
    }
    /// Resets all registers to their initial values so the loaded program can run again.
    pub fn reset_registers(&mut self) {
        self.registers = Registers::new();
        self.state = MachineState::Running;
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::test_helpers::{
        FailingKeyboard, FlagKeyboard, StringWriter, emulator_with_io, run_program,
    };
    use crate::hardware::registers::{ConditionFlag, Reg, from_binary};
    use googletest::prelude::*;

    const HALT: u16 = 0xF025;

    #[gtest]
    pub fn test_halt_only() -> Result<()> {
        let (emu, output) = run_program(&[0x3000, HALT], b"")?;
        expect_that!(emu.state(), eq(MachineState::Halted));
        expect_that!(output.get_string(), eq("\nProgram halted\n"));
        expect_that!(emu.registers().pc(), eq(from_binary(0x3001)));
        expect_that!(
            emu.registers().get_conditional_register(),
            eq(ConditionFlag::Zero)
        );
        for r in (0..8).filter_map(Reg::n) {
            expect_that!(emu.registers().get(r), eq(from_binary(0)));
        }
        Ok(())
    }
    #[gtest]
    pub fn test_lea_add_halt() -> Result<()> {
        // LEA R0, #1; ADD R0, R0, #5; HALT
        let (emu, _output) = run_program(&[0x3000, 0xE001, 0x1025, HALT], b"")?;
        expect_that!(emu.registers().get(Reg::R0), eq(from_binary(0x3000 + 2 + 5)));
        expect_that!(emu.state(), eq(MachineState::Halted));
        Ok(())
    }
    #[gtest]
    pub fn test_brz_not_taken_after_positive_result() -> Result<()> {
        // AND R1, R1, #0; ADD R1, R1, #7; BRz #1; ADD R1, R1, #1; HALT
        let (emu, _output) =
            run_program(&[0x3000, 0x5260, 0x1267, 0x0401, 0x1261, HALT], b"")?;
        expect_that!(emu.registers().get(Reg::R1), eq(from_binary(8)));
        Ok(())
    }
    #[gtest]
    pub fn test_subroutine_call_and_return() -> Result<()> {
        // JSR #1; HALT; ADD R2, R2, #3; RET
        let (emu, _output) = run_program(&[0x3000, 0x4801, HALT, 0x14A3, 0xC1C0], b"")?;
        expect_that!(emu.registers().get(Reg::R2), eq(from_binary(3)));
        expect_that!(emu.registers().get(Reg::R7), eq(from_binary(0x3001)));
        expect_that!(emu.registers().pc(), eq(from_binary(0x3002)));
        Ok(())
    }
    #[gtest]
    pub fn test_puts_hello() -> Result<()> {
        // LEA R0, #2; PUTS; HALT; "Hi"
        let (_emu, output) = run_program(
            &[0x3000, 0xE002, 0xF022, HALT, 0x0048, 0x0069, 0x0000],
            b"",
        )?;
        expect_that!(output.get_string(), eq("Hi\nProgram halted\n"));
        Ok(())
    }
    #[gtest]
    pub fn test_keyboard_polling_loop() -> Result<()> {
        // LDI R0, KBSR_PTR; BRzp #-2; LDI R0, KBDR_PTR; OUT; HALT; KBSR_PTR; KBDR_PTR
        let program = [
            0x3000, 0xA004, 0x07FE, 0xA003, 0xF021, HALT, 0xFE00, 0xFE02,
        ];
        let (emu, output) = run_program(&program, b"z")?;
        expect_that!(output.get_string(), eq("z\nProgram halted\n"));
        expect_that!(emu.registers().get(Reg::R0), eq(from_binary(u16::from(b'z'))));
        Ok(())
    }
    #[gtest]
    pub fn test_getc_and_out_echo() -> Result<()> {
        // GETC; OUT; IN; HALT
        let (emu, output) = run_program(&[0x3000, 0xF020, 0xF021, 0xF023, HALT], b"xy")?;
        expect_that!(output.get_string(), eq("xInput: y\nProgram halted\n"));
        expect_that!(emu.registers().get(Reg::R0), eq(from_binary(u16::from(b'y'))));
        Ok(())
    }
    #[gtest]
    pub fn test_getc_without_input_is_interrupted() {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        emu.load_program(&[0x3000, 0xF020, HALT]).unwrap();
        assert_that!(emu.execute().unwrap_err(), eq(&ExecutionError::Interrupted));
        expect_that!(emu.state(), eq(MachineState::Running));
    }
    #[gtest]
    pub fn test_reserved_opcodes_are_fatal() {
        for (instruction, opcode) in [(0xD000u16, 0b1101u8), (0x8000, 0b1000)] {
            let output = StringWriter::new();
            let mut emu = emulator_with_io(b"", &output);
            emu.load_program(&[0x3000, 0x1021, instruction, HALT])
                .unwrap();
            let err = emu.execute().unwrap_err();
            expect_that!(err.is_architectural_violation(), eq(true));
            expect_that!(
                err,
                eq(&ExecutionError::ReservedOpcode {
                    opcode,
                    instruction,
                    address: 0x3001
                })
            );
            expect_that!(output.get_string(), eq(""));
        }
    }
    #[gtest]
    pub fn test_unknown_trap_is_fatal() {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        emu.load_program(&[0x3000, 0xF026]).unwrap();
        assert_that!(
            emu.execute().unwrap_err(),
            eq(&ExecutionError::UnknownTrapRoutine {
                vector: 0x26,
                address: 0x3000
            })
        );
    }
    #[gtest]
    pub fn test_multiple_images_at_own_origin() -> Result<()> {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        // LDI R1, #1; HALT; .FILL x4000
        emu.load_program(&[0x3000, 0xA201, HALT, 0x4000])?;
        emu.load_program(&[0x4000, 0x0777])?;
        emu.execute()?;
        expect_that!(emu.registers().get(Reg::R1), eq(from_binary(0x0777)));
        Ok(())
    }
    #[gtest]
    pub fn test_rerun_after_reset() -> Result<()> {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        // ADD R3, R3, #2; HALT
        emu.load_program(&[0x3000, 0x16E2, HALT])?;
        emu.execute()?;
        emu.reset_registers();
        expect_that!(emu.state(), eq(MachineState::Running));
        emu.execute()?;
        expect_that!(emu.registers().get(Reg::R3), eq(from_binary(2)));
        expect_that!(
            output.get_string(),
            eq("\nProgram halted\n\nProgram halted\n")
        );
        Ok(())
    }
    #[gtest]
    pub fn test_load_program_empty() {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        assert_that!(
            emu.load_program(&[]).unwrap_err(),
            eq(&LoadProgramError::ProgramMissingOrigHeader)
        );
        assert_that!(
            emu.load_program_bytes(&[]).unwrap_err(),
            eq(&LoadProgramError::ProgramMissingOrigHeader)
        );
    }
    #[gtest]
    pub fn test_load_program_only_header() {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        assert_that!(
            emu.load_program_bytes(&[0x30, 0x00]).unwrap_err(),
            eq(&LoadProgramError::ProgramEmpty { origin: 0x3000 })
        );
    }
    #[gtest]
    pub fn test_load_program_truncated_word() {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        assert_that!(
            emu.load_program_bytes(&[0x30, 0x00, 0xF0, 0x25, 0x12]).unwrap_err(),
            eq(&LoadProgramError::ProgramTruncated { byte_count: 5 })
        );
    }
    #[gtest]
    pub fn test_load_program_big_endian() -> Result<()> {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        emu.load_program_bytes(&[0x40, 0x10, 0x12, 0x34, 0xAB, 0xCD])?;
        expect_that!(emu.memory()[0x4010], eq(0x1234));
        expect_that!(emu.memory()[0x4011], eq(0xABCD));
        Ok(())
    }
    #[gtest]
    pub fn test_load_program_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("lc3-vm-test-{}.obj", std::process::id()));
        std::fs::write(&path, [0x30u8, 0x00, 0x10, 0x25, 0xF0, 0x25])?;
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        let res = emu.load_program_file(&path);
        std::fs::remove_file(&path)?;
        res?;
        emu.execute()?;
        expect_that!(emu.registers().get(Reg::R0), eq(from_binary(5)));
        Ok(())
    }
    #[gtest]
    pub fn test_load_program_file_missing() {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        let err = emu
            .load_program_file("does/not/exist.obj")
            .unwrap_err();
        assert!(matches!(err, LoadProgramError::ProgramNotReadable { .. }));
        assert_that!(
            err.to_string(),
            starts_with("Could not read program file 'does/not/exist.obj': ")
        );
    }
    // BRnzp #-1
    const SPIN: [u16; 2] = [0x3000, 0x0FFF];

    #[gtest]
    pub fn test_spinning_program_stops_on_keyboard_interrupt() {
        let output = StringWriter::new();
        let mut emu = Emulator::with_console(
            Box::new(FlagKeyboard::interrupted_after_checks(3)),
            Box::new(output.clone()),
        );
        emu.load_program(&SPIN).unwrap();
        let res = emu.execute();
        assert_that!(res.unwrap_err(), eq(&ExecutionError::Interrupted));
        expect_that!(emu.state(), eq(MachineState::Running));
        expect_that!(output.get_string(), eq(""));
    }
    #[gtest]
    pub fn test_spinning_program_stops_on_interrupt_flag() {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        emu.load_program(&SPIN).unwrap();
        let flag = emu.interrupt_flag();
        let setter = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        });
        let res = emu.execute();
        setter.join().unwrap();
        assert_that!(res.unwrap_err(), eq(&ExecutionError::Interrupted));
    }
    #[gtest]
    pub fn test_reset_clears_interrupt() -> Result<()> {
        let output = StringWriter::new();
        let mut emu = emulator_with_io(b"", &output);
        emu.load_program(&[0x3000, HALT])?;
        emu.interrupt_flag().store(true, Ordering::SeqCst);
        assert_that!(emu.execute().unwrap_err(), eq(&ExecutionError::Interrupted));
        emu.reset_registers();
        emu.execute()?;
        expect_that!(emu.state(), eq(MachineState::Halted));
        Ok(())
    }
    #[gtest]
    pub fn test_from_program_words_on_terminal() -> Result<()> {
        let emu = from_program_words(&[0x3000, HALT])?;
        expect_that!(emu.registers().pc(), eq(from_binary(0x3000)));
        expect_that!(emu.memory()[0x3000], eq(HALT));
        expect_that!(emu.state(), eq(MachineState::Running));
        expect_that!(emu.interrupt_flag().load(Ordering::SeqCst), eq(false));
        Ok(())
    }
    #[gtest]
    pub fn test_from_program_words_rejects_header_only() {
        let err = from_program_words(&[0x3000]).err().unwrap();
        assert_that!(err, eq(&LoadProgramError::ProgramEmpty { origin: 0x3000 }));
    }
    #[gtest]
    pub fn test_from_program_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "lc3-vm-from-program-{}.obj",
            std::process::id()
        ));
        std::fs::write(&path, [0x40u8, 0x00, 0x12, 0x34])?;
        let res = from_program(&path);
        std::fs::remove_file(&path)?;
        let emu = res?;
        expect_that!(emu.memory()[0x4000], eq(0x1234));
        expect_that!(emu.registers().pc(), eq(from_binary(0x3000)));
        Ok(())
    }
    #[gtest]
    pub fn test_runs_without_terminal_events() -> Result<()> {
        let output = StringWriter::new();
        let mut emu = Emulator::with_console(
            Box::new(FailingKeyboard::new("no terminal")),
            Box::new(output.clone()),
        );
        emu.load_program(&[0x3000, 0x1025, HALT])?;
        emu.execute()?;
        expect_that!(emu.registers().get(Reg::R0), eq(from_binary(5)));
        expect_that!(emu.state(), eq(MachineState::Halted));
        Ok(())
    }
}
