use crate::emulator::Emulator;
use crate::errors::ExecutionError;
use crate::hardware::keyboard::{KeyboardInputProvider, ScriptedInputProvider};
use crate::hardware::memory::Memory;
use crate::hardware::registers::Registers;
use std::cell::RefCell;
use std::io;
use std::io::Write;
use std::rc::Rc;

/// Collects output, clones share the same buffer so output stays readable after
/// handing a clone to an [`Emulator`].
#[derive(Clone)]
pub struct StringWriter {
    vec: Rc<RefCell<Vec<u8>>>,
}
impl Write for StringWriter {
    fn write(&mut self, data: &[u8]) -> Result<usize, io::Error> {
        self.vec.borrow_mut().write(data)
    }
    fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }
}
impl StringWriter {
    pub fn new() -> Self {
        let vec = Vec::<u8>::with_capacity(120);
        Self {
            vec: Rc::new(RefCell::new(vec)),
        }
    }
    pub fn get_string(&self) -> String {
        String::from_utf8(self.vec.borrow().clone()).unwrap()
    }
}

/// Keyboard failing on every access.
pub struct FailingKeyboard {
    message: &'static str,
}
impl FailingKeyboard {
    pub const fn new(message: &'static str) -> Self {
        Self { message }
    }
}
impl KeyboardInputProvider for FailingKeyboard {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        Err(io::Error::other(self.message))
    }
    fn read_key(&mut self) -> io::Result<Option<u8>> {
        Err(io::Error::other(self.message))
    }
    fn is_interrupted(&self) -> bool {
        false
    }
    fn check_events(&mut self) -> io::Result<()> {
        Err(io::Error::other(self.message))
    }
}

/// Keyboard without keys that reports an interrupt once its events were checked `checks` times,
/// like a CTRL-C arriving while a program never reads the keyboard.
pub struct FlagKeyboard {
    remaining_checks: usize,
}
impl FlagKeyboard {
    pub const fn interrupted_after_checks(checks: usize) -> Self {
        Self {
            remaining_checks: checks,
        }
    }
}
impl KeyboardInputProvider for FlagKeyboard {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        Ok(None)
    }
    fn read_key(&mut self) -> io::Result<Option<u8>> {
        Ok(None)
    }
    fn is_interrupted(&self) -> bool {
        self.remaining_checks == 0
    }
    fn check_events(&mut self) -> io::Result<()> {
        self.remaining_checks = self.remaining_checks.saturating_sub(1);
        Ok(())
    }
}

pub fn emulator_with_io(stdin_data: &[u8], stdout: &StringWriter) -> Emulator {
    Emulator::with_console(
        Box::new(ScriptedInputProvider::new(stdin_data)),
        Box::new(stdout.clone()),
    )
}

/// Loads `program` including its `.ORIG` header, runs it until halt and returns the emulator
/// together with everything it printed.
pub fn run_program(
    program: &[u16],
    stdin_data: &[u8],
) -> Result<(Emulator, StringWriter), ExecutionError> {
    let stdout = StringWriter::new();
    let mut emu = emulator_with_io(stdin_data, &stdout);
    emu.load_program(program)
        .expect("Error loading program");
    emu.execute()?;
    Ok((emu, stdout))
}

pub struct FakeEmulator {
    inner: Emulator,
    stdout: StringWriter,
}
impl FakeEmulator {
    pub fn new(program_no_header: &[u16]) -> Self {
        let mut program = Vec::with_capacity(program_no_header.len() + 1);
        program.push(0x3000u16);
        if program_no_header.is_empty() {
            program.push(0);
        } else {
            program.extend_from_slice(program_no_header);
        }
        let stdout = StringWriter::new();
        let mut emu = emulator_with_io(b"", &stdout);
        emu.load_program(program.as_slice()).unwrap();
        Self { inner: emu, stdout }
    }
    pub fn get_parts(&mut self) -> (&mut Registers, &mut Memory, &mut StringWriter) {
        (
            &mut self.inner.registers,
            &mut self.inner.memory,
            &mut self.stdout,
        )
    }
}
