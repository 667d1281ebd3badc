//! OS service routines invoked by the TRAP instruction, performed directly on the host console.
use crate::errors::ExecutionError;
use crate::hardware::keyboard::KeyboardInputProvider;
use crate::hardware::memory::Memory;
use crate::hardware::registers::{Reg, Registers, from_binary};
use std::io;
use std::io::Write;
use std::ops::ControlFlow;

/// Supported trap vectors, bits `[7:0]` of a TRAP instruction.
/// ```text
///  15__12__11__8___7_______0_
/// | 1111 | 0000 | trapvect8 |
///  -------------------------
/// ```
#[repr(u8)]
#[derive(enumn::N, Copy, Clone, PartialEq, Eq, Debug)]
pub enum TrapRoutine {
    GetC = 0x20,
    Out = 0x21,
    PutS = 0x22,
    In = 0x23,
    PutSp = 0x24,
    Halt = 0x25,
}

fn read_character_from_console(
    regs: &mut Registers,
    keyboard: &mut dyn KeyboardInputProvider,
    echo_to: Option<&mut dyn Write>,
) -> ControlFlow<Result<(), ExecutionError>> {
    match keyboard.read_key() {
        Ok(Some(key)) => {
            if let Some(stdout) = echo_to {
                write_bytes_out(&[key], stdout)?;
            }
            regs.set(Reg::R0, from_binary(u16::from(key)));
            regs.update_conditional_register(Reg::R0);
            ControlFlow::Continue(())
        }
        Ok(None) => ControlFlow::Break(Err(ExecutionError::Interrupted)),
        Err(e) => wrap_io_error_in_cf(&e),
    }
}

/// GETC: Read a single character from the keyboard. The character is not echoed onto the console.
///
/// Its ASCII code is copied into R0. The high eight bits of R0 are cleared.
pub fn get_c(
    regs: &mut Registers,
    keyboard: &mut dyn KeyboardInputProvider,
) -> ControlFlow<Result<(), ExecutionError>> {
    read_character_from_console(regs, keyboard, None)
}

/// IN: Print a prompt on the screen and read a single character echoed back from the keyboard.
///
/// Otherwise, like 0x20 GETC.
pub fn in_trap(
    regs: &mut Registers,
    keyboard: &mut dyn KeyboardInputProvider,
    stdout: &mut impl Write,
) -> ControlFlow<Result<(), ExecutionError>> {
    write_bytes_out(b"Input: ", stdout)?;
    read_character_from_console(regs, keyboard, Some(stdout))
}

/// OUT: Write a character in R0[7:0] to the console display.
pub fn out(regs: &Registers, stdout: &mut impl Write) -> ControlFlow<Result<(), ExecutionError>> {
    write_bytes_out(&[low_byte(regs.get(Reg::R0).as_binary())], stdout)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "Truncation is what is expected here"
)]
const fn low_byte(input: u16) -> u8 {
    input as u8
}

fn put_one_char_per_u16(input: u16, append_to: &mut Vec<u8>) {
    append_to.push(low_byte(input));
}

fn put_two_chars_per_u16(input: u16, append_to: &mut Vec<u8>) {
    append_to.push(low_byte(input));
    let high = low_byte(input >> 8);
    if high != 0 {
        append_to.push(high);
    }
}

fn put(
    regs: &Registers,
    mem: &Memory,
    stdout: &mut impl Write,
    handle_char: fn(u16, &mut Vec<u8>),
) -> ControlFlow<Result<(), ExecutionError>> {
    let mut address = regs.get(Reg::R0).as_binary();
    let mut s = Vec::with_capacity(120);
    // a string without terminator ends after one pass through the address space
    for _ in 0..=u16::MAX {
        let word = mem[address];
        if word == 0 {
            break;
        }
        handle_char(word, &mut s);
        address = address.wrapping_add(1);
    }
    write_bytes_out(&s, stdout)
}

/// PUTS: print null-delimited char* from register 0's address
pub fn put_s(
    regs: &Registers,
    mem: &Memory,
    stdout: &mut impl Write,
) -> ControlFlow<Result<(), ExecutionError>> {
    put(regs, mem, stdout, put_one_char_per_u16)
}

/// PUTSP: Packed version of PUTS
///
/// The ASCII code contained in bits [7:0] of a memory location is written to the console first.
/// The second character of the last memory location can be 0x00.
/// Writing terminates with a 0x000 char.
pub fn put_sp(
    regs: &Registers,
    mem: &Memory,
    stdout: &mut impl Write,
) -> ControlFlow<Result<(), ExecutionError>> {
    put(regs, mem, stdout, put_two_chars_per_u16)
}

/// HALT: End program and stdout a message
pub fn halt(stdout: &mut impl Write) -> ControlFlow<Result<(), ExecutionError>> {
    write_bytes_out(b"\nProgram halted\n", stdout)?;
    ControlFlow::Break(Ok(()))
}

fn write_bytes_out(
    message: &[u8],
    stdout: &mut (impl Write + ?Sized),
) -> ControlFlow<Result<(), ExecutionError>> {
    match stdout.write_all(message).and_then(|()| stdout.flush()) {
        Ok(()) => ControlFlow::Continue(()),
        Err(e) => wrap_io_error_in_cf(&e),
    }
}

fn wrap_io_error_in_cf(error: &io::Error) -> ControlFlow<Result<(), ExecutionError>, ()> {
    ControlFlow::Break(Err(ExecutionError::IOInputOutputError(error.to_string())))
}
