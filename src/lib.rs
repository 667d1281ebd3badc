//! # LC-3 Virtual Machine.
//!
//! `lc3-vm` runs object images of the LC-3 system.
//! Usage starts with loading a program via `emulator::from_program` or
//! `emulator::Emulator::load_program_file`, several images can be loaded into one emulator.
//!
//!  # Example
//! ```
//! use lc3_vm::emulator::Emulator;
//! use lc3_vm::hardware::keyboard::ScriptedInputProvider;
//! use lc3_vm::hardware::registers::Reg;
//!
//! let mut emu = Emulator::with_console(
//!     Box::new(ScriptedInputProvider::new(b"")),
//!     Box::new(std::io::sink()),
//! );
//! // .ORIG x3000, LEA R0, #1, ADD R0, R0, #5, HALT
//! emu.load_program(&[0x3000, 0xE001, 0x1025, 0xF025]).unwrap();
//! emu.execute().unwrap();
//! assert_eq!(emu.registers().get(Reg::R0).as_binary(), 0x3007);
//! ```
//! # Errors
//! - Program is missing valid .ORIG header or has no instructions after it
//! - Program does not fit into memory from its .ORIG address on
//! - Program contains a reserved opcode or calls an unknown trap routine when executed

pub mod emulator;
pub mod errors;
pub mod hardware;
pub(crate) mod numbers;
pub mod terminal;
