//! Errors for loading LC-3 images and running them.
use displaydoc::Display;
use std::error::Error;

/// Reasons an LC-3 object image cannot be placed into memory.
#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum LoadProgramError {
    /// Could not read program file '{file}': {message}
    ProgramNotReadable { file: String, message: String },
    /// Program is missing valid .ORIG header
    ProgramMissingOrigHeader,
    /// Program with .ORIG header {origin:#06X} does not contain any instruction
    ProgramEmpty { origin: u16 },
    /// Program is truncated, {byte_count} bytes is not a whole number of u16 words
    ProgramTruncated { byte_count: usize },
    /// Program too long, got {actual_instructions} u16 instructions while limit from origin {origin:#06X} is {maximum_instructions}
    ProgramTooLong {
        origin: u16,
        actual_instructions: usize,
        maximum_instructions: usize,
    },
}
impl Error for LoadProgramError {}

/// Reasons execution of a loaded program stops other than by the HALT trap.
#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Reserved opcode {opcode:#06b} in instruction {instruction:#06X} at address {address:#06X}
    ReservedOpcode {
        opcode: u8,
        instruction: u16,
        address: u16,
    },
    /// Unknown trap routine {vector:#04X} called at address {address:#06X}
    UnknownTrapRoutine { vector: u8, address: u16 },
    /// Error during reading Stdin or writing program output to Stdout: {0}
    IOInputOutputError(String),
    /// Execution interrupted by CTRL-C
    Interrupted,
}
impl Error for ExecutionError {}

impl ExecutionError {
    /// True if the program image itself is broken, i.e. it contains an instruction the LC-3
    /// cannot execute.
    #[must_use]
    pub const fn is_architectural_violation(&self) -> bool {
        matches!(
            self,
            Self::ReservedOpcode { .. } | Self::UnknownTrapRoutine { .. }
        )
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(error: std::io::Error) -> Self {
        Self::IOInputOutputError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[gtest]
    pub fn test_display_messages() {
        expect_that!(
            LoadProgramError::ProgramTooLong {
                origin: 0xFFFE,
                actual_instructions: 3,
                maximum_instructions: 2
            }
            .to_string(),
            eq("Program too long, got 3 u16 instructions while limit from origin 0xFFFE is 2")
        );
        expect_that!(
            ExecutionError::ReservedOpcode {
                opcode: 0b1101,
                instruction: 0xD000,
                address: 0x3000
            }
            .to_string(),
            eq("Reserved opcode 0b1101 in instruction 0xD000 at address 0x3000")
        );
        expect_that!(
            ExecutionError::UnknownTrapRoutine {
                vector: 0x26,
                address: 0x3001
            }
            .to_string(),
            eq("Unknown trap routine 0x26 called at address 0x3001")
        );
    }
    #[gtest]
    pub fn test_architectural_violation() {
        expect_that!(
            ExecutionError::UnknownTrapRoutine {
                vector: 0,
                address: 0
            }
            .is_architectural_violation(),
            eq(true)
        );
        expect_that!(ExecutionError::Interrupted.is_architectural_violation(), eq(false));
    }
}
