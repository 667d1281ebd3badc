use crate::errors::{ExecutionError, LoadProgramError};
use crate::hardware::keyboard::KeyboardInputProvider;
use std::fmt::{Debug, Formatter};
use std::ops::{Index, IndexMut};

/// Address programs start execution at.
pub const PROGRAM_SECTION_START: u16 = 0x3000;
const MEMORY_SIZE_U16: usize = 1 << 16;

/// Memory regions mapped to IO functionality.
#[repr(u16)]
#[derive(enumn::N, Copy, Clone, PartialEq, Eq, Debug)]
pub enum MemoryMappedIOLocations {
    /// Keyboard Status Register
    Kbsr = 0xFE00,
    /// Keyboard Data Register
    Kbdr = 0xFE02,
}

/// An abstraction for the LC-3 memory including application but excluding registers.
///
/// Indexing gives plain access to the stored words, [`Memory::read`] additionally emulates the
/// memory mapped keyboard.
pub struct Memory {
    /// Index equals memory address
    data: Box<[u16]>,
    keyboard: Box<dyn KeyboardInputProvider>,
}

impl Debug for Memory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let used = self.data.iter().filter(|w| **w != 0).count();
        write!(
            f,
            "Memory {{ non-zero words: {used}, KBSR: {:#06X}, KBDR: {:#06X} }}",
            self[MemoryMappedIOLocations::Kbsr as u16],
            self[MemoryMappedIOLocations::Kbdr as u16]
        )
    }
}

impl Index<u16> for Memory {
    type Output = u16;
    fn index(&self, index: u16) -> &Self::Output {
        &self.data[usize::from(index)]
    }
}
impl IndexMut<u16> for Memory {
    fn index_mut(&mut self, index: u16) -> &mut Self::Output {
        &mut self.data[usize::from(index)]
    }
}

impl Memory {
    const KEYBOARD_STATUS_REGISTER_SET: u16 = 1 << 15;
    const KEYBOARD_STATUS_REGISTER_UNSET: u16 = 0;

    pub fn new(keyboard: Box<dyn KeyboardInputProvider>) -> Self {
        Self {
            data: vec![0x0u16; MEMORY_SIZE_U16].into_boxed_slice(),
            keyboard,
        }
    }

    /// Reads the word at `address`.
    ///
    /// Reading the keyboard status register polls the keyboard first: if a key was pressed
    /// the status register gets its top bit set and the data register holds the key,
    /// otherwise both are cleared.
    ///
    /// # Errors
    /// - keyboard cannot be polled
    pub fn read(&mut self, address: u16) -> Result<u16, ExecutionError> {
        if MemoryMappedIOLocations::n(address) == Some(MemoryMappedIOLocations::Kbsr) {
            let (status, data) = match self.keyboard.poll_key()? {
                Some(key) => (Self::KEYBOARD_STATUS_REGISTER_SET, u16::from(key)),
                None => (Self::KEYBOARD_STATUS_REGISTER_UNSET, 0),
            };
            self[MemoryMappedIOLocations::Kbsr as u16] = status;
            self[MemoryMappedIOLocations::Kbdr as u16] = data;
        }
        Ok(self[address])
    }

    /// Stores `value` at `address`, device registers included.
    pub fn write(&mut self, address: u16, value: u16) {
        self[address] = value;
    }

    pub fn keyboard(&mut self) -> &mut dyn KeyboardInputProvider {
        self.keyboard.as_mut()
    }

    /// Copies `program` into memory starting at address `origin`.
    ///
    /// # Errors
    /// - Program does not fit between `origin` and the end of the address space
    pub fn load_program(&mut self, origin: u16, program: &[u16]) -> Result<(), LoadProgramError> {
        let start = usize::from(origin);
        let maximum_instructions = MEMORY_SIZE_U16 - start;
        if program.len() > maximum_instructions {
            return Err(LoadProgramError::ProgramTooLong {
                origin,
                actual_instructions: program.len(),
                maximum_instructions,
            });
        }
        self.data[start..start + program.len()].copy_from_slice(program);
        Ok(())
    }
}
