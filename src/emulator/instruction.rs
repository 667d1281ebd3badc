use crate::hardware::registers::Reg;
use crate::numbers;
use std::fmt::{Debug, Formatter};

/// The sixteen LC-3 opcodes, selected by bits `[15:12]` of an instruction.
#[repr(u8)]
#[derive(enumn::N, Copy, Clone, PartialEq, Eq, Debug)]
pub enum Operation {
    Br = 0b0000,
    Add = 0b0001,
    Ld = 0b0010,
    St = 0b0011,
    Jsr = 0b0100,
    And = 0b0101,
    Ldr = 0b0110,
    Str = 0b0111,
    Rti = 0b1000,
    Not = 0b1001,
    Ldi = 0b1010,
    Sti = 0b1011,
    Jmp = 0b1100,
    Reserved = 0b1101,
    Lea = 0b1110,
    Trap = 0b1111,
}

impl Operation {
    /// Maps a 4 bit opcode to its operation, every value of `0..16` has one.
    #[must_use]
    pub fn from_op_code(op_code: u8) -> Option<Self> {
        Self::n(op_code)
    }
}

/// Wrapper for LC-3 u16 instruction.
/// format is: `OOOO_DDD_P_PPPP_PPPP`
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Instruction(u16);

impl Instruction {
    /// Gives the value of only the specified bit range.
    ///
    /// # Parameters
    /// - `from`: starting index
    /// - `to`: end index (inclusive), mut be greater or equal to `from`
    ///
    /// # Panics
    /// - asserts that to is greater or equal from and both are valid indexes
    #[must_use]
    pub fn get_bit_range(self, from: u8, to: u8) -> u16 {
        debug_assert!(
            to >= from,
            "wrong direction of from: {from:?} and to: {to:?}"
        );
        debug_assert!(
            (0..u16::BITS).contains(&u32::from(to)),
            "index: {to:?} to u16 is greater than maximum value {:?}",
            u16::BITS - 1
        );
        let width = u32::from(to - from + 1);
        let mask = u16::MAX.checked_shr(u16::BITS - width).unwrap_or(0);
        (self.0 >> from) & mask
    }
    #[must_use]
    pub fn get_bit(self, index: u8) -> bool {
        self.get_bit_range(index, index) & 1 != 0
    }
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "4 bit field always fits into u8"
    )]
    pub fn op_code(self) -> u8 {
        self.get_bit_range(12, 15) as u8
    }
    #[must_use]
    pub fn operation(self) -> Operation {
        Operation::from_op_code(self.op_code()).unwrap_or(Operation::Reserved)
    }
    /// Destination register in bits `[11:9]`, also the source register of stores.
    #[must_use]
    pub fn dr(self) -> Reg {
        Reg::from_field(self.get_bit_range(9, 11))
    }
    /// First source register, or base register for JMP, JSRR, LDR and STR in bits `[8:6]`.
    #[must_use]
    pub fn sr1(self) -> Reg {
        Reg::from_field(self.get_bit_range(6, 8))
    }
    #[must_use]
    pub fn sr2(self) -> Reg {
        Reg::from_field(self.get_bit_range(0, 2))
    }
    #[must_use]
    pub fn is_immediate(self) -> bool {
        self.get_bit(5)
    }
    #[must_use]
    pub fn get_immediate(self) -> u16 {
        numbers::sign_extend(self.get_bit_range(0, 4), 5)
    }
    /// Sign extended offset of the lowest `len` bits, to be added with wrapping.
    #[must_use]
    pub fn offset(self, len: u8) -> u16 {
        numbers::sign_extend(self.get_bit_range(0, len - 1), len)
    }
    /// Offset to add to program counter PC.
    /// Can be positive or negative.
    #[must_use]
    pub fn pc_offset(self, len: u8) -> i16 {
        numbers::twos_complement_to_decimal(self.offset(len))
    }
    /// The `nzp` condition bits of a BR instruction.
    #[must_use]
    pub fn nzp(self) -> u16 {
        self.get_bit_range(9, 11)
    }
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "8 bit field always fits into u8"
    )]
    pub fn trap_vector(self) -> u8 {
        self.get_bit_range(0, 7) as u8
    }
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} ({:#06X}): DR: {:?}, SR1: {:?}, PC_Off9: {}",
            self.operation(),
            self.0,
            self.dr(),
            self.sr1(),
            self.pc_offset(9)
        )
    }
}

impl From<u16> for Instruction {
    fn from(bits: u16) -> Self {
        Self(bits)
    }
}
impl From<Instruction> for u16 {
    fn from(i: Instruction) -> Self {
        i.0
    }
}
