use crate::hardware::memory::PROGRAM_SECTION_START;
use crate::numbers;
use std::fmt::{Debug, Formatter};

/// Index of one of the eight general purpose registers.
///
/// Instructions encode these in 3 bit fields, so any decoded value is valid.
#[repr(u8)]
#[derive(enumn::N, Copy, Clone, PartialEq, Eq, Debug)]
pub enum Reg {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}
impl Reg {
    /// Register addressed by the lowest 3 bits of `bits`.
    #[must_use]
    pub const fn from_field(bits: u16) -> Self {
        match bits & 0b111 {
            0 => Self::R0,
            1 => Self::R1,
            2 => Self::R2,
            3 => Self::R3,
            4 => Self::R4,
            5 => Self::R5,
            6 => Self::R6,
            _ => Self::R7,
        }
    }
    const fn index(self) -> usize {
        self as usize
    }
}

/// Content of a single LC-3 register, viewable as raw bits or as two's complement number.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Register(u16);

impl Register {
    #[must_use]
    pub const fn from_binary(value: u16) -> Self {
        Self(value)
    }
    #[must_use]
    pub const fn from_decimal(value: i16) -> Self {
        Self(value.cast_unsigned())
    }
    #[must_use]
    pub const fn as_binary(self) -> u16 {
        self.0
    }
    #[must_use]
    pub const fn as_decimal(self) -> i16 {
        numbers::twos_complement_to_decimal(self.0)
    }
}
impl Debug for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X} ({})", self.0, self.as_decimal())
    }
}

#[must_use]
pub const fn from_binary(value: u16) -> Register {
    Register::from_binary(value)
}
#[must_use]
pub const fn from_decimal(value: i16) -> Register {
    Register::from_decimal(value)
}

/// Register file of the LC-3: `R0`-`R7`, the program counter and the condition flags.
#[derive(Clone, PartialEq, Eq)]
pub struct Registers {
    general_purpose: [Register; 8],
    pc: Register,
    cond: ConditionFlag,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// All general purpose registers zeroed, PC at the start of the program section and
    /// the `Z` flag set, so exactly one flag is set before the first branch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            general_purpose: [Register(0); 8],
            pc: Register(PROGRAM_SECTION_START),
            cond: ConditionFlag::Zero,
        }
    }
    #[must_use]
    pub const fn get(&self, r: Reg) -> Register {
        self.general_purpose[r.index()]
    }
    pub const fn set(&mut self, r: Reg, value: Register) {
        self.general_purpose[r.index()] = value;
    }
    #[must_use]
    pub const fn pc(&self) -> Register {
        self.pc
    }
    pub const fn set_pc(&mut self, value: u16) {
        self.pc = Register(value);
    }
    #[must_use]
    pub const fn get_conditional_register(&self) -> ConditionFlag {
        self.cond
    }
    /// Sets the condition flag according to the sign of the value in register `r`.
    pub fn update_conditional_register(&mut self, r: Reg) {
        self.cond = ConditionFlag::from(self.get(r).as_binary());
    }
}

impl Debug for Registers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, r) in self.general_purpose.iter().enumerate() {
            write!(f, "R{idx}: {r:?}, ")?;
        }
        write!(f, "PC: {:#06X}, COND: {:?}", self.pc.0, self.cond)
    }
}

/// The `N`, `Z` and `P` flags, of which exactly one is set at any time.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ConditionFlag {
    Pos = 1 << 0, // Positive
    Zero = 1 << 1,
    Neg = 1 << 2, // Negative
}

impl ConditionFlag {
    /// Bit of this flag in the `nzp` field of a BR instruction.
    #[must_use]
    pub const fn nzp_mask(self) -> u16 {
        self as u16
    }
}

impl From<u16> for ConditionFlag {
    fn from(value: u16) -> Self {
        if value == 0 {
            Self::Zero
        } else if value >> 15 == 1 {
            // leftmost bit is 1 for negative numbers
            Self::Neg
        } else {
            Self::Pos
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use yare::parameterized;

    #[parameterized(
        zero = { 0x0000, ConditionFlag::Zero },
        smallest_negative = { 0x8000, ConditionFlag::Neg },
        minus_one = { 0xFFFF, ConditionFlag::Neg },
        one = { 0x0001, ConditionFlag::Pos },
        largest_positive = { 0x7FFF, ConditionFlag::Pos },
    )]
    fn test_condition_flag_from_value(value: u16, expected: ConditionFlag) {
        let mut regs = Registers::new();
        regs.set(Reg::R3, from_binary(value));
        regs.update_conditional_register(Reg::R3);
        assert_that!(regs.get_conditional_register(), eq(expected));
    }

    #[gtest]
    fn test_new_registers() {
        let regs = Registers::new();
        expect_that!(regs.pc(), eq(from_binary(0x3000)));
        expect_that!(regs.get_conditional_register(), eq(ConditionFlag::Zero));
        for r in (0..8).filter_map(Reg::n) {
            expect_that!(regs.get(r), eq(from_binary(0)));
        }
    }

    #[gtest]
    fn test_reg_from_field_masks_to_three_bits() {
        expect_that!(Reg::from_field(0b1010), eq(Reg::R2));
        expect_that!(Reg::from_field(0b111), eq(Reg::R7));
    }

    #[gtest]
    fn test_register_views() {
        let r = from_decimal(-128);
        expect_that!(r.as_binary(), eq(0xFF80));
        expect_that!(r.as_decimal(), eq(-128));
        expect_that!(format!("{r:?}"), eq("0xFF80 (-128)"));
    }
}
