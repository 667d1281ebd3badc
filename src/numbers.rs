/// Extends the lowest `valid_bits` bits of `bits` to a full word, treating them as a
/// two's complement number. See [Sign extension](https://en.wikipedia.org/wiki/Sign_extension).
///
/// `bits` must already be masked to `valid_bits`, which is in `1..=16`.
#[must_use]
pub const fn sign_extend(bits: u16, valid_bits: u8) -> u16 {
    debug_assert!(valid_bits >= 1 && valid_bits <= 16);
    if valid_bits == 16 {
        return bits;
    }
    let most_significant_bit = (bits >> (valid_bits - 1)) & 1;
    if most_significant_bit == 1 {
        // negative: 1-extend
        bits | (0xFFFF << valid_bits)
    } else {
        // positive, already 0-extended
        bits
    }
}

pub const fn twos_complement_to_decimal(bin_rep: u16) -> i16 {
    bin_rep.cast_signed()
}
