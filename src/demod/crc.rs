//! Mode S checksum and bounded error correction
//!
//! The Mode S integrity code is a 24-bit polynomial remainder computed by
//! XORing a fixed per-bit-position constant for every set message bit. The
//! table has 112 rows and 56-bit frames index it with an offset of 56, so a
//! short message lands on the same syndromes as the tail of a long one; the
//! rows covering the checksum field itself are zero, making the computed
//! value independent of the transmitted checksum bytes.
//!
//! DF 11/17 carry the plain checksum in their last 3 bytes and are eligible
//! for brute-force bit-flip repair. DF 0/4/5/16/20/21/24 XOR the sender's
//! ICAO address into that field (AP), so repair instead unmasks the address
//! and checks it against recently seen aircraft.

use super::{LONG_MSG_BITS, SHORT_MSG_BITS};

/// Per-bit-position checksum contributions for a 112-bit frame.
pub const CHECKSUM_TABLE: [u32; LONG_MSG_BITS] = [
    0x3935ea, 0x1c9af5, 0xf1b77e, 0x78dbbf, 0xc397db, 0x9e31e9, 0xb0e2f0, 0x587178,
    0x2c38bc, 0x161c5e, 0x0b0e2f, 0xfa7d13, 0x82c48d, 0xbe9842, 0x5f4c21, 0xd05c14,
    0x682e0a, 0x341705, 0xe5f186, 0x72f8c3, 0xc68665, 0x9cb936, 0x4e5c9b, 0xd8d449,
    0x939020, 0x49c810, 0x24e408, 0x127204, 0x093902, 0x049c81, 0xfdb444, 0x7eda22,
    0x3f6d11, 0xe04c8c, 0x702646, 0x381323, 0xe3f395, 0x8e03ce, 0x4701e7, 0xdc7af7,
    0x91c77f, 0xb719bb, 0xa476d9, 0xadc168, 0x56e0b4, 0x2b705a, 0x15b82d, 0xf52612,
    0x7a9309, 0xc2b380, 0x6159c0, 0x30ace0, 0x185670, 0x0c2b38, 0x06159c, 0x030ace,
    0x018567, 0xff38b7, 0x80665f, 0xbfc92b, 0xa01e91, 0xaff54c, 0x57faa6, 0x2bfd53,
    0xea04ad, 0x8af852, 0x457c29, 0xdd4410, 0x6ea208, 0x375104, 0x1ba882, 0x0dd441,
    0xf91024, 0x7c8812, 0x3e4409, 0xe0d800, 0x706c00, 0x383600, 0x1c1b00, 0x0e0d80,
    0x0706c0, 0x038360, 0x01c1b0, 0x00e0d8, 0x00706c, 0x003836, 0x001c1b, 0xfff409,
    0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000,
    0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000,
    0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000, 0x000000,
];

/// XOR-fold the checksum table over the set bits of `msg`.
pub fn checksum(msg: &[u8], bits: usize) -> u32 {
    let offset = if bits == LONG_MSG_BITS {
        0
    } else {
        LONG_MSG_BITS - SHORT_MSG_BITS
    };

    let mut crc = 0u32;
    for j in 0..bits {
        if msg[j / 8] & (1 << (7 - (j % 8))) != 0 {
            crc ^= CHECKSUM_TABLE[j + offset];
        }
    }
    crc
}

/// Checksum as transmitted: big-endian 24 bits in the last 3 message bytes.
pub fn frame_checksum(msg: &[u8]) -> u32 {
    let n = msg.len();
    (msg[n - 3] as u32) << 16 | (msg[n - 2] as u32) << 8 | msg[n - 1] as u32
}

/// True when the transmitted checksum matches the computed one.
pub fn is_valid(msg: &[u8], bits: usize) -> bool {
    checksum(msg, bits) == frame_checksum(msg)
}

#[inline]
fn flip_bit(msg: &mut [u8], bit: usize) {
    msg[bit / 8] ^= 1 << (7 - (bit % 8));
}

/// Try every single-bit flip until the checksum matches. Mutates `msg` in
/// place on success and returns the flipped bit position; the lowest
/// matching position wins by scan order.
pub fn fix_single_bit(msg: &mut [u8], bits: usize) -> Option<usize> {
    for j in 0..bits {
        flip_bit(msg, j);
        if is_valid(msg, bits) {
            return Some(j);
        }
        flip_bit(msg, j);
    }
    None
}

/// Try every pair of bit flips; the lexicographically smallest matching
/// `(j, i)` pair wins. Mutates `msg` in place on success.
pub fn fix_two_bits(msg: &mut [u8], bits: usize) -> Option<(usize, usize)> {
    for j in 0..bits {
        for i in (j + 1)..bits {
            flip_bit(msg, j);
            flip_bit(msg, i);
            if is_valid(msg, bits) {
                return Some((j, i));
            }
            flip_bit(msg, i);
            flip_bit(msg, j);
        }
    }
    None
}

/// Unmask the AP field: XOR the computed checksum out of the last 3 bytes,
/// leaving the sender's 24-bit address as a candidate for cache lookup.
pub fn recover_ap_address(msg: &[u8], bits: usize) -> u32 {
    frame_checksum(msg) ^ checksum(msg, bits)
}

/// Formats whose last 3 bytes are the plain checksum and whose bytes 1-3
/// carry the ICAO address directly.
pub fn is_adsb(df: u8) -> bool {
    matches!(df, 11 | 17)
}

/// Formats that XOR the sender's address into the checksum field.
pub fn is_downlink_request(df: u8) -> bool {
    matches!(df, 0 | 4 | 5 | 16 | 20 | 21 | 24)
}

/// Message length in bits for a downlink format.
pub fn message_bits(df: u8) -> usize {
    match df {
        0 | 4 | 5 | 16 | 17 | 20 | 21 | 24 => LONG_MSG_BITS,
        _ => SHORT_MSG_BITS,
    }
}
