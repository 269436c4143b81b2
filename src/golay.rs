//! Extended Golay (24,12,8) forward error correction.
//!
//! H.223 level 2/3 protect the 3-byte MUX-PDU header with this code: 12 data
//! bits plus 12 parity bits, correcting up to 3 bit errors and detecting 4.
//! Pure functions over `u32` codewords; no state, safe to share.
//!
//! The generator and inverse matrices are fixed constants of the code and are
//! reproduced bit-for-bit; do not re-derive them.

/// Rows of the 12x12 generator sub-matrix over GF(2).
/// Row `i` is the parity contribution of data bit `i`.
const ENCODE_MATRIX: [u32; 12] = [
    0xC75, 0x49F, 0xD4B, 0x6E3, 0x9B3, 0xB66, 0xECC, 0x1ED, 0x3DA, 0x7B4, 0xB1D, 0xE3A,
];

/// Rows of the algebraic inverse, mapping a parity syndrome back to data-bit
/// corrections.
const DECODE_MATRIX: [u32; 12] = [
    0x49F, 0x93E, 0x6E3, 0xDC6, 0xF13, 0xAB9, 0x1ED, 0x3DA, 0x7B4, 0xF68, 0xA4F, 0xC75,
];

/// XOR-accumulate matrix rows selected by the set bits of `word`.
fn matrix_mul(word: u32, matrix: &[u32; 12]) -> u32 {
    let mut out = 0;
    for (bit, row) in matrix.iter().enumerate() {
        if word & (1 << bit) != 0 {
            out ^= row;
        }
    }
    out
}

/// Hamming weight of the low 12 bits.
fn weight12(word: u32) -> u32 {
    (word & 0xFFF).count_ones()
}

/// Encode 12 data bits into a 24-bit codeword: `data | (parity << 12)`.
///
/// Bits of `data` above 11 are ignored.
pub fn encode(data: u16) -> u32 {
    let data = u32::from(data) & 0xFFF;
    data | (matrix_mul(data, &ENCODE_MATRIX) << 12)
}

/// Compute the error mask of a received 24-bit codeword.
///
/// Returns `Some(mask)` such that `codeword ^ mask` is a valid codeword, for
/// any error of weight <= 3. Returns `None` when the error is uncorrectable
/// (weight >= 4 within the code's guarantees).
pub fn syndrome_errors(codeword: u32) -> Option<u32> {
    let received_data = codeword & 0xFFF;
    let received_parity = (codeword >> 12) & 0xFFF;

    let syndrome = received_parity ^ matrix_mul(received_data, &ENCODE_MATRIX);

    // All errors in the parity half.
    if weight12(syndrome) <= 3 {
        return Some(syndrome << 12);
    }

    // One data bit plus up to two parity bits.
    for (bit, row) in ENCODE_MATRIX.iter().enumerate() {
        if weight12(syndrome ^ row) <= 2 {
            return Some(((syndrome ^ row) << 12) | (1 << bit));
        }
    }

    // All errors in the data half: map the syndrome through the inverse.
    let inv_syndrome = matrix_mul(syndrome, &DECODE_MATRIX);
    if weight12(inv_syndrome) <= 3 {
        return Some(inv_syndrome);
    }

    // One parity bit plus up to two data bits.
    for (bit, row) in DECODE_MATRIX.iter().enumerate() {
        if weight12(inv_syndrome ^ row) <= 2 {
            return Some((inv_syndrome ^ row) | (1 << (bit + 12)));
        }
    }

    None
}

/// Correct a received codeword and extract the 12 data bits.
///
/// `None` means 4+ bit errors were detected and the data is untrustworthy.
pub fn decode(codeword: u32) -> Option<u16> {
    let mask = syndrome_errors(codeword)?;
    Some(((codeword ^ mask) & 0xFFF) as u16)
}
