//! CRC-32C (Castagnoli) over the container's content region.
//!
//! The container trailer is computed two ways: in one pass over the parsed
//! buffer, and region by region while building (header tail, then each
//! directory in order). [`fold`] lets the second path continue a finished
//! checksum so both produce the same value.

use crc::{Crc, Table, CRC_32_ISCSI};

const CASTAGNOLI: Crc<u32, Table<16>> = Crc::<u32, Table<16>>::new(&CRC_32_ISCSI);

/// Checksum of the empty input. Folding from here is the same as a fresh CRC.
pub const INITIAL: u32 = 0;

/// CRC-32C of `bytes`.
pub fn crc32c(bytes: &[u8]) -> u32 {
    CASTAGNOLI.checksum(bytes)
}

/// Continue a finished checksum `crc` over `bytes`.
///
/// `crc32c(a ++ b) == fold(fold(INITIAL, a), b)`.
pub fn fold(crc: u32, bytes: &[u8]) -> u32 {
    // Undo the final xor and bit reflection to recover the register state.
    let mut digest = CASTAGNOLI.digest_with_initial((!crc).reverse_bits());
    digest.update(bytes);
    digest.finalize()
}
