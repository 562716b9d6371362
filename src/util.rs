//! Small helpers for fixed-width fields and alignment.

/// Width of a segment or section name field.
pub const NAME_LEN: usize = 16;

/// Finds the position of the first null byte in a slice.
///
/// Returns `data.len()` when no terminator is present.
#[inline(always)]
pub fn memchr_null(data: &[u8]) -> usize {
    memchr::memchr(0, data).unwrap_or(data.len())
}

/// Returns the string stored in a NUL-padded fixed-width field.
///
/// A field filled to the last byte has no terminator and is used whole.
/// Invalid UTF-8 yields an empty string.
pub fn fixed_name(field: &[u8; NAME_LEN]) -> &str {
    let end = memchr_null(field);
    std::str::from_utf8(&field[..end]).unwrap_or("")
}

/// Encodes a name into a NUL-padded fixed-width field, truncating at 16 bytes.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Compares a fixed-width field against a name over all 16 bytes.
///
/// This is exact equality of the padded field, so `"__text"` does not match
/// `"__textcoal_nt"` and neither matches `"__tex"`.
#[inline]
pub fn name_eq(field: &[u8; NAME_LEN], name: &str) -> bool {
    name.len() <= NAME_LEN && *field == encode_name(name)
}

/// Aligns a value up to the given power-of-two alignment.
///
/// # Panics
///
/// Debug assertion fails if `alignment` is not a power of 2.
#[inline(always)]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
