//! Constant-time token comparison.
//!
//! Mail-in addresses carry a secret token in their plus part
//! (`mailin+TOKEN@example.com`). The token derived for the target entity is
//! compared against it without leaking, through timing, how many leading
//! bytes were right.

/// Count the number of bytes in a string.
///
/// This is the raw UTF-8 byte count, never the number of characters.
pub fn byte_length(s: &str) -> usize {
    s.as_bytes().len()
}

/// Are two byte strings equal (compared in constant time)?
///
/// Lengths are not secret: inputs of different length return `false` at once.
/// For equal lengths every byte position is visited, whatever the position
/// of the first mismatch.
pub fn are_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    accumulate(a.iter().copied().zip(b.iter().copied())) == 0
}

/// Convenience wrapper over [`are_equal`] for string tokens.
pub fn tokens_equal(expected: &str, provided: &str) -> bool {
    are_equal(expected.as_bytes(), provided.as_bytes())
}

/// OR together the XOR of every byte pair.
fn accumulate<I>(pairs: I) -> u8
where
    I: Iterator<Item = (u8, u8)>,
{
    pairs.fold(0u8, |status, (x, y)| status | (x ^ y))
}
