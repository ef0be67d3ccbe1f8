use md5::{Digest, Md5};

/// Tag prepended to every quick hash.
pub const QHASH_PREFIX: &str = "HSH-";

/// Fast non-cryptographic fingerprint of a string.
///
/// 32-bit wrapping `h = h * 31 + unit` over the UTF-16 code units of `data`,
/// rendered as `HSH-<|h|>`. Cheap enough to compare before the MD5.
pub fn quick_hash(data: &str) -> String {
    let hash = data
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    format!("{QHASH_PREFIX}{}", hash.unsigned_abs())
}

/// Lowercase hex MD5 digest of the UTF-8 bytes of `data`.
pub fn record_hash(data: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Character count of `data` in UTF-16 code units.
///
/// This is the length a JSON consumer reports for the text, so multi-byte
/// characters count once (or twice outside the BMP) rather than per byte.
pub fn char_length(data: &str) -> usize {
    data.encode_utf16().count()
}
