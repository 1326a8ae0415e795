/// Digits of the "extended hex" numbering used for slot glyphs and
/// user-number components of shared file names.
pub const EHEX_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Single extended-hex digit for `n`, or `None` when `n` needs more than one.
#[inline]
pub fn ehex_digit(n: u32) -> Option<char> {
    EHEX_DIGITS.get(n as usize).map(|b| *b as char)
}

/// Render `n` in extended hex, left-padded with `pad` up to `width` characters.
///
/// Numbers wider than `width` are rendered in full, never truncated.
pub fn ehex(mut n: u32, width: usize, pad: char) -> String {
    let base = EHEX_DIGITS.len() as u32;
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(EHEX_DIGITS[(n % base) as usize] as char);
        n /= base;
    }
    while digits.len() < width {
        digits.push(pad);
    }
    digits.iter().rev().collect()
}
