//! Host text views report carets in UTF-16 code units; everything here works in
//! UTF-8 byte offsets.

/// Byte offset for a UTF-16 offset. Offsets that land inside a surrogate pair
/// snap back to the start of that character; offsets past the end clamp.
pub fn utf16_to_byte(text: &str, utf16: usize) -> usize {
    let mut units = 0usize;
    for (byte, ch) in text.char_indices() {
        let next = units + ch.len_utf16();
        if next > utf16 {
            return byte;
        }
        units = next;
    }
    text.len()
}

/// UTF-16 offset for a byte offset. Offsets inside a multi-byte character snap
/// back to its start.
pub fn byte_to_utf16(text: &str, byte: usize) -> usize {
    let byte = floor_char_boundary(text, byte);
    text[..byte].encode_utf16().count()
}

/// Largest char boundary at or below `byte`.
pub fn floor_char_boundary(text: &str, byte: usize) -> usize {
    if byte >= text.len() {
        return text.len();
    }
    (0..=byte)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_match() {
        assert_eq!(utf16_to_byte("hello", 3), 3);
        assert_eq!(byte_to_utf16("hello", 3), 3);
    }

    #[test]
    fn converts_across_multibyte_and_astral_chars() {
        // "é" is 2 bytes / 1 unit, "😄" is 4 bytes / 2 units.
        let text = "é😄x";
        assert_eq!(utf16_to_byte(text, 1), 2);
        assert_eq!(utf16_to_byte(text, 3), 6);
        assert_eq!(byte_to_utf16(text, 6), 3);
        assert_eq!(byte_to_utf16(text, 7), 4);
    }

    #[test]
    fn snaps_and_clamps() {
        let text = "é😄x";
        // Inside the surrogate pair.
        assert_eq!(utf16_to_byte(text, 2), 2);
        // Inside the emoji's bytes.
        assert_eq!(byte_to_utf16(text, 4), 1);
        assert_eq!(utf16_to_byte(text, 99), text.len());
        assert_eq!(byte_to_utf16(text, 99), 4);
    }
}
