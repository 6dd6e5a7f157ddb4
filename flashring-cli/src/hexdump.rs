//! Hex dump formatting

use std::fmt::Write;

/// Bytes shown per dump line.
pub const BYTES_PER_LINE: usize = 16;

/// Format bytes as space-separated uppercase hex pairs.
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Split `bytes` into dump lines of 16.
///
/// With a `base` address each line starts with `[%08X]` giving the address
/// of its first byte.
pub fn lines(base: Option<u32>, bytes: &[u8]) -> impl Iterator<Item = String> + '_ {
    bytes
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(move |(i, row)| match base {
            Some(base) => {
                let addr = base.wrapping_add((i * BYTES_PER_LINE) as u32);
                format!("[{:08X}] {}", addr, hex_bytes(row))
            }
            None => hex_bytes(row),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[]), "");
        assert_eq!(hex_bytes(&[0x00, 0xAB, 0xFF]), "00 AB FF");
    }

    #[test]
    fn test_lines_with_addresses() {
        let data: Vec<u8> = (0..40).collect();
        let rows: Vec<String> = lines(Some(0x1000), &data).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("[00001000] 00 01 02"));
        assert!(rows[1].starts_with("[00001010] 10 11"));
        assert_eq!(rows[2], "[00001020] 20 21 22 23 24 25 26 27");
    }

    #[test]
    fn test_lines_without_addresses() {
        let rows: Vec<String> = lines(None, b"AB").collect();
        assert_eq!(rows, vec!["41 42".to_string()]);
    }
}
