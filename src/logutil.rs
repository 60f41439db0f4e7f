//! Logging helpers for binary traffic so log lines stay single-line and bounded.

use std::fmt::Write;

/// Lowercase hex of at most `max` bytes, space separated; an ellipsis marks
/// truncation.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let shown = data.len().min(max);
    let mut out = String::with_capacity(shown * 3 + 4);
    for (i, b) in data.iter().take(shown).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(&mut out, "{:02x}", b);
    }
    if data.len() > max {
        out.push_str(" …");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::hex_snippet;

    #[test]
    fn formats_and_truncates() {
        assert_eq!(hex_snippet(&[0x55, 0x00, 0x0a], 8), "55 00 0a");
        assert_eq!(hex_snippet(&[1, 2, 3, 4], 2), "01 02 …");
        assert_eq!(hex_snippet(&[], 4), "");
    }
}
