//! Hex rendering of payloads for log output and remote inspection.

/// Render `data` as a hex dump: 16 bytes per line, a 4-digit hex offset
/// prefix, and an extra space every `group` bytes (0 disables grouping).
pub fn hex_dump(data: &[u8], group: usize) -> String {
    let mut out = String::with_capacity(data.len() * 3 + data.len() / 16 * 8);

    for (line_no, line) in data.chunks(16).enumerate() {
        if line_no > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{:04x} ", line_no * 16));
        for (i, byte) in line.iter().enumerate() {
            if i > 0 && group > 0 && i % group == 0 {
                out.push(' ');
            }
            out.push_str(&format!(" {byte:02x}"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        assert_eq!(hex_dump(&[0x00, 0xff, 0x10], 0), "0000  00 ff 10");
    }

    #[test]
    fn grouping_inserts_gaps() {
        assert_eq!(hex_dump(&[1, 2, 3, 4], 2), "0000  01 02  03 04");
    }

    #[test]
    fn lines_break_at_sixteen_bytes() {
        let data: Vec<u8> = (0..18).collect();
        let dump = hex_dump(&data, 0);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000 "));
        assert!(lines[1].starts_with("0010 "));
        assert!(lines[1].ends_with("10 11"));
    }

    #[test]
    fn empty_payload() {
        assert_eq!(hex_dump(&[], 0), "");
    }
}
