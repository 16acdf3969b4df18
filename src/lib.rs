pub mod app;
pub mod asm;
pub mod config;
pub mod sim;

pub mod utils {
    use std::fmt::Write;

    /// Hex dump of `xs[start..end]`, 16 bytes per row.
    pub fn format_bytes(xs: &[u8], start: Option<usize>, end: Option<usize>) -> String {
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(xs.len()).min(xs.len());
        let minj = start / 16;
        let maxj = (end + 15) / 16;
        let mut s = String::new();
        s.push_str("    ");
        for i in 0..16 {
            let _ = write!(s, " {0:X} ", i);
        }
        s.push('\n');
        s.push_str("----");
        s.push_str(&"---".repeat(16));
        s.push('\n');
        for j in minj..maxj {
            let _ = write!(s, "{0:<2X}: ", j);
            for i in 0..16 {
                let addr = 16 * j + i;
                if (start <= addr) & (addr < end) {
                    let _ = write!(s, "{0:>02X} ", xs[addr]);
                }
            }
            s.push('\n');
        }
        s
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_format_bytes() {
            let xs: Vec<u8> = (0..40).collect();
            let s = format_bytes(&xs, Some(16), Some(34));
            let rows: Vec<&str> = s.lines().collect();
            assert_eq!(4, rows.len());
            assert!(rows[2].starts_with("1 : 10 11"));
            assert_eq!("2 : 20 21 ", rows[3]);
        }
    }
}
