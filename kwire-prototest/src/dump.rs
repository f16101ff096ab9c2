//! Canonical hex dumps.

use std::fmt::Write;

const ROW: usize = 16;

/// Formats `data` as rows of an eight-digit offset, sixteen hex bytes split
/// into two groups of eight, and the printable ASCII column.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(ROW) * 79);
    for (row, chunk) in data.chunks(ROW).enumerate() {
        let digits = hex::encode(chunk);
        let mut columns = String::with_capacity(3 * ROW + 1);
        for i in 0..ROW {
            if i == ROW / 2 {
                columns.push(' ');
            }
            match digits.get(i * 2..i * 2 + 2) {
                Some(pair) => {
                    columns.push_str(pair);
                    columns.push(' ');
                }
                None => columns.push_str("   "),
            }
        }
        let ascii: String = chunk
            .iter()
            .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
            .collect();
        // Writing to a String cannot fail.
        writeln!(out, "{:08x}  {} |{}|", row * ROW, columns, ascii).ok();
    }
    out
}
