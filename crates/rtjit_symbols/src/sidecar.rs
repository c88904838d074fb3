//! Plain-text symbol sidecar stored next to cached objects.
//!
//! One `demangled<TAB>linkable` pair per line.

use std::io::{self, BufRead, Write};

use crate::table::SymbolEntry;

pub fn write_sidecar<W: Write>(mut out: W, entries: &[SymbolEntry]) -> io::Result<()> {
    for entry in entries {
        writeln!(out, "{}\t{}", entry.demangled, entry.linkable)?;
    }
    out.flush()
}

/// Read a sidecar. Lines without a tab separator are skipped.
pub fn parse_sidecar<R: BufRead>(input: R) -> io::Result<Vec<SymbolEntry>> {
    let mut entries = Vec::new();
    for line in input.lines() {
        let line = line?;
        if let Some((demangled, linkable)) = line.split_once('\t') {
            if linkable.is_empty() {
                continue;
            }
            entries.push(SymbolEntry::new(demangled, linkable));
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_malformed_lines() {
        let text = "add(int, int)\t_Z3addii\nno separator here\nprocess\tprocess\n\n";
        let entries = parse_sidecar(text.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                SymbolEntry::new("add(int, int)", "_Z3addii"),
                SymbolEntry::new("process", "process"),
            ]
        );
    }

    #[test]
    fn written_sidecar_reads_back() {
        let entries = vec![SymbolEntry::new("square(int)", "_Z6squarei")];
        let mut buffer = Vec::new();
        write_sidecar(&mut buffer, &entries).unwrap();
        assert_eq!(buffer, b"square(int)\t_Z6squarei\n");
        assert_eq!(parse_sidecar(buffer.as_slice()).unwrap(), entries);
    }
}
