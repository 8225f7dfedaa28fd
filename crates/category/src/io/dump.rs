//! Category dumps: a model header followed by one text line per token.
//!
//! ```text
//! <lambda> <reference weight> <count> <id in hex> [token]
//! ```

use super::format::{read_header, write_header, DUMP_MARKER};
use crate::model::{CategoryHeader, CategoryModel};
use dbacl_core::{display_token, token_id, DbaclError, Result};
use std::io::{BufRead, Write};

/// One token line of a dump.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpRecord {
    pub lam: f64,
    pub reference: f64,
    pub count: u64,
    pub id: u64,
    /// Printable token text, when known
    pub token: Option<String>,
}

impl DumpRecord {
    /// Parse the numeric columns of a dump line; trailing text is the token.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(5, char::is_whitespace);
        let lam = parts.next()?.parse().ok()?;
        let reference = parts.next()?.parse().ok()?;
        let count = parts.next()?.parse().ok()?;
        let id = u64::from_str_radix(parts.next()?.trim_start_matches("0x"), 16).ok()?;
        let token = parts
            .next()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Some(Self {
            lam,
            reference,
            count,
            id,
            token,
        })
    }
}

/// Write a dump: header, marker line, then one line per record.
pub fn write_dump<W: Write>(
    out: &mut W,
    header: &CategoryHeader,
    records: &[DumpRecord],
) -> Result<()> {
    let mut header = header.clone();
    header.unique_token_count = records.len() as u64;

    let io = |e: std::io::Error| DbaclError::Dump(format!("cannot write dump: {}", e));
    write_header(out, &header).map_err(io)?;
    writeln!(out, "{}", DUMP_MARKER).map_err(io)?;
    for r in records {
        write!(out, "{} {} {} {:016x}", r.lam, r.reference, r.count, r.id).map_err(io)?;
        match &r.token {
            Some(token) => writeln!(out, " {}", token).map_err(io)?,
            None => writeln!(out).map_err(io)?,
        }
    }
    Ok(())
}

/// Streams the records of a dump after its header.
pub struct DumpReader<R> {
    reader: R,
    header: CategoryHeader,
    line_number: usize,
}

impl<R: BufRead> DumpReader<R> {
    /// Read the header and the marker line.
    pub fn new(mut reader: R) -> Result<Self> {
        let (header, _) = read_header(&mut reader)?;

        let mut marker = String::new();
        reader
            .read_line(&mut marker)
            .map_err(|e| DbaclError::Dump(format!("cannot read dump: {}", e)))?;
        if !marker.starts_with(DUMP_MARKER) {
            return Err(DbaclError::Dump(
                "not a dbacl model dump (missing column line)".to_string(),
            ));
        }

        Ok(Self {
            reader,
            header,
            line_number: 0,
        })
    }

    pub fn header(&self) -> &CategoryHeader {
        &self.header
    }

    /// Next record; blank lines are skipped, unparsable lines are errors.
    pub fn next_record(&mut self) -> Result<Option<DumpRecord>> {
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|e| DbaclError::Dump(format!("cannot read dump: {}", e)))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return DumpRecord::parse(line).map(Some).ok_or_else(|| {
                DbaclError::Dump(format!(
                    "unable to parse dump line {}: {}",
                    self.line_number, line
                ))
            });
        }
    }
}

impl CategoryModel {
    /// Dump records for the given unigram tokens and their counts.
    ///
    /// Lambdas come from the feature table (0 when absent); reference
    /// weights are recomputed from the digram matrix.
    pub fn dump_records<'t, I>(&self, tokens: I) -> Vec<DumpRecord>
    where
        I: IntoIterator<Item = (&'t [u8], u64)>,
    {
        tokens
            .into_iter()
            .map(|(token, count)| {
                let id = token_id(token);
                DumpRecord {
                    lam: self.lookup(id).map(|item| item.lam as f64).unwrap_or(0.0),
                    reference: self.reference_weight(token),
                    count,
                    id,
                    token: Some(display_token(token)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_record_line() {
        let r = DumpRecord::parse("-0.5 -3.25 12 00000000000000ff hello world").unwrap();
        assert_eq!(r.lam, -0.5);
        assert_eq!(r.reference, -3.25);
        assert_eq!(r.count, 12);
        assert_eq!(r.id, 0xff);
        assert_eq!(r.token.as_deref(), Some("hello world"));

        assert!(DumpRecord::parse("1.0 2.0 3").is_none());
        assert!(DumpRecord::parse("1.0 x 3 ff").is_none());
    }

    #[test]
    fn test_dump_roundtrip() {
        let header = CategoryHeader::default();
        let records = vec![
            DumpRecord {
                lam: 0.25,
                reference: -5.0,
                count: 3,
                id: 0xdeadbeef,
                token: Some("foo".to_string()),
            },
            DumpRecord {
                lam: -1.0,
                reference: -7.5,
                count: 1,
                id: 42,
                token: None,
            },
        ];

        let mut buf = Vec::new();
        write_dump(&mut buf, &header, &records).unwrap();

        let mut reader = DumpReader::new(Cursor::new(buf)).unwrap();
        assert_eq!(reader.header().unique_token_count, 2);
        assert_eq!(reader.next_record().unwrap(), Some(records[0].clone()));
        assert_eq!(reader.next_record().unwrap(), Some(records[1].clone()));
        assert_eq!(reader.next_record().unwrap(), None);
    }

    #[test]
    fn test_missing_marker_is_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, &CategoryHeader::default()).unwrap();
        buf.extend_from_slice(b"0.1 0.2 3 ff\n");
        assert!(matches!(
            DumpReader::new(Cursor::new(buf)),
            Err(DbaclError::Dump(_))
        ));
    }
}
