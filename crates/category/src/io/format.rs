//! Text header of category and dump files.
//!
//! ```text
//! # dbacl-rs 1 category file
//! # divergence <f> logZ <f> max_order <d> <type>
//! # hash_bits <d> features <d> unique_features <d> documents <d>
//! # shannon <f> <f>
//! # gamma <alpha> <beta> <mu> <s2>
//! # regex <pattern>[||<digits>]          (zero or more)
//! # options <bits> <cp> <dt> <text>       (at most one)
//! #
//! ```
//!
//! Category files continue with the binary digram matrix and record table.
//! Dump files continue with [`DUMP_MARKER`] and one text line per token.

use crate::model::{
    CategoryHeader, CharParser, ModelOptions, ModelType, RegexSpec, ALL_SUBMATCHES, MAX_SUBMATCH,
};
use dbacl_core::{DbaclError, Result, MAX_HASH_BITS, MAX_ORDER};
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::{debug, warn};

/// Prefix every category file starts with.
pub const MAGIC_PREFIX: &str = "# dbacl";

/// First line written by this crate.
pub const MAGIC: &str = "# dbacl-rs 1 category file";

/// Column line separating a dump header from its records.
pub const DUMP_MARKER: &str = "# lambda | dig_ref | count | id | token";

const REGEX_TAG: &str = "# regex ";
const OPTIONS_TAG: &str = "# options ";
const TERMINATOR: &str = "#";

/// Read one header line, counting consumed bytes.
fn next_line<R: BufRead>(reader: &mut R, consumed: &mut usize) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader
        .read_until(b'\n', &mut buf)
        .map_err(|e| DbaclError::Format(format!("cannot read header: {}", e)))?;
    if n == 0 {
        return Ok(None);
    }
    *consumed += n;
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

fn required_line<R: BufRead>(reader: &mut R, consumed: &mut usize, which: &str) -> Result<String> {
    next_line(reader, consumed)?
        .ok_or_else(|| DbaclError::Format(format!("missing {} line", which)))
}

/// Match `line` word by word against `pattern`. `None` entries capture.
fn scan<'a>(line: &'a str, pattern: &[Option<&str>], which: &str) -> Result<Vec<&'a str>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < pattern.len() {
        return Err(DbaclError::Format(format!("truncated {} line: {}", which, line)));
    }

    let mut captured = Vec::new();
    for (word, expected) in words.iter().zip(pattern) {
        match expected {
            Some(literal) if word != literal => {
                return Err(DbaclError::Format(format!("bad {} line: {}", which, line)));
            }
            Some(_) => {}
            None => captured.push(*word),
        }
    }
    Ok(captured)
}

fn field<T: FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DbaclError::Format(format!("cannot parse {} from '{}'", name, value)))
}

/// Parse a header, leaving `reader` positioned just after the terminator.
///
/// Returns the header and the number of bytes it occupied.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<(CategoryHeader, usize)> {
    let mut consumed = 0;
    let mut header = CategoryHeader::default();

    let magic = required_line(reader, &mut consumed, "magic")?;
    if !magic.starts_with(MAGIC_PREFIX) {
        return Err(DbaclError::Format("not a dbacl category file".to_string()));
    }

    let line = required_line(reader, &mut consumed, "divergence")?;
    let v = scan(
        &line,
        &[Some("#"), Some("divergence"), None, Some("logZ"), None, Some("max_order"), None, None],
        "divergence",
    )?;
    header.divergence = field(v[0], "divergence")?;
    header.logz = field(v[1], "logZ")?;
    header.max_order = field(v[2], "max_order")?;
    header.model_type = ModelType::from_tag(v[3]);
    if header.max_order == 0 || header.max_order > MAX_ORDER {
        return Err(DbaclError::Format(format!(
            "max_order {} out of range",
            header.max_order
        )));
    }

    let line = required_line(reader, &mut consumed, "hash_bits")?;
    let v = scan(
        &line,
        &[
            Some("#"),
            Some("hash_bits"),
            None,
            Some("features"),
            None,
            Some("unique_features"),
            None,
            Some("documents"),
            None,
        ],
        "hash_bits",
    )?;
    header.hash_bits = field(v[0], "hash_bits")?;
    header.full_token_count = field(v[1], "features")?;
    header.unique_token_count = field(v[2], "unique_features")?;
    header.num_docs = field(v[3], "documents")?;
    if header.hash_bits == 0 || header.hash_bits > MAX_HASH_BITS {
        return Err(DbaclError::Format(format!(
            "hash_bits {} out of range",
            header.hash_bits
        )));
    }

    let line = required_line(reader, &mut consumed, "shannon")?;
    let v = scan(&line, &[Some("#"), Some("shannon"), None, None], "shannon")?;
    header.shannon = field(v[0], "shannon")?;
    header.shannon_s2 = field(v[1], "shannon_s2")?;

    let line = required_line(reader, &mut consumed, "gamma")?;
    let v = scan(&line, &[Some("#"), Some("gamma"), None, None, None, None], "gamma")?;
    header.alpha = field(v[0], "alpha")?;
    header.beta = field(v[1], "beta")?;
    header.mu = field(v[2], "mu")?;
    header.s2 = field(v[3], "s2")?;

    let mut seen_options = false;
    loop {
        let line = required_line(reader, &mut consumed, "terminator")?;
        if line.trim_end() == TERMINATOR {
            break;
        } else if let Some(rest) = line.strip_prefix(REGEX_TAG) {
            header.regexes.push(parse_regex_line(rest));
        } else if line.starts_with(OPTIONS_TAG) {
            if seen_options {
                return Err(DbaclError::Format("duplicate options line".to_string()));
            }
            seen_options = true;
            let v = scan(&line, &[Some("#"), Some("options"), None, None, None], "options")?;
            header.options = ModelOptions::from_bits(field(v[0], "options")?);
            header.char_parser = CharParser::from_code(field(v[1], "char class")?)?;
            header.dig_type = field(v[2], "digitization type")?;
        } else {
            debug!(line = %line, "ignoring unknown header line");
        }
    }

    header.resolve_defaults();
    Ok((header, consumed))
}

/// Split a `pattern[||digits]` regex line into pattern and submatch bitmap.
pub fn parse_regex_line(rest: &str) -> RegexSpec {
    match rest.rfind("||") {
        Some(pos) => {
            let (pattern, suffix) = (&rest[..pos], &rest[pos + 2..]);
            let mut submatches = 0u32;
            for c in suffix.chars() {
                match c.to_digit(10) {
                    Some(d) if d >= 1 => submatches |= 1 << d,
                    _ => warn!("could not decode || suffix for '{}'", rest),
                }
            }
            RegexSpec {
                pattern: pattern.to_string(),
                submatches,
            }
        }
        None => RegexSpec::new(rest),
    }
}

fn format_regex_line(spec: &RegexSpec) -> String {
    if spec.submatches == ALL_SUBMATCHES {
        return spec.pattern.clone();
    }
    let digits: String = (1..=MAX_SUBMATCH as u32)
        .filter(|d| spec.submatches & (1 << d) != 0)
        .filter_map(|d| char::from_digit(d, 10))
        .collect();
    format!("{}||{}", spec.pattern, digits)
}

/// Write a header, terminator included.
pub fn write_header<W: Write>(out: &mut W, header: &CategoryHeader) -> std::io::Result<()> {
    writeln!(out, "{}", MAGIC)?;
    writeln!(
        out,
        "# divergence {} logZ {} max_order {} {}",
        header.divergence,
        header.logz,
        header.max_order,
        header.model_type.tag()
    )?;
    writeln!(
        out,
        "# hash_bits {} features {} unique_features {} documents {}",
        header.hash_bits, header.full_token_count, header.unique_token_count, header.num_docs
    )?;
    writeln!(out, "# shannon {} {}", header.shannon, header.shannon_s2)?;
    writeln!(
        out,
        "# gamma {} {} {} {}",
        header.alpha, header.beta, header.mu, header.s2
    )?;
    for spec in &header.regexes {
        if !spec.is_storable() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("submatches of '{}' cannot be written", spec.pattern),
            ));
        }
        writeln!(out, "{}{}", REGEX_TAG, format_regex_line(spec))?;
    }
    writeln!(
        out,
        "{}{} {} {} {}",
        OPTIONS_TAG,
        header.options.to_bits(),
        header.char_parser.code(),
        header.dig_type,
        header.options.describe(header.char_parser)
    )?;
    writeln!(out, "{}", TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> CategoryHeader {
        let mut header = CategoryHeader {
            divergence: 1.25,
            logz: -0.5,
            max_order: 3,
            model_type: ModelType::Sequential,
            hash_bits: 10,
            full_token_count: 1234,
            unique_token_count: 321,
            num_docs: 7,
            shannon: 4.5,
            shannon_s2: 0.125,
            alpha: 2.0,
            beta: 0.75,
            mu: 3.0,
            s2: 1.5,
            ..CategoryHeader::default()
        };
        header.options.mbox_format = true;
        header.regexes.push(RegexSpec::new("([a-z]+) ([0-9]+)"));
        header.regexes.push(RegexSpec {
            pattern: "(x)(y)".to_string(),
            submatches: (1 << 1) | (1 << 2),
        });
        header.resolve_defaults();
        header
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        buf.extend_from_slice(b"\x00\x01binary");

        let mut cursor = Cursor::new(buf.clone());
        let (parsed, consumed) = read_header(&mut cursor).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&buf[consumed..], b"\x00\x01binary");
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut cursor = Cursor::new(b"# something else\n".to_vec());
        assert!(matches!(read_header(&mut cursor), Err(DbaclError::Format(_))));
    }

    #[test]
    fn test_rejects_unparsable_number() {
        let text = format!(
            "{}\n# divergence abc logZ 0 max_order 1 multinomial\n",
            MAGIC
        );
        let mut cursor = Cursor::new(text.into_bytes());
        assert!(read_header(&mut cursor).is_err());
    }

    #[test]
    fn test_rejects_missing_terminator() {
        let header = sample_header();
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        buf.truncate(buf.len() - 2);
        let mut cursor = Cursor::new(buf);
        assert!(read_header(&mut cursor).is_err());
    }

    #[test]
    fn test_regex_suffix() {
        let spec = parse_regex_line("(a)(b)(c)||13");
        assert_eq!(spec.pattern, "(a)(b)(c)");
        assert!(spec.uses_group(1));
        assert!(!spec.uses_group(2));
        assert!(spec.uses_group(3));

        let spec = parse_regex_line("a|b");
        assert_eq!(spec.submatches, ALL_SUBMATCHES);
    }

    #[test]
    fn test_regex_groups_survive_header_roundtrip() {
        let mut header = sample_header();
        header.regexes = vec![RegexSpec::with_groups("(a)(b)(c)(d)(e)(f)(g)(h)(i)", &[2, 9]).unwrap()];
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        let (read, _) = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read.regexes, header.regexes);

        assert!(RegexSpec::with_groups("(a)", &[10]).is_err());
        assert!(RegexSpec::with_groups("(a)", &[0]).is_err());

        header.regexes[0].submatches |= 1 << 12;
        assert!(!header.regexes[0].is_storable());
        assert!(write_header(&mut Vec::new(), &header).is_err());
    }

    #[test]
    fn test_missing_options_line_resolves_defaults() {
        let text = format!(
            "{}\n# divergence 0 logZ 0 max_order 1 multinomial\n\
             # hash_bits 4 features 0 unique_features 0 documents 0\n\
             # shannon 0 0\n# gamma 0 0 0 0\n#\n",
            MAGIC
        );
        let mut cursor = Cursor::new(text.into_bytes());
        let (header, _) = read_header(&mut cursor).unwrap();
        assert_eq!(header.char_parser, CharParser::Alpha);
        assert!(header.options.use_stdtok);
        assert_eq!(header.model_type, ModelType::Simple);
    }
}
