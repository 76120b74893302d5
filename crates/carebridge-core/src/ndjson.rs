//! NDJSON (newline delimited JSON) codec.
//!
//! Writes one compact JSON document per line, UTF-8, newline-terminated,
//! with non-ASCII characters preserved unescaped. Reading splits on
//! newlines and skips blank lines; parsing each line is left to the
//! caller, so one malformed line never poisons its neighbours.

use std::io::Write;

use serde_json::Value;

use crate::error::Result;

/// File extension used for NDJSON artifacts.
pub const FILE_EXTENSION: &str = "ndjson";

/// Content type served for NDJSON artifacts.
pub const CONTENT_TYPE: &str = "application/x-ndjson";

/// Write records to `output`, one compact JSON document per line.
pub fn write_records<W: Write>(records: &[Value], output: &mut W) -> Result<()> {
    for record in records {
        let line = serde_json::to_string(record)?;
        output.write_all(line.as_bytes())?;
        output.write_all(b"\n")?;
    }
    output.flush()?;
    Ok(())
}

/// Serialize records to an NDJSON string.
pub fn to_string(records: &[Value]) -> Result<String> {
    let mut buf = Vec::new();
    write_records(records, &mut buf)?;
    // write_records only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Iterate over the non-blank lines of an NDJSON document.
///
/// Yields `(line_number, line)` pairs with 1-based line numbers and
/// surrounding whitespace trimmed.
pub fn lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content.lines().enumerate().filter_map(|(index, raw)| {
        let line = raw.trim();
        if line.is_empty() {
            None
        } else {
            Some((index + 1, line))
        }
    })
}
