//! RFC-4180 CSV record reading with a configurable delimiter.
//!
//! Hand-rolled rather than pulled from a crate: no CSV crate appears
//! anywhere in this corpus, and the grammar needed here (quoted fields,
//! doubled-quote escaping, embedded delimiters/newlines) is small enough
//! to implement directly and keep the same hand-rolled-parser posture the
//! rest of the engine uses for its own script language.

use std::io::{self, BufRead};

/// Reads one logical CSV record from `reader`, honoring quoted fields that
/// may contain the delimiter, embedded newlines, or doubled `""` escapes.
/// Returns `Ok(None)` at end of input.
pub fn read_record<R: BufRead>(reader: &mut R, delimiter: u8) -> io::Result<Option<Vec<String>>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut saw_any_byte = false;
    let mut byte = [0u8; 1];

    loop {
        let n = reader.read(&mut byte)?;
        if n == 0 {
            if !saw_any_byte {
                return Ok(None);
            }
            fields.push(std::mem::take(&mut field));
            return Ok(Some(fields));
        }
        saw_any_byte = true;
        let c = byte[0];

        if in_quotes {
            if c == b'"' {
                // Peek for a doubled quote (escaped literal quote).
                let mut next = [0u8; 1];
                let peeked = reader.read(&mut next)?;
                if peeked == 1 && next[0] == b'"' {
                    field.push('"');
                } else {
                    in_quotes = false;
                    if peeked == 1 {
                        push_plain_byte(&mut fields, &mut field, next[0], delimiter, &mut in_quotes)?;
                        if next[0] == b'\n' {
                            return Ok(Some(fields));
                        }
                    }
                }
            } else {
                field.push(c as char);
            }
            continue;
        }

        match c {
            b'"' if field.is_empty() => in_quotes = true,
            b'\r' => {}
            b'\n' => {
                fields.push(std::mem::take(&mut field));
                return Ok(Some(fields));
            }
            b if b == delimiter => {
                fields.push(std::mem::take(&mut field));
            }
            other => field.push(other as char),
        }
    }
}

fn push_plain_byte(
    fields: &mut Vec<String>,
    field: &mut String,
    c: u8,
    delimiter: u8,
    in_quotes: &mut bool,
) -> io::Result<()> {
    match c {
        b'"' if field.is_empty() => *in_quotes = true,
        b'\r' => {}
        b'\n' => fields.push(std::mem::take(field)),
        b if b == delimiter => fields.push(std::mem::take(field)),
        other => field.push(other as char),
    }
    Ok(())
}

/// Writes one CSV record (RFC-4180), quoting fields that contain the
/// delimiter, a quote, or a newline.
pub fn write_record(fields: &[String], delimiter: u8) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(delimiter as char);
        }
        let needs_quoting =
            field.contains(delimiter as char) || field.contains('"') || field.contains('\n') || field.contains('\r');
        if needs_quoting {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn simple_record() {
        let mut cur = Cursor::new("a,b,c\n");
        let record = read_record(&mut cur, b',').unwrap().unwrap();
        assert_eq!(record, vec!["a", "b", "c"]);
    }

    #[test]
    fn quoted_field_with_embedded_delimiter_and_newline() {
        let mut cur = Cursor::new("\"a,b\",\"c\nd\",e\n");
        let record = read_record(&mut cur, b',').unwrap().unwrap();
        assert_eq!(record, vec!["a,b", "c\nd", "e"]);
    }

    #[test]
    fn doubled_quote_escape() {
        let mut cur = Cursor::new("\"say \"\"hi\"\"\"\n");
        let record = read_record(&mut cur, b',').unwrap().unwrap();
        assert_eq!(record, vec!["say \"hi\""]);
    }

    #[test]
    fn eof_returns_none() {
        let mut cur = Cursor::new("");
        assert!(read_record(&mut cur, b',').unwrap().is_none());
    }

    #[test]
    fn round_trip() {
        let fields = vec!["plain".to_string(), "has,comma".to_string(), "has\"quote".to_string()];
        let line = write_record(&fields, b',');
        let mut cur = Cursor::new(format!("{line}\n"));
        let parsed = read_record(&mut cur, b',').unwrap().unwrap();
        assert_eq!(parsed, fields);
    }
}
