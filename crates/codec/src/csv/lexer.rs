// SPDX-License-Identifier: Apache-2.0

//! Chunk-fed CSV lexer.
//!
//! RFC-4180 quoting with both newline conventions. The lexer is a byte
//! state machine, so quoted fields, CRLF pairs and multi-byte UTF-8
//! sequences may straddle chunk boundaries freely; field bytes are
//! validated as UTF-8 when a token completes.
//!
//! Every token records its raw byte width between delimiters, quotes
//! included. The width is what lets the decoder tell a quoted empty string
//! (width 2) from a bare empty cell (width 0).

use memchr::{memchr, memchr3};
use strata_pipeline::Error;

/// One lexed field: decoded text plus raw token width in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvToken {
    /// The field text with quoting removed.
    pub text: String,
    /// Raw bytes the token occupied between delimiters, quotes included.
    pub width: u64,
}

/// One lexed record and the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// The record's fields, in order.
    pub fields: Vec<CsvToken>,
    /// One-based line the record started on.
    pub line: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteEnd,
}

/// Streaming CSV lexer; feed chunks, collect records.
pub struct CsvLexer {
    state: State,
    field: Vec<u8>,
    width: u64,
    fields: Vec<CsvToken>,
    line: u64,
    record_line: u64,
    saw_cr: bool,
}

impl CsvLexer {
    /// Creates a lexer positioned at line 1.
    #[must_use]
    pub fn new() -> Self {
        CsvLexer {
            state: State::FieldStart,
            field: Vec::new(),
            width: 0,
            fields: Vec::new(),
            line: 1,
            record_line: 1,
            saw_cr: false,
        }
    }

    /// Current one-based line number.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    fn end_field(&mut self) -> Result<(), Error> {
        let bytes = std::mem::take(&mut self.field);
        let text = String::from_utf8(bytes).map_err(|_| Error::DataCorruption {
            message: "Invalid UTF-8 sequence in CSV field".to_owned(),
            line: Some(self.line),
            column: None,
        })?;
        self.fields.push(CsvToken {
            text,
            width: self.width,
        });
        self.width = 0;
        Ok(())
    }

    fn end_record(&mut self, records: &mut Vec<CsvRecord>) -> Result<(), Error> {
        let blank = self.state == State::FieldStart && self.fields.is_empty() && self.width == 0;
        if !blank {
            self.end_field()?;
            records.push(CsvRecord {
                fields: std::mem::take(&mut self.fields),
                line: self.record_line,
            });
        }
        self.state = State::FieldStart;
        Ok(())
    }

    fn newline(&mut self, records: &mut Vec<CsvRecord>) -> Result<(), Error> {
        self.end_record(records)?;
        self.line += 1;
        self.record_line = self.line;
        Ok(())
    }

    /// Feeds one chunk, returning the records completed by it.
    ///
    /// # Errors
    ///
    /// Returns a corruption error, with the current line, for invalid
    /// UTF-8 or malformed quoting.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<CsvRecord>, Error> {
        let mut records = Vec::new();
        let mut index = 0;

        while index < chunk.len() {
            let byte = chunk[index];

            if self.saw_cr {
                self.saw_cr = false;
                if byte == b'\n' {
                    index += 1;
                    continue;
                }
            }

            match self.state {
                State::FieldStart => {
                    match byte {
                        b'"' => {
                            self.state = State::Quoted;
                            self.width += 1;
                        }
                        b',' => self.end_field()?,
                        b'\r' => {
                            self.newline(&mut records)?;
                            self.saw_cr = true;
                        }
                        b'\n' => self.newline(&mut records)?,
                        other => {
                            self.state = State::Unquoted;
                            self.field.push(other);
                            self.width += 1;
                        }
                    }
                    index += 1;
                }
                State::Unquoted => {
                    // Fast-scan to the next delimiter or record boundary.
                    let rest = &chunk[index..];
                    let stop = memchr3(b',', b'\r', b'\n', rest).unwrap_or(rest.len());
                    self.field.extend_from_slice(&rest[..stop]);
                    self.width += stop as u64;
                    index += stop;
                    if index < chunk.len() {
                        match chunk[index] {
                            b',' => {
                                self.end_field()?;
                                self.state = State::FieldStart;
                            }
                            b'\r' => {
                                self.newline(&mut records)?;
                                self.saw_cr = true;
                            }
                            _ => self.newline(&mut records)?,
                        }
                        index += 1;
                    }
                }
                State::Quoted => {
                    let rest = &chunk[index..];
                    let stop = memchr(b'"', rest).unwrap_or(rest.len());
                    let span = &rest[..stop];
                    self.line += span.iter().filter(|&&b| b == b'\n').count() as u64;
                    self.field.extend_from_slice(span);
                    self.width += stop as u64;
                    index += stop;
                    if index < chunk.len() {
                        self.state = State::QuoteEnd;
                        self.width += 1;
                        index += 1;
                    }
                }
                State::QuoteEnd => {
                    match byte {
                        b'"' => {
                            self.field.push(b'"');
                            self.width += 1;
                            self.state = State::Quoted;
                        }
                        b',' => {
                            self.end_field()?;
                            self.state = State::FieldStart;
                        }
                        b'\r' => {
                            self.newline(&mut records)?;
                            self.saw_cr = true;
                        }
                        b'\n' => self.newline(&mut records)?,
                        _ => {
                            return Err(Error::DataCorruption {
                                message: "Unexpected character after closing quote".to_owned(),
                                line: Some(self.line),
                                column: None,
                            });
                        }
                    }
                    index += 1;
                }
            }
        }

        Ok(records)
    }

    /// Ends the stream, returning a final record not closed by a newline.
    ///
    /// # Errors
    ///
    /// Returns a corruption error for an unterminated quoted field.
    pub fn finish(&mut self) -> Result<Option<CsvRecord>, Error> {
        if self.state == State::Quoted {
            return Err(Error::DataCorruption {
                message: "Unterminated quoted field at end of stream".to_owned(),
                line: Some(self.line),
                column: None,
            });
        }
        if self.state == State::FieldStart && self.fields.is_empty() && self.width == 0 {
            return Ok(None);
        }
        self.end_field()?;
        Ok(Some(CsvRecord {
            fields: std::mem::take(&mut self.fields),
            line: self.record_line,
        }))
    }
}

impl Default for CsvLexer {
    fn default() -> Self {
        CsvLexer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &[&[u8]]) -> Vec<CsvRecord> {
        let mut lexer = CsvLexer::new();
        let mut records = Vec::new();
        for chunk in input {
            records.extend(lexer.feed(chunk).expect("lex"));
        }
        if let Some(last) = lexer.finish().expect("finish") {
            records.push(last);
        }
        records
    }

    fn texts(record: &CsvRecord) -> Vec<&str> {
        record.fields.iter().map(|token| token.text.as_str()).collect()
    }

    #[test]
    fn plain_records_split_on_commas_and_newlines() {
        let records = lex(&[b"a,b,c\nx,y,z\n"]);
        assert_eq!(records.len(), 2);
        assert_eq!(texts(&records[0]), ["a", "b", "c"]);
        assert_eq!(texts(&records[1]), ["x", "y", "z"]);
        assert_eq!(records[1].line, 2);
    }

    #[test]
    fn empty_and_quoted_empty_fields_have_different_widths() {
        let records = lex(&[b"a,,b\n,\"\",\n"]);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(texts(first), ["a", "", "b"]);
        assert_eq!(first.fields[1].width, 0);

        let second = &records[1];
        assert_eq!(texts(second), ["", "", ""]);
        assert_eq!(second.fields[0].width, 0);
        assert_eq!(second.fields[1].width, 2);
        assert_eq!(second.fields[2].width, 0);
    }

    #[test]
    fn quotes_escape_delimiters_and_doubled_quotes() {
        let records = lex(&[b"\"a,b\",\"say \"\"hi\"\"\"\n"]);
        assert_eq!(texts(&records[0]), ["a,b", "say \"hi\""]);
    }

    #[test]
    fn tokens_survive_chunk_splits() {
        let whole = lex(&[b"alpha,\"be,ta\"\ngamma,delta\n"]);
        let split = lex(&[b"alp", b"ha,\"be", b",ta\"\ngam", b"ma,delta\n"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn utf8_sequences_survive_chunk_splits() {
        let bytes = "p\u{00e9},q\n".as_bytes();
        let (left, right) = bytes.split_at(2); // split inside the two-byte é
        let records = lex(&[left, right]);
        assert_eq!(texts(&records[0]), ["p\u{00e9}", "q"]);
    }

    #[test]
    fn crlf_and_final_unterminated_record_are_handled() {
        let records = lex(&[b"a,b\r\nc,d"]);
        assert_eq!(records.len(), 2);
        assert_eq!(texts(&records[1]), ["c", "d"]);
    }

    #[test]
    fn newlines_inside_quotes_count_for_line_numbers() {
        let mut lexer = CsvLexer::new();
        let records = lexer.feed(b"\"a\nb\",c\nx,y\n").expect("lex");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let mut lexer = CsvLexer::new();
        let _ = lexer.feed(b"\"abc").expect("partial feed");
        assert!(lexer.finish().is_err());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let records = lex(&[b"a\n\nb\n"]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line, 3);
    }
}
