// SPDX-License-Identifier: Apache-2.0

//! Chunk-fed JSON tokenizer.
//!
//! Produces a flat token stream; structural interpretation is the
//! decoder's job. Strings handle the full escape set including surrogate
//! pairs, and every token carries the one-based line it started on.
//! State survives chunk boundaries, so tokens may be split anywhere.

use strata_pipeline::Error;

/// One JSON token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonToken {
    /// `{`
    StartObject,
    /// `}`
    EndObject,
    /// `[`
    StartArray,
    /// `]`
    EndArray,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// A string literal, unescaped.
    String(String),
    /// A number literal, kept as text.
    Number(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Value,
    InString,
    StringEscape,
    StringUnicode { digits: u8, acc: u16 },
    InNumber,
    InLiteral,
}

/// Streaming JSON tokenizer; feed chunks, collect `(token, line)` pairs.
pub struct JsonLexer {
    state: State,
    buffer: Vec<u8>,
    line: u64,
    token_line: u64,
    pending_high_surrogate: Option<u16>,
}

impl JsonLexer {
    /// Creates a lexer positioned at line 1.
    #[must_use]
    pub fn new() -> Self {
        JsonLexer {
            state: State::Value,
            buffer: Vec::new(),
            line: 1,
            token_line: 1,
            pending_high_surrogate: None,
        }
    }

    /// Current one-based line number.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::DataCorruption {
            message: message.into(),
            line: Some(self.line),
            column: None,
        }
    }

    fn push_char(&mut self, ch: char) {
        let mut encoded = [0u8; 4];
        self.buffer
            .extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
    }

    fn finish_string(&mut self) -> Result<JsonToken, Error> {
        if self.pending_high_surrogate.is_some() {
            return Err(self.error("Unpaired surrogate in string escape"));
        }
        let bytes = std::mem::take(&mut self.buffer);
        let text = String::from_utf8(bytes)
            .map_err(|_| self.error("Invalid UTF-8 sequence in string"))?;
        Ok(JsonToken::String(text))
    }

    fn finish_number(&mut self) -> Result<JsonToken, Error> {
        let bytes = std::mem::take(&mut self.buffer);
        let text = String::from_utf8(bytes)
            .map_err(|_| self.error("Invalid number literal"))?;
        Ok(JsonToken::Number(text))
    }

    fn finish_literal(&mut self) -> Result<JsonToken, Error> {
        let bytes = std::mem::take(&mut self.buffer);
        match bytes.as_slice() {
            b"true" => Ok(JsonToken::True),
            b"false" => Ok(JsonToken::False),
            b"null" => Ok(JsonToken::Null),
            other => Err(self.error(format!(
                "Invalid literal [{}]",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Feeds one chunk, returning completed tokens with their lines.
    ///
    /// # Errors
    ///
    /// Returns a corruption error, with the current line, for malformed
    /// input.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<(JsonToken, u64)>, Error> {
        let mut tokens = Vec::new();
        let mut index = 0;

        while index < chunk.len() {
            let byte = chunk[index];
            match self.state {
                State::Value => {
                    match byte {
                        b' ' | b'\t' | b'\r' => {}
                        b'\n' => self.line += 1,
                        b'{' => tokens.push((JsonToken::StartObject, self.line)),
                        b'}' => tokens.push((JsonToken::EndObject, self.line)),
                        b'[' => tokens.push((JsonToken::StartArray, self.line)),
                        b']' => tokens.push((JsonToken::EndArray, self.line)),
                        b':' => tokens.push((JsonToken::Colon, self.line)),
                        b',' => tokens.push((JsonToken::Comma, self.line)),
                        b'"' => {
                            self.state = State::InString;
                            self.token_line = self.line;
                            self.buffer.clear();
                        }
                        b'-' | b'0'..=b'9' => {
                            self.state = State::InNumber;
                            self.token_line = self.line;
                            self.buffer.clear();
                            self.buffer.push(byte);
                        }
                        b't' | b'f' | b'n' => {
                            self.state = State::InLiteral;
                            self.token_line = self.line;
                            self.buffer.clear();
                            self.buffer.push(byte);
                        }
                        other => {
                            return Err(
                                self.error(format!("Unexpected character [{}]", other as char))
                            );
                        }
                    }
                    index += 1;
                }
                State::InString => {
                    if self.pending_high_surrogate.is_some() && byte != b'\\' {
                        return Err(self.error("Unpaired surrogate in string escape"));
                    }
                    match byte {
                        b'"' => {
                            let token = self.finish_string()?;
                            tokens.push((token, self.token_line));
                            self.state = State::Value;
                        }
                        b'\\' => self.state = State::StringEscape,
                        byte if byte < 0x20 => {
                            return Err(self.error("Control character in string"));
                        }
                        byte => self.buffer.push(byte),
                    }
                    index += 1;
                }
                State::StringEscape => {
                    if self.pending_high_surrogate.is_some() && byte != b'u' {
                        return Err(self.error("Unpaired surrogate in string escape"));
                    }
                    match byte {
                        b'"' => self.buffer.push(b'"'),
                        b'\\' => self.buffer.push(b'\\'),
                        b'/' => self.buffer.push(b'/'),
                        b'b' => self.buffer.push(0x08),
                        b'f' => self.buffer.push(0x0c),
                        b'n' => self.buffer.push(b'\n'),
                        b'r' => self.buffer.push(b'\r'),
                        b't' => self.buffer.push(b'\t'),
                        b'u' => {
                            self.state = State::StringUnicode { digits: 0, acc: 0 };
                            index += 1;
                            continue;
                        }
                        other => {
                            return Err(
                                self.error(format!("Invalid escape [\\{}]", other as char))
                            );
                        }
                    }
                    self.state = State::InString;
                    index += 1;
                }
                State::StringUnicode { digits, acc } => {
                    let value = match byte {
                        b'0'..=b'9' => u16::from(byte - b'0'),
                        b'a'..=b'f' => u16::from(byte - b'a' + 10),
                        b'A'..=b'F' => u16::from(byte - b'A' + 10),
                        _ => return Err(self.error("Invalid unicode escape")),
                    };
                    let acc = (acc << 4) | value;
                    if digits + 1 < 4 {
                        self.state = State::StringUnicode {
                            digits: digits + 1,
                            acc,
                        };
                    } else {
                        self.apply_unicode_escape(acc)?;
                        self.state = State::InString;
                    }
                    index += 1;
                }
                State::InNumber => {
                    if matches!(byte, b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-') {
                        self.buffer.push(byte);
                        index += 1;
                    } else {
                        let token = self.finish_number()?;
                        tokens.push((token, self.token_line));
                        self.state = State::Value;
                        // Reprocess the delimiter byte as a fresh token.
                    }
                }
                State::InLiteral => {
                    if byte.is_ascii_alphabetic() {
                        self.buffer.push(byte);
                        index += 1;
                    } else {
                        let token = self.finish_literal()?;
                        tokens.push((token, self.token_line));
                        self.state = State::Value;
                    }
                }
            }
        }

        Ok(tokens)
    }

    fn apply_unicode_escape(&mut self, code: u16) -> Result<(), Error> {
        if let Some(high) = self.pending_high_surrogate.take() {
            if (0xDC00..=0xDFFF).contains(&code) {
                let combined =
                    0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(code) - 0xDC00);
                let ch = char::from_u32(combined)
                    .ok_or_else(|| self.error("Invalid surrogate pair"))?;
                self.push_char(ch);
                return Ok(());
            }
            return Err(self.error("Unpaired surrogate in string escape"));
        }
        if (0xD800..=0xDBFF).contains(&code) {
            self.pending_high_surrogate = Some(code);
            return Ok(());
        }
        if (0xDC00..=0xDFFF).contains(&code) {
            return Err(self.error("Unpaired surrogate in string escape"));
        }
        let ch =
            char::from_u32(u32::from(code)).ok_or_else(|| self.error("Invalid unicode escape"))?;
        self.push_char(ch);
        Ok(())
    }

    /// Ends the stream.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the stream ends inside a token.
    pub fn finish(&mut self) -> Result<(), Error> {
        match self.state {
            State::Value => Ok(()),
            _ => Err(self.error("Unexpected end of stream")),
        }
    }
}

impl Default for JsonLexer {
    fn default() -> Self {
        JsonLexer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &[&[u8]]) -> Vec<JsonToken> {
        let mut lexer = JsonLexer::new();
        let mut tokens = Vec::new();
        for chunk in input {
            tokens.extend(
                lexer
                    .feed(chunk)
                    .expect("lex")
                    .into_iter()
                    .map(|(token, _)| token),
            );
        }
        lexer.finish().expect("finish");
        tokens
    }

    #[test]
    fn tokenizes_a_simple_row_array() {
        let tokens = lex(&[br#"[{"id": 1, "ok": true, "x": null}]"#]);
        assert_eq!(tokens[0], JsonToken::StartArray);
        assert_eq!(tokens[1], JsonToken::StartObject);
        assert_eq!(tokens[2], JsonToken::String("id".to_owned()));
        assert_eq!(tokens[3], JsonToken::Colon);
        assert_eq!(tokens[4], JsonToken::Number("1".to_owned()));
        assert!(tokens.contains(&JsonToken::True));
        assert!(tokens.contains(&JsonToken::Null));
        assert_eq!(tokens.last(), Some(&JsonToken::EndArray));
    }

    #[test]
    fn tokens_survive_chunk_splits() {
        let whole = lex(&[br#"[{"name": "abc", "amount": 12.5}]"#]);
        let split = lex(&[br#"[{"na"#, br#"me": "a"#, br#"bc", "amou"#, br#"nt": 12"#, br#".5}]"#]);
        assert_eq!(whole, split);
    }

    #[test]
    fn escapes_and_raw_utf8_decode() {
        let input = "[\"a\\\"b\\\\c\\nd\u{00e9}\"]";
        let tokens = lex(&[input.as_bytes()]);
        assert_eq!(tokens[1], JsonToken::String("a\"b\\c\nd\u{00e9}".to_owned()));
    }

    #[test]
    fn surrogate_pair_escapes_combine() {
        let tokens = lex(&[br#"["\ud83d\ude00"]"#]);
        assert_eq!(tokens[1], JsonToken::String("\u{1f600}".to_owned()));
    }

    #[test]
    fn lone_surrogate_is_an_error() {
        let mut lexer = JsonLexer::new();
        assert!(lexer.feed(br#"["\ud83d!"]"#).is_err());
    }

    #[test]
    fn line_numbers_follow_newlines() {
        let mut lexer = JsonLexer::new();
        let tokens = lexer.feed(b"[\n{\"a\": 1},\n{\"a\": 2}\n]").expect("lex");
        let second_object_line = tokens
            .iter()
            .filter(|(token, _)| *token == JsonToken::StartObject)
            .map(|(_, line)| *line)
            .nth(1)
            .expect("two objects");
        assert_eq!(second_object_line, 3);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut lexer = JsonLexer::new();
        let _ = lexer.feed(br#"[{"name": "ab"#).expect("partial");
        assert!(lexer.finish().is_err());
    }
}
