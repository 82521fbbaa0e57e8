// SPDX-License-Identifier: Apache-2.0

//! Typed column access for the text codecs.
//!
//! A [`ColumnWriter`] wraps the arrow builder for one schema field and
//! parses text tokens into it; a [`ColumnReader`] wraps one column of a
//! record batch and renders values back out. Parse failures carry the
//! one-based input line they occurred on.

use arrow_array::builder::{
    ArrayBuilder, BooleanBuilder, Date32Builder, Decimal128Builder, Float64Builder, Int64Builder,
    StringBuilder, TimestampMillisecondBuilder, UInt64Builder,
};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float64Array, Int64Array,
    StringArray, TimestampMillisecondArray, UInt64Array,
};
use arrow_schema::{DataType, Field, TimeUnit};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use strata_pipeline::Error;

/// Days from 0001-01-01 (CE) to the unix epoch, per proleptic Gregorian.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn invalid_value(kind: &str, text: &str, line: u64) -> Error {
    Error::DataCorruption {
        message: format!("Invalid {kind} value [{text}]"),
        line: Some(line),
        column: None,
    }
}

fn out_of_range(kind: &str, line: u64) -> Error {
    Error::DataCorruption {
        message: format!("Value out of range for {kind}"),
        line: Some(line),
        column: None,
    }
}

fn parse_i64(text: &str, line: u64) -> Result<i64, Error> {
    match text.parse::<i64>() {
        Ok(value) => Ok(value),
        Err(_) => match text.parse::<i128>() {
            Ok(_) => Err(out_of_range("64-bit signed integer", line)),
            Err(_) => Err(invalid_value("integer", text, line)),
        },
    }
}

fn parse_u64(text: &str, line: u64) -> Result<u64, Error> {
    match text.parse::<u64>() {
        Ok(value) => Ok(value),
        Err(_) => match text.parse::<i128>() {
            Ok(_) => Err(out_of_range("64-bit unsigned integer", line)),
            Err(_) => Err(invalid_value("unsigned integer", text, line)),
        },
    }
}

fn parse_f64(text: &str, line: u64) -> Result<f64, Error> {
    text.parse::<f64>()
        .map_err(|_| invalid_value("float", text, line))
}

fn parse_bool(text: &str, line: u64) -> Result<bool, Error> {
    if text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(invalid_value("boolean", text, line))
    }
}

/// Parses a decimal literal into a scale-12 mantissa.
fn parse_decimal(text: &str, scale: u32, line: u64) -> Result<i128, Error> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (digits, ""),
    };

    let all_digits =
        |part: &str| !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_digit());
    if !(all_digits(int_part) || (int_part.is_empty() && all_digits(frac_part)))
        || (!frac_part.is_empty() && !all_digits(frac_part))
    {
        return Err(invalid_value("decimal", text, line));
    }

    if frac_part.len() as u32 > scale {
        return Err(out_of_range("decimal scale", line));
    }

    let mut mantissa: i128 = 0;
    for byte in int_part.bytes().chain(frac_part.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|value| value.checked_add(i128::from(byte - b'0')))
            .ok_or_else(|| out_of_range("decimal precision", line))?;
    }
    for _ in frac_part.len() as u32..scale {
        mantissa = mantissa
            .checked_mul(10)
            .ok_or_else(|| out_of_range("decimal precision", line))?;
    }

    Ok(if negative { -mantissa } else { mantissa })
}

fn parse_date(text: &str, line: u64) -> Result<i32, Error> {
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| invalid_value("date", text, line))?;
    Ok(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

fn parse_datetime(text: &str, line: u64) -> Result<i64, Error> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Ok(datetime.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|datetime| datetime.and_utc().timestamp_millis())
        .map_err(|_| invalid_value("datetime", text, line))
}

/// The arrow builder for one schema field, with text parsing.
pub enum ColumnWriter {
    /// Boolean column.
    Boolean(BooleanBuilder),
    /// Signed 64-bit integer column.
    Int64(Int64Builder),
    /// Unsigned 64-bit integer column, accepted on externally supplied
    /// arrow schemas.
    UInt64(UInt64Builder),
    /// 64-bit float column.
    Float64(Float64Builder),
    /// Fixed-scale decimal column; carries the declared scale.
    Decimal(Decimal128Builder, u32),
    /// UTF-8 string column.
    String(StringBuilder),
    /// Date column, days since the unix epoch.
    Date(Date32Builder),
    /// Millisecond timestamp column.
    Timestamp(TimestampMillisecondBuilder),
}

impl ColumnWriter {
    /// Creates the writer for an arrow field.
    ///
    /// # Errors
    ///
    /// Returns a startup error for arrow types outside the platform's
    /// decode surface.
    pub fn for_field(field: &Field) -> Result<ColumnWriter, Error> {
        match field.data_type() {
            DataType::Boolean => Ok(ColumnWriter::Boolean(BooleanBuilder::new())),
            DataType::Int64 => Ok(ColumnWriter::Int64(Int64Builder::new())),
            DataType::UInt64 => Ok(ColumnWriter::UInt64(UInt64Builder::new())),
            DataType::Float64 => Ok(ColumnWriter::Float64(Float64Builder::new())),
            DataType::Decimal128(precision, scale) => {
                let builder = Decimal128Builder::new()
                    .with_precision_and_scale(*precision, *scale)
                    .map_err(|error| {
                        Error::startup(format!(
                            "Invalid decimal layout for field {}: {error}",
                            field.name()
                        ))
                    })?;
                Ok(ColumnWriter::Decimal(builder, *scale as u32))
            }
            DataType::Utf8 => Ok(ColumnWriter::String(StringBuilder::new())),
            DataType::Date32 => Ok(ColumnWriter::Date(Date32Builder::new())),
            DataType::Timestamp(TimeUnit::Millisecond, None) => {
                Ok(ColumnWriter::Timestamp(TimestampMillisecondBuilder::new()))
            }
            other => Err(Error::startup(format!(
                "Field {} has unsupported decode type {other}",
                field.name()
            ))),
        }
    }

    /// Appends a null.
    pub fn append_null(&mut self) {
        match self {
            ColumnWriter::Boolean(builder) => builder.append_null(),
            ColumnWriter::Int64(builder) => builder.append_null(),
            ColumnWriter::UInt64(builder) => builder.append_null(),
            ColumnWriter::Float64(builder) => builder.append_null(),
            ColumnWriter::Decimal(builder, _) => builder.append_null(),
            ColumnWriter::String(builder) => builder.append_null(),
            ColumnWriter::Date(builder) => builder.append_null(),
            ColumnWriter::Timestamp(builder) => builder.append_null(),
        }
    }

    /// Appends a boolean value; only boolean columns accept one.
    ///
    /// # Errors
    ///
    /// Returns a corruption error for every other column type.
    pub fn append_bool(&mut self, value: bool, line: u64) -> Result<(), Error> {
        match self {
            ColumnWriter::Boolean(builder) => {
                builder.append_value(value);
                Ok(())
            }
            _ => Err(invalid_value(
                "boolean",
                if value { "true" } else { "false" },
                line,
            )),
        }
    }

    /// Parses a text token and appends the value.
    ///
    /// # Errors
    ///
    /// Returns a corruption error, carrying `line`, when the token does not
    /// parse or falls outside the column's value range.
    pub fn append_text(&mut self, text: &str, line: u64) -> Result<(), Error> {
        match self {
            ColumnWriter::Boolean(builder) => builder.append_value(parse_bool(text, line)?),
            ColumnWriter::Int64(builder) => builder.append_value(parse_i64(text, line)?),
            ColumnWriter::UInt64(builder) => builder.append_value(parse_u64(text, line)?),
            ColumnWriter::Float64(builder) => builder.append_value(parse_f64(text, line)?),
            ColumnWriter::Decimal(builder, scale) => {
                let scale = *scale;
                builder.append_value(parse_decimal(text, scale, line)?);
            }
            ColumnWriter::String(builder) => builder.append_value(text),
            ColumnWriter::Date(builder) => builder.append_value(parse_date(text, line)?),
            ColumnWriter::Timestamp(builder) => builder.append_value(parse_datetime(text, line)?),
        }
        Ok(())
    }

    /// Number of values appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ColumnWriter::Boolean(builder) => builder.len(),
            ColumnWriter::Int64(builder) => builder.len(),
            ColumnWriter::UInt64(builder) => builder.len(),
            ColumnWriter::Float64(builder) => builder.len(),
            ColumnWriter::Decimal(builder, _) => builder.len(),
            ColumnWriter::String(builder) => builder.len(),
            ColumnWriter::Date(builder) => builder.len(),
            ColumnWriter::Timestamp(builder) => builder.len(),
        }
    }

    /// True if no values were appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finishes the current batch, leaving the writer empty for the next.
    #[must_use]
    pub fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnWriter::Boolean(builder) => Arc::new(builder.finish()),
            ColumnWriter::Int64(builder) => Arc::new(builder.finish()),
            ColumnWriter::UInt64(builder) => Arc::new(builder.finish()),
            ColumnWriter::Float64(builder) => Arc::new(builder.finish()),
            ColumnWriter::Decimal(builder, _) => Arc::new(builder.finish()),
            ColumnWriter::String(builder) => Arc::new(builder.finish()),
            ColumnWriter::Date(builder) => Arc::new(builder.finish()),
            ColumnWriter::Timestamp(builder) => Arc::new(builder.finish()),
        }
    }
}

/// Escapes a string into a JSON string literal, quotes included.
pub(crate) fn write_json_string(text: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for ch in text.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            ch if (ch as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", ch as u32).as_bytes());
            }
            ch => {
                let mut encoded = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
            }
        }
    }
    out.push(b'"');
}

/// A typed view over one column of a record batch, for encoders.
pub enum ColumnReader {
    /// Boolean column.
    Boolean(BooleanArray),
    /// Signed 64-bit integer column.
    Int64(Int64Array),
    /// Unsigned 64-bit integer column.
    UInt64(UInt64Array),
    /// 64-bit float column.
    Float64(Float64Array),
    /// Fixed-scale decimal column.
    Decimal(Decimal128Array),
    /// UTF-8 string column.
    String(StringArray),
    /// Date column.
    Date(Date32Array),
    /// Millisecond timestamp column.
    Timestamp(TimestampMillisecondArray),
}

impl ColumnReader {
    /// Creates the reader for one batch column.
    ///
    /// # Errors
    ///
    /// Returns the structured not-supported error for dictionary-encoded
    /// columns and for arrow types outside the platform surface.
    pub fn for_column(column: &ArrayRef, field_name: &str) -> Result<ColumnReader, Error> {
        fn downcast<T: Clone + 'static>(column: &ArrayRef, field_name: &str) -> Result<T, Error> {
            column
                .as_any()
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| {
                    Error::internal(format!("Column {field_name} does not match its data type"))
                })
        }

        match column.data_type() {
            DataType::Dictionary(_, _) => Err(Error::corruption(format!(
                "Dictionary encoding is not supported by text codecs (field {field_name})"
            ))),
            DataType::Boolean => Ok(ColumnReader::Boolean(downcast(column, field_name)?)),
            DataType::Int64 => Ok(ColumnReader::Int64(downcast(column, field_name)?)),
            DataType::UInt64 => Ok(ColumnReader::UInt64(downcast(column, field_name)?)),
            DataType::Float64 => Ok(ColumnReader::Float64(downcast(column, field_name)?)),
            DataType::Decimal128(_, _) => Ok(ColumnReader::Decimal(downcast(column, field_name)?)),
            DataType::Utf8 => Ok(ColumnReader::String(downcast(column, field_name)?)),
            DataType::Date32 => Ok(ColumnReader::Date(downcast(column, field_name)?)),
            DataType::Timestamp(TimeUnit::Millisecond, None) => {
                Ok(ColumnReader::Timestamp(downcast(column, field_name)?))
            }
            other => Err(Error::corruption(format!(
                "Field {field_name} has unsupported encode type {other}"
            ))),
        }
    }

    /// True if the value at `row` is null.
    #[must_use]
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnReader::Boolean(array) => array.is_null(row),
            ColumnReader::Int64(array) => array.is_null(row),
            ColumnReader::UInt64(array) => array.is_null(row),
            ColumnReader::Float64(array) => array.is_null(row),
            ColumnReader::Decimal(array) => array.is_null(row),
            ColumnReader::String(array) => array.is_null(row),
            ColumnReader::Date(array) => array.is_null(row),
            ColumnReader::Timestamp(array) => array.is_null(row),
        }
    }

    /// The string value at `row`; only valid for string columns.
    #[must_use]
    pub fn string_value(&self, row: usize) -> Option<&str> {
        match self {
            ColumnReader::String(array) => Some(array.value(row)),
            _ => None,
        }
    }

    /// Renders the value at `row` as a JSON value.
    pub fn render_json(&self, row: usize, out: &mut Vec<u8>) {
        if self.is_null(row) {
            out.extend_from_slice(b"null");
            return;
        }
        match self {
            ColumnReader::Boolean(array) => {
                out.extend_from_slice(if array.value(row) { b"true" } else { b"false" });
            }
            ColumnReader::Int64(array) => {
                let mut buffer = itoa::Buffer::new();
                out.extend_from_slice(buffer.format(array.value(row)).as_bytes());
            }
            ColumnReader::UInt64(array) => {
                let mut buffer = itoa::Buffer::new();
                out.extend_from_slice(buffer.format(array.value(row)).as_bytes());
            }
            ColumnReader::Float64(array) => {
                let value = array.value(row);
                if value.is_finite() {
                    let mut buffer = ryu::Buffer::new();
                    out.extend_from_slice(buffer.format(value).as_bytes());
                } else {
                    // NaN and infinities have no JSON literal.
                    out.extend_from_slice(b"null");
                }
            }
            ColumnReader::Decimal(array) => {
                out.extend_from_slice(array.value_as_string(row).as_bytes());
            }
            ColumnReader::String(array) => write_json_string(array.value(row), out),
            ColumnReader::Date(array) => {
                write_json_string(&render_date(array.value(row)), out);
            }
            ColumnReader::Timestamp(array) => {
                write_json_string(&render_datetime(array.value(row)), out);
            }
        }
    }

    /// Renders the value at `row` as an unquoted CSV token; the caller
    /// handles nulls and string quoting.
    pub fn render_csv_plain(&self, row: usize, out: &mut Vec<u8>) {
        match self {
            ColumnReader::Boolean(array) => {
                out.extend_from_slice(if array.value(row) { b"true" } else { b"false" });
            }
            ColumnReader::Int64(array) => {
                let mut buffer = itoa::Buffer::new();
                out.extend_from_slice(buffer.format(array.value(row)).as_bytes());
            }
            ColumnReader::UInt64(array) => {
                let mut buffer = itoa::Buffer::new();
                out.extend_from_slice(buffer.format(array.value(row)).as_bytes());
            }
            ColumnReader::Float64(array) => {
                let mut buffer = ryu::Buffer::new();
                out.extend_from_slice(buffer.format(array.value(row)).as_bytes());
            }
            ColumnReader::Decimal(array) => {
                out.extend_from_slice(array.value_as_string(row).as_bytes());
            }
            ColumnReader::String(_) => {
                debug_assert!(false, "string columns are rendered by the CSV writer");
            }
            ColumnReader::Date(array) => {
                out.extend_from_slice(render_date(array.value(row)).as_bytes());
            }
            ColumnReader::Timestamp(array) => {
                out.extend_from_slice(render_datetime(array.value(row)).as_bytes());
            }
        }
    }
}

fn render_date(days: i32) -> String {
    match NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => String::from("0000-00-00"),
    }
}

fn render_datetime(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(datetime) => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => String::from("0000-00-00T00:00:00Z"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_overflow_is_a_range_error() {
        let error = parse_i64("9223372036854775808", 3).expect_err("out of range");
        assert!(error.to_string().contains("Value out of range"));
        assert!(error.to_string().contains("line 3"));
    }

    #[test]
    fn unsigned_range_covers_zero_to_max() {
        assert_eq!(parse_u64("18446744073709551615", 1).expect("max"), u64::MAX);
        assert!(parse_u64("18446744073709551616", 1).is_err());
        assert!(parse_u64("-1", 1).is_err());
    }

    #[test]
    fn decimal_scales_to_twelve_places() {
        let mantissa = parse_decimal("1.5", 12, 1).expect("valid decimal");
        assert_eq!(mantissa, 1_500_000_000_000);
        assert_eq!(parse_decimal("-0.25", 12, 1).expect("negative"), -250_000_000_000);
        assert!(parse_decimal("1.1234567890123", 12, 1).is_err());
        assert!(parse_decimal("abc", 12, 1).is_err());
    }

    #[test]
    fn dates_round_trip_through_epoch_days() {
        let days = parse_date("2024-06-28", 1).expect("valid date");
        assert_eq!(render_date(days), "2024-06-28");
        assert_eq!(parse_date("1970-01-01", 1).expect("epoch"), 0);
    }

    #[test]
    fn datetimes_accept_rfc3339_and_naive_forms() {
        let explicit = parse_datetime("2024-06-28T12:30:00.250Z", 1).expect("rfc3339");
        let naive = parse_datetime("2024-06-28T12:30:00.250", 1).expect("naive");
        assert_eq!(explicit, naive);
        assert_eq!(render_datetime(explicit), "2024-06-28T12:30:00.250Z");
    }

    #[test]
    fn json_strings_escape_specials() {
        let mut out = Vec::new();
        write_json_string("a\"b\\c\nd", &mut out);
        assert_eq!(out, br#""a\"b\\c\nd""#);
    }
}
