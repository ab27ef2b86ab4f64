//! Row payload codecs for the text and binary (prepared) protocols.

use bytes::{Buf, BufMut, Bytes};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;

use crate::column::{ColumnDefinition, ColumnType};
use crate::error::ProtocolError;
use crate::value::Value;
use crate::wire::{WireReadExt, WireWriteExt};

/// Header byte of a binary-protocol row packet.
pub const BINARY_ROW_HEADER: u8 = 0x00;

/// Decode a text-protocol row: one length-encoded string per column, parsed
/// per the declared column type.
///
/// Numeric parsing is invariant (`str::parse` / `Decimal::from_str`); the
/// ambient locale never participates.
pub fn decode_text_row(
    columns: &[ColumnDefinition],
    mut payload: impl Buf,
) -> Result<Vec<Value>, ProtocolError> {
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(raw) = payload.get_lenenc_bytes()? else {
            values.push(Value::Null);
            continue;
        };
        values.push(parse_text_value(column, raw)?);
    }
    if payload.has_remaining() {
        return Err(ProtocolError::MalformedRow(format!(
            "{} trailing bytes after {} columns",
            payload.remaining(),
            columns.len()
        )));
    }
    Ok(values)
}

fn parse_text_value(column: &ColumnDefinition, raw: Bytes) -> Result<Value, ProtocolError> {
    let text = || String::from_utf8_lossy(&raw).into_owned();
    let decode_err = |column_type: &'static str| ProtocolError::ValueDecode {
        value: String::from_utf8_lossy(&raw).into_owned(),
        column_type,
    };

    Ok(match column.column_type {
        ColumnType::Tiny
        | ColumnType::Short
        | ColumnType::Long
        | ColumnType::Int24
        | ColumnType::LongLong
        | ColumnType::Year => {
            if column.is_unsigned() {
                Value::UInt(text().parse().map_err(|_| decode_err("unsigned integer"))?)
            } else {
                Value::Int(text().parse().map_err(|_| decode_err("integer"))?)
            }
        }
        ColumnType::Float => Value::Float(text().parse().map_err(|_| decode_err("float"))?),
        ColumnType::Double => Value::Double(text().parse().map_err(|_| decode_err("double"))?),
        ColumnType::Decimal | ColumnType::NewDecimal => {
            let s = text();
            Value::Decimal(s.parse::<Decimal>().map_err(|_| decode_err("decimal"))?)
        }
        ColumnType::Date => {
            let s = text();
            match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Ok(d) => Value::Date(d),
                // Zero dates have no chrono representation; surface the raw text.
                Err(_) => Value::Text(s),
            }
        }
        ColumnType::DateTime | ColumnType::Timestamp => {
            let s = text();
            match NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f") {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => Value::Text(s),
            }
        }
        ColumnType::Time => {
            let s = text();
            match NaiveTime::parse_from_str(&s, "%H:%M:%S%.f") {
                Ok(t) => Value::Time(t),
                // Negative or >24h TIME values fall outside time-of-day.
                Err(_) => Value::Text(s),
            }
        }
        ColumnType::Bit | ColumnType::Geometry => Value::Bytes(raw),
        ColumnType::Null => Value::Null,
        _ => {
            if column.is_binary() {
                Value::Bytes(raw)
            } else {
                Value::Text(text())
            }
        }
    })
}

/// Decode a binary-protocol row: 0x00 header, NULL bitmap (2-bit offset),
/// then fixed- or length-encoded values per column type.
pub fn decode_binary_row(
    columns: &[ColumnDefinition],
    mut payload: impl Buf,
) -> Result<Vec<Value>, ProtocolError> {
    if payload.remaining() < 1 || payload.get_u8() != BINARY_ROW_HEADER {
        return Err(ProtocolError::MalformedRow("missing binary row header".into()));
    }

    let bitmap_len = (columns.len() + 7 + 2) / 8;
    let bitmap = payload.get_exact(bitmap_len)?;

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(Value::Null);
            continue;
        }
        values.push(decode_binary_value(column, &mut payload)?);
    }
    Ok(values)
}

fn decode_binary_value(
    column: &ColumnDefinition,
    src: &mut impl Buf,
) -> Result<Value, ProtocolError> {
    let need = |src: &mut dyn Buf, n: usize| -> Result<(), ProtocolError> {
        if src.remaining() < n {
            Err(ProtocolError::IncompletePacket {
                expected: n,
                actual: src.remaining(),
            })
        } else {
            Ok(())
        }
    };

    Ok(match column.column_type {
        ColumnType::Tiny => {
            need(src, 1)?;
            if column.is_unsigned() {
                Value::UInt(u64::from(src.get_u8()))
            } else {
                Value::Int(i64::from(src.get_i8()))
            }
        }
        ColumnType::Short | ColumnType::Year => {
            need(src, 2)?;
            if column.is_unsigned() {
                Value::UInt(u64::from(src.get_u16_le()))
            } else {
                Value::Int(i64::from(src.get_i16_le()))
            }
        }
        ColumnType::Long | ColumnType::Int24 => {
            need(src, 4)?;
            if column.is_unsigned() {
                Value::UInt(u64::from(src.get_u32_le()))
            } else {
                Value::Int(i64::from(src.get_i32_le()))
            }
        }
        ColumnType::LongLong => {
            need(src, 8)?;
            if column.is_unsigned() {
                Value::UInt(src.get_u64_le())
            } else {
                Value::Int(src.get_i64_le())
            }
        }
        ColumnType::Float => {
            need(src, 4)?;
            Value::Float(src.get_f32_le())
        }
        ColumnType::Double => {
            need(src, 8)?;
            Value::Double(src.get_f64_le())
        }
        ColumnType::Date | ColumnType::DateTime | ColumnType::Timestamp => {
            decode_binary_temporal(column.column_type, src)?
        }
        ColumnType::Time => decode_binary_time(src)?,
        ColumnType::Decimal | ColumnType::NewDecimal => {
            let raw = src.get_lenenc_bytes()?.unwrap_or_else(Bytes::new);
            let s = String::from_utf8_lossy(&raw).into_owned();
            Value::Decimal(s.parse::<Decimal>().map_err(|_| ProtocolError::ValueDecode {
                value: s,
                column_type: "decimal",
            })?)
        }
        ColumnType::Null => Value::Null,
        _ => {
            let raw = src.get_lenenc_bytes()?.unwrap_or_else(Bytes::new);
            if column.is_binary() || column.column_type == ColumnType::Bit {
                Value::Bytes(raw)
            } else {
                Value::Text(String::from_utf8_lossy(&raw).into_owned())
            }
        }
    })
}

fn decode_binary_temporal(
    column_type: ColumnType,
    src: &mut impl Buf,
) -> Result<Value, ProtocolError> {
    let len = src.get_lenenc_int()?.unwrap_or(0);
    let raw = src.get_exact(len as usize)?;
    let mut buf = &raw[..];

    if len == 0 {
        // Zero date; no chrono representation.
        return Ok(Value::Text("0000-00-00".into()));
    }

    let year = i32::from(buf.get_u16_le());
    let month = u32::from(buf.get_u8());
    let day = u32::from(buf.get_u8());
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ProtocolError::MalformedRow("invalid date components".into()))?;

    if column_type == ColumnType::Date || len == 4 {
        return Ok(Value::Date(date));
    }

    let hour = u32::from(buf.get_u8());
    let min = u32::from(buf.get_u8());
    let sec = u32::from(buf.get_u8());
    let micro = if len >= 11 { buf.get_u32_le() } else { 0 };
    let time = NaiveTime::from_hms_micro_opt(hour, min, sec, micro)
        .ok_or_else(|| ProtocolError::MalformedRow("invalid time components".into()))?;
    Ok(Value::DateTime(NaiveDateTime::new(date, time)))
}

fn decode_binary_time(src: &mut impl Buf) -> Result<Value, ProtocolError> {
    let len = src.get_lenenc_int()?.unwrap_or(0);
    let raw = src.get_exact(len as usize)?;
    let mut buf = &raw[..];

    if len == 0 {
        return Ok(Value::Time(NaiveTime::MIN));
    }

    let negative = buf.get_u8() != 0;
    let days = buf.get_u32_le();
    let hour = u32::from(buf.get_u8());
    let min = u32::from(buf.get_u8());
    let sec = u32::from(buf.get_u8());
    let micro = if len >= 12 { buf.get_u32_le() } else { 0 };

    if negative || days > 0 {
        // Outside time-of-day; render the full interval as text.
        let sign = if negative { "-" } else { "" };
        return Ok(Value::Text(format!(
            "{sign}{:02}:{min:02}:{sec:02}",
            days * 24 + hour
        )));
    }
    let time = NaiveTime::from_hms_micro_opt(hour, min, sec, micro)
        .ok_or_else(|| ProtocolError::MalformedRow("invalid time components".into()))?;
    Ok(Value::Time(time))
}

/// Binary-protocol type byte and flags byte for a parameter value.
///
/// The flags byte carries 0x80 for unsigned values.
#[must_use]
pub fn binary_param_type(value: &Value) -> (ColumnType, u8) {
    match value {
        Value::Null => (ColumnType::Null, 0),
        Value::Int(_) => (ColumnType::LongLong, 0),
        Value::UInt(_) => (ColumnType::LongLong, 0x80),
        Value::Float(_) => (ColumnType::Float, 0),
        Value::Double(_) => (ColumnType::Double, 0),
        Value::Decimal(_) => (ColumnType::NewDecimal, 0),
        Value::Text(_) => (ColumnType::VarString, 0),
        Value::Bytes(_) => (ColumnType::Blob, 0),
        Value::Date(_) => (ColumnType::Date, 0),
        Value::Time(_) => (ColumnType::Time, 0),
        Value::DateTime(_) => (ColumnType::DateTime, 0),
    }
}

/// Encode a non-NULL parameter value in the binary protocol.
///
/// NULL parameters are carried solely by the execute packet's NULL bitmap
/// and contribute no value bytes.
pub fn encode_binary_value(value: &Value, dst: &mut impl BufMut) {
    match value {
        Value::Null => {}
        Value::Int(v) => dst.put_i64_le(*v),
        Value::UInt(v) => dst.put_u64_le(*v),
        Value::Float(v) => dst.put_f32_le(*v),
        Value::Double(v) => dst.put_f64_le(*v),
        Value::Decimal(v) => dst.put_lenenc_bytes(v.to_string().as_bytes()),
        Value::Text(v) => dst.put_lenenc_bytes(v.as_bytes()),
        Value::Bytes(v) => dst.put_lenenc_bytes(v),
        Value::Date(d) => {
            use chrono::Datelike;
            dst.put_u8(4);
            dst.put_u16_le(d.year() as u16);
            dst.put_u8(d.month() as u8);
            dst.put_u8(d.day() as u8);
        }
        Value::Time(t) => {
            dst.put_u8(12);
            dst.put_u8(0); // sign
            dst.put_u32_le(0); // days
            dst.put_u8(t.hour() as u8);
            dst.put_u8(t.minute() as u8);
            dst.put_u8(t.second() as u8);
            dst.put_u32_le(t.nanosecond() / 1000);
        }
        Value::DateTime(dt) => {
            use chrono::Datelike;
            dst.put_u8(11);
            dst.put_u16_le(dt.year() as u16);
            dst.put_u8(dt.month() as u8);
            dst.put_u8(dt.day() as u8);
            dst.put_u8(dt.hour() as u8);
            dst.put_u8(dt.minute() as u8);
            dst.put_u8(dt.second() as u8);
            dst.put_u32_le(dt.nanosecond() / 1000);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::column::tests::encode_column;
    use crate::column::ColumnFlags;

    fn column(name: &str, column_type: ColumnType, flags: ColumnFlags) -> ColumnDefinition {
        ColumnDefinition::decode(encode_column(name, column_type, flags)).unwrap()
    }

    #[test]
    fn test_text_row_ints_and_null() {
        let columns = vec![
            column("a", ColumnType::Long, ColumnFlags::empty()),
            column("b", ColumnType::VarString, ColumnFlags::empty()),
        ];
        let mut payload = BytesMut::new();
        payload.put_lenenc_bytes(b"-42");
        payload.put_u8(crate::wire::NULL_MARKER);

        let row = decode_text_row(&columns, payload.freeze()).unwrap();
        assert_eq!(row, vec![Value::Int(-42), Value::Null]);
    }

    #[test]
    fn test_text_row_decimal_is_invariant() {
        let columns = vec![column("d", ColumnType::NewDecimal, ColumnFlags::empty())];
        let mut payload = BytesMut::new();
        payload.put_lenenc_bytes(b"2.3");
        let row = decode_text_row(&columns, payload.freeze()).unwrap();
        assert_eq!(row[0].as_decimal().unwrap().to_string(), "2.3");
    }

    #[test]
    fn test_text_row_unsigned() {
        let columns = vec![column("u", ColumnType::LongLong, ColumnFlags::UNSIGNED)];
        let mut payload = BytesMut::new();
        payload.put_lenenc_bytes(b"18446744073709551615");
        let row = decode_text_row(&columns, payload.freeze()).unwrap();
        assert_eq!(row[0], Value::UInt(u64::MAX));
    }

    #[test]
    fn test_text_row_trailing_garbage() {
        let columns = vec![column("a", ColumnType::Long, ColumnFlags::empty())];
        let mut payload = BytesMut::new();
        payload.put_lenenc_bytes(b"1");
        payload.put_lenenc_bytes(b"extra");
        assert!(decode_text_row(&columns, payload.freeze()).is_err());
    }

    #[test]
    fn test_binary_row_null_bitmap() {
        let columns = vec![
            column("a", ColumnType::Long, ColumnFlags::empty()),
            column("b", ColumnType::Long, ColumnFlags::empty()),
            column("c", ColumnType::VarString, ColumnFlags::empty()),
        ];
        let mut payload = BytesMut::new();
        payload.put_u8(BINARY_ROW_HEADER);
        // Column 1 (bit 3 of the bitmap) is NULL.
        payload.put_u8(0b0000_1000);
        payload.put_i32_le(7);
        payload.put_lenenc_bytes(b"hi");

        let row = decode_binary_row(&columns, payload.freeze()).unwrap();
        assert_eq!(
            row,
            vec![Value::Int(7), Value::Null, Value::Text("hi".into())]
        );
    }

    #[test]
    fn test_binary_datetime_roundtrip() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_micro_opt(10, 30, 0, 250)
            .unwrap();
        let mut buf = BytesMut::new();
        encode_binary_value(&Value::DateTime(dt), &mut buf);

        let columns = vec![column("ts", ColumnType::DateTime, ColumnFlags::empty())];
        let mut payload = BytesMut::new();
        payload.put_u8(BINARY_ROW_HEADER);
        payload.put_u8(0);
        payload.extend_from_slice(&buf);

        let row = decode_binary_row(&columns, payload.freeze()).unwrap();
        assert_eq!(row[0], Value::DateTime(dt));
    }

    #[test]
    fn test_binary_param_types() {
        assert_eq!(binary_param_type(&Value::Int(1)).0, ColumnType::LongLong);
        assert_eq!(binary_param_type(&Value::UInt(1)).1, 0x80);
        assert_eq!(
            binary_param_type(&Value::Text(String::new())).0,
            ColumnType::VarString
        );
    }
}
