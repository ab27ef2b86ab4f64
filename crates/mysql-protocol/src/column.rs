//! Column definition packets and column type/flag tables.

use bytes::{Buf, Bytes};

use crate::error::ProtocolError;
use crate::wire::WireReadExt;

/// MySQL column types (the `MYSQL_TYPE_*` constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    /// Old DECIMAL.
    Decimal = 0x00,
    /// TINYINT.
    Tiny = 0x01,
    /// SMALLINT.
    Short = 0x02,
    /// INT.
    Long = 0x03,
    /// FLOAT.
    Float = 0x04,
    /// DOUBLE.
    Double = 0x05,
    /// NULL.
    Null = 0x06,
    /// TIMESTAMP.
    Timestamp = 0x07,
    /// BIGINT.
    LongLong = 0x08,
    /// MEDIUMINT.
    Int24 = 0x09,
    /// DATE.
    Date = 0x0A,
    /// TIME.
    Time = 0x0B,
    /// DATETIME.
    DateTime = 0x0C,
    /// YEAR.
    Year = 0x0D,
    /// VARCHAR.
    VarChar = 0x0F,
    /// BIT.
    Bit = 0x10,
    /// JSON.
    Json = 0xF5,
    /// DECIMAL / NUMERIC.
    NewDecimal = 0xF6,
    /// ENUM.
    Enum = 0xF7,
    /// SET.
    Set = 0xF8,
    /// TINYBLOB / TINYTEXT.
    TinyBlob = 0xF9,
    /// MEDIUMBLOB / MEDIUMTEXT.
    MediumBlob = 0xFA,
    /// LONGBLOB / LONGTEXT.
    LongBlob = 0xFB,
    /// BLOB / TEXT.
    Blob = 0xFC,
    /// VARCHAR (result-set form).
    VarString = 0xFD,
    /// CHAR.
    String = 0xFE,
    /// GEOMETRY.
    Geometry = 0xFF,
}

impl ColumnType {
    /// Create a column type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x00 => Self::Decimal,
            0x01 => Self::Tiny,
            0x02 => Self::Short,
            0x03 => Self::Long,
            0x04 => Self::Float,
            0x05 => Self::Double,
            0x06 => Self::Null,
            0x07 => Self::Timestamp,
            0x08 => Self::LongLong,
            0x09 => Self::Int24,
            0x0A => Self::Date,
            0x0B => Self::Time,
            0x0C => Self::DateTime,
            0x0D => Self::Year,
            0x0F => Self::VarChar,
            0x10 => Self::Bit,
            0xF5 => Self::Json,
            0xF6 => Self::NewDecimal,
            0xF7 => Self::Enum,
            0xF8 => Self::Set,
            0xF9 => Self::TinyBlob,
            0xFA => Self::MediumBlob,
            0xFB => Self::LongBlob,
            0xFC => Self::Blob,
            0xFD => Self::VarString,
            0xFE => Self::String,
            0xFF => Self::Geometry,
            other => return Err(ProtocolError::UnknownColumnType(other)),
        })
    }

    /// Whether this type carries binary/large-object payloads.
    #[must_use]
    pub fn is_blob(&self) -> bool {
        matches!(
            self,
            Self::TinyBlob | Self::MediumBlob | Self::LongBlob | Self::Blob | Self::Geometry
        )
    }
}

bitflags::bitflags! {
    /// Column definition flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColumnFlags: u16 {
        /// NOT NULL.
        const NOT_NULL = 1;
        /// Primary key member.
        const PRIMARY_KEY = 1 << 1;
        /// Unique key member.
        const UNIQUE_KEY = 1 << 2;
        /// Non-unique key member.
        const MULTIPLE_KEY = 1 << 3;
        /// BLOB or TEXT.
        const BLOB = 1 << 4;
        /// Unsigned numeric.
        const UNSIGNED = 1 << 5;
        /// ZEROFILL numeric.
        const ZEROFILL = 1 << 6;
        /// Binary collation.
        const BINARY = 1 << 7;
        /// ENUM.
        const ENUM = 1 << 8;
        /// AUTO_INCREMENT.
        const AUTO_INCREMENT = 1 << 9;
        /// TIMESTAMP.
        const TIMESTAMP = 1 << 10;
        /// SET.
        const SET = 1 << 11;
        /// Column has no default value.
        const NO_DEFAULT_VALUE = 1 << 12;
        /// Set to NOW on update.
        const ON_UPDATE_NOW = 1 << 13;
        /// Numeric column.
        const NUM = 1 << 15;
    }
}

/// Character set id for binary collation.
pub const BINARY_CHARSET: u16 = 63;

/// Decoded column definition (result-set metadata).
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    /// Schema the column belongs to.
    pub schema: String,
    /// Result-set table name or alias.
    pub table: String,
    /// Original table name.
    pub org_table: String,
    /// Result-set column name or alias.
    pub name: String,
    /// Original column name.
    pub org_name: String,
    /// Character set / collation id for this column.
    pub charset: u16,
    /// Maximum display length.
    pub length: u32,
    /// Declared type.
    pub column_type: ColumnType,
    /// Column flags.
    pub flags: ColumnFlags,
    /// Decimal places (or fractional-second precision).
    pub decimals: u8,
}

impl ColumnDefinition {
    /// Decode a column definition payload (protocol 4.1 form).
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        let _catalog = lenenc_str(&mut src)?;
        let schema = lenenc_str(&mut src)?;
        let table = lenenc_str(&mut src)?;
        let org_table = lenenc_str(&mut src)?;
        let name = lenenc_str(&mut src)?;
        let org_name = lenenc_str(&mut src)?;

        // Fixed-length trailer: 0x0C, charset, length, type, flags, decimals, filler.
        let _fixed_len = src.get_lenenc_int()?;
        if src.remaining() < 10 {
            return Err(ProtocolError::IncompletePacket {
                expected: 10,
                actual: src.remaining(),
            });
        }
        let charset = src.get_u16_le();
        let length = src.get_u32_le();
        let column_type = ColumnType::from_u8(src.get_u8())?;
        let flags = ColumnFlags::from_bits_truncate(src.get_u16_le());
        let decimals = src.get_u8();

        Ok(Self {
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            length,
            column_type,
            flags,
            decimals,
        })
    }

    /// Whether the column holds unsigned numeric values.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED)
    }

    /// Whether the column uses the binary character set.
    ///
    /// String columns decode per their own collation, not the connection
    /// default; the binary collation means raw bytes.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.charset == BINARY_CHARSET
    }
}

fn lenenc_str(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let bytes = src.get_lenenc_bytes()?.unwrap_or_else(Bytes::new);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::wire::WireWriteExt;

    pub(crate) fn encode_column(name: &str, column_type: ColumnType, flags: ColumnFlags) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_lenenc_bytes(b"def");
        buf.put_lenenc_bytes(b"test");
        buf.put_lenenc_bytes(b"t");
        buf.put_lenenc_bytes(b"t");
        buf.put_lenenc_bytes(name.as_bytes());
        buf.put_lenenc_bytes(name.as_bytes());
        buf.put_lenenc_int(0x0C);
        buf.put_u16_le(45); // utf8mb4
        buf.put_u32_le(255);
        buf.put_u8(column_type as u8);
        buf.put_u16_le(flags.bits());
        buf.put_u8(0);
        buf.put_u16_le(0); // filler
        buf.freeze()
    }

    #[test]
    fn test_decode_column_definition() {
        let bytes = encode_column("id", ColumnType::Long, ColumnFlags::NOT_NULL);
        let col = ColumnDefinition::decode(bytes).unwrap();
        assert_eq!(col.name, "id");
        assert_eq!(col.schema, "test");
        assert_eq!(col.column_type, ColumnType::Long);
        assert!(col.flags.contains(ColumnFlags::NOT_NULL));
        assert!(!col.is_unsigned());
        assert!(!col.is_binary());
    }

    #[test]
    fn test_unknown_column_type() {
        assert!(matches!(
            ColumnType::from_u8(0x42),
            Err(ProtocolError::UnknownColumnType(0x42))
        ));
    }
}
