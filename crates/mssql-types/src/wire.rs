//! Wire type tags shared with the transport library and the server catalogs.
//!
//! The numeric codes are the DB-Library `SYB*` constants. Procedure catalogs
//! report the same codes (SQL Server through `sys.all_parameters`, Sybase
//! through `syscolumns`), so one enum serves columns, RPC parameters and
//! cached parameter descriptors.

use std::fmt;

/// A column or parameter type as the transport reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// `IMAGE` (34).
    Image,
    /// `TEXT` (35).
    Text,
    /// `UNIQUEIDENTIFIER` (36).
    UniqueIdentifier,
    /// Legacy `VARBINARY` (37).
    VarBinary,
    /// Legacy `VARCHAR` (39).
    VarChar,
    /// `DATE` (40).
    Date,
    /// `TIME` (41).
    Time,
    /// `DATETIME2` (42).
    DateTime2,
    /// `DATETIMEOFFSET` (43).
    DateTimeOffset,
    /// Legacy `BINARY` (45).
    Binary,
    /// Legacy `CHAR` (47).
    Char,
    /// `TINYINT` (48), unsigned.
    TinyInt,
    /// `BIT` (50).
    Bit,
    /// `SMALLINT` (52).
    SmallInt,
    /// `INT` (56).
    Int,
    /// `SMALLDATETIME` (58).
    SmallDateTime,
    /// `REAL` (59).
    Real,
    /// `MONEY` (60).
    Money,
    /// `DATETIME` (61).
    DateTime,
    /// `FLOAT` (62).
    Float,
    /// Legacy `NVARCHAR` (103).
    NVarChar,
    /// Nullable `BIT` (104).
    BitN,
    /// `DECIMAL` (106).
    Decimal,
    /// `NUMERIC` (108).
    Numeric,
    /// `SMALLMONEY` (122).
    SmallMoney,
    /// `BIGINT` (127).
    BigInt,
    /// `VARBINARY` (165).
    XVarBinary,
    /// `VARCHAR` (167).
    XVarChar,
    /// `CHAR` (175).
    XChar,
    /// `NVARCHAR` (231).
    XNVarChar,
    /// `NCHAR` (239).
    XNChar,
    /// `XML` (241).
    Xml,
    /// Any code this crate has no dedicated handling for; treated as text.
    Other(i32),
}

impl WireType {
    /// Map a numeric type code to a wire type.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            34 => Self::Image,
            35 => Self::Text,
            36 => Self::UniqueIdentifier,
            37 => Self::VarBinary,
            39 => Self::VarChar,
            40 => Self::Date,
            41 => Self::Time,
            42 => Self::DateTime2,
            43 => Self::DateTimeOffset,
            45 => Self::Binary,
            47 => Self::Char,
            48 => Self::TinyInt,
            50 => Self::Bit,
            52 => Self::SmallInt,
            56 => Self::Int,
            58 => Self::SmallDateTime,
            59 => Self::Real,
            60 => Self::Money,
            61 => Self::DateTime,
            62 => Self::Float,
            103 => Self::NVarChar,
            104 => Self::BitN,
            106 => Self::Decimal,
            108 => Self::Numeric,
            122 => Self::SmallMoney,
            127 => Self::BigInt,
            165 => Self::XVarBinary,
            167 => Self::XVarChar,
            175 => Self::XChar,
            231 => Self::XNVarChar,
            239 => Self::XNChar,
            241 => Self::Xml,
            other => Self::Other(other),
        }
    }

    /// The numeric code of this type.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Image => 34,
            Self::Text => 35,
            Self::UniqueIdentifier => 36,
            Self::VarBinary => 37,
            Self::VarChar => 39,
            Self::Date => 40,
            Self::Time => 41,
            Self::DateTime2 => 42,
            Self::DateTimeOffset => 43,
            Self::Binary => 45,
            Self::Char => 47,
            Self::TinyInt => 48,
            Self::Bit => 50,
            Self::SmallInt => 52,
            Self::Int => 56,
            Self::SmallDateTime => 58,
            Self::Real => 59,
            Self::Money => 60,
            Self::DateTime => 61,
            Self::Float => 62,
            Self::NVarChar => 103,
            Self::BitN => 104,
            Self::Decimal => 106,
            Self::Numeric => 108,
            Self::SmallMoney => 122,
            Self::BigInt => 127,
            Self::XVarBinary => 165,
            Self::XVarChar => 167,
            Self::XChar => 175,
            Self::XNVarChar => 231,
            Self::XNChar => 239,
            Self::Xml => 241,
            Self::Other(code) => code,
        }
    }

    /// The type a result column of this type is bound as.
    ///
    /// `DECIMAL`/`NUMERIC` are read as 8-byte floats and `UNIQUEIDENTIFIER`
    /// as 36 characters of text.
    #[must_use]
    pub fn bind_type(self) -> Self {
        match self {
            Self::Decimal | Self::Numeric => Self::Float,
            Self::UniqueIdentifier => Self::Char,
            other => other,
        }
    }

    /// The type a procedure parameter of this type is bound as when its code
    /// comes from the parameter catalog.
    ///
    /// The newer date/time types and `UNIQUEIDENTIFIER` travel as text.
    #[must_use]
    pub fn catalog_normalized(self) -> Self {
        match self {
            Self::UniqueIdentifier
            | Self::Date
            | Self::Time
            | Self::DateTime2
            | Self::DateTimeOffset => Self::VarChar,
            other => other,
        }
    }

    /// Whether values of this type are raw bytes.
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::Image | Self::Binary | Self::VarBinary | Self::XVarBinary
        )
    }

    /// Whether this is a national (wide) character type.
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(self, Self::XNVarChar | Self::XNChar)
    }

    /// Whether a column of this type with the given reported size is a
    /// `(max)` column that must be fetched with a variable-length binding.
    #[must_use]
    pub fn is_max_size(self, size: i32) -> bool {
        match self {
            Self::XVarChar | Self::XNVarChar | Self::Xml | Self::VarChar | Self::Text => {
                size == 2_147_483_647
            }
            Self::XVarBinary | Self::VarBinary | Self::Binary => size == 1_073_741_823,
            Self::Image => size == 64_512,
            _ => false,
        }
    }

    /// Human readable type name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Text => "TEXT",
            Self::UniqueIdentifier => "UNIQUEIDENTIFIER",
            Self::VarBinary | Self::XVarBinary => "VARBINARY",
            Self::VarChar | Self::XVarChar => "VARCHAR",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime2 => "DATETIME2",
            Self::DateTimeOffset => "DATETIMEOFFSET",
            Self::Binary => "BINARY",
            Self::Char | Self::XChar => "CHAR",
            Self::TinyInt => "TINYINT",
            Self::Bit | Self::BitN => "BIT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::SmallDateTime => "SMALLDATETIME",
            Self::Real => "REAL",
            Self::Money => "MONEY",
            Self::DateTime => "DATETIME",
            Self::Float => "FLOAT",
            Self::NVarChar | Self::XNVarChar => "NVARCHAR",
            Self::Decimal => "DECIMAL",
            Self::Numeric => "NUMERIC",
            Self::SmallMoney => "SMALLMONEY",
            Self::BigInt => "BIGINT",
            Self::XNChar => "NCHAR",
            Self::Xml => "XML",
            Self::Other(_) => "UNKNOWN",
        }
    }
}

impl From<i32> for WireType {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "UNKNOWN({code})"),
            other => write!(f, "{}({})", other.name(), other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in 0..300 {
            assert_eq!(WireType::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_bind_type() {
        assert_eq!(WireType::Decimal.bind_type(), WireType::Float);
        assert_eq!(WireType::Numeric.bind_type(), WireType::Float);
        assert_eq!(WireType::UniqueIdentifier.bind_type(), WireType::Char);
        assert_eq!(WireType::Int.bind_type(), WireType::Int);
    }

    #[test]
    fn test_catalog_normalized() {
        for code in [0x24, 0x28, 0x29, 0x2A, 0x2B] {
            assert_eq!(
                WireType::from_code(code).catalog_normalized(),
                WireType::VarChar
            );
        }
        assert_eq!(
            WireType::XNVarChar.catalog_normalized(),
            WireType::XNVarChar
        );
    }

    #[test]
    fn test_max_size_detection() {
        assert!(WireType::XVarChar.is_max_size(2_147_483_647));
        assert!(WireType::Xml.is_max_size(2_147_483_647));
        assert!(WireType::XVarBinary.is_max_size(1_073_741_823));
        assert!(WireType::Image.is_max_size(64_512));
        assert!(!WireType::XVarChar.is_max_size(50));
        assert!(!WireType::Int.is_max_size(2_147_483_647));
    }

    #[test]
    fn test_display() {
        assert_eq!(WireType::Int.to_string(), "INT(56)");
        assert_eq!(WireType::Other(99).to_string(), "UNKNOWN(99)");
    }
}
