//! Conversion from Rust values into [`SqlValue`]s.

use bytes::Bytes;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

use crate::error::TypeError;
use crate::value::SqlValue;

/// A Rust value that can be sent to the server as a parameter.
pub trait ToSql {
    /// Convert the value into a [`SqlValue`].
    fn to_sql(&self) -> Result<SqlValue, TypeError>;
}

macro_rules! to_sql_lossless {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> Result<SqlValue, TypeError> {
                    Ok(SqlValue::$variant((*self).into()))
                }
            }
        )*
    };
}

to_sql_lossless! {
    bool => Bool,
    u8 => TinyInt,
    i8 => SmallInt,
    i16 => SmallInt,
    u16 => Int,
    i32 => Int,
    u32 => BigInt,
    i64 => BigInt,
    f32 => Real,
    f64 => Float,
}

macro_rules! to_sql_checked {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> Result<SqlValue, TypeError> {
                    i64::try_from(*self)
                        .map(SqlValue::BigInt)
                        .map_err(|_| TypeError::out_of_range("i64", self))
                }
            }
        )*
    };
}

to_sql_checked!(u64, isize, usize);

impl ToSql for str {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.to_owned()))
    }
}

impl ToSql for String {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.clone()))
    }
}

impl ToSql for [u8] {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }
}

impl ToSql for Vec<u8> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }
}

impl ToSql for Bytes {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(self.clone()))
    }
}

impl ToSql for NaiveDateTime {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::DateTime(*self))
    }
}

impl ToSql for NaiveDate {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::DateTime(self.and_time(chrono::NaiveTime::MIN)))
    }
}

impl ToSql for DateTime<Local> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::DateTime(self.naive_local()))
    }
}

impl ToSql for DateTime<Utc> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::DateTime(self.with_timezone(&Local).naive_local()))
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(self.clone())
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        match self {
            Some(v) => v.to_sql(),
            None => Ok(SqlValue::Null),
        }
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        (**self).to_sql()
    }
}
