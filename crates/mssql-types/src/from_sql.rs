//! Conversion from [`SqlValue`]s into Rust values.
//!
//! Conversions are lenient in the same directions the server is: integers
//! narrow with range checks, integral floats convert to integers, numbers
//! parse from text, and anything but binary data renders into a `String`.

use bytes::Bytes;
use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};

use crate::error::TypeError;
use crate::value::SqlValue;

/// A Rust type that can be read from a [`SqlValue`].
pub trait FromSql: Sized {
    /// Convert a non-NULL value. NULL yields [`TypeError::UnexpectedNull`].
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError>;

    /// Convert a value that may be NULL.
    fn from_sql_nullable(value: &SqlValue) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_sql(value).map(Some)
        }
    }
}

fn integral(value: &SqlValue, target: &'static str) -> Result<i64, TypeError> {
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    match value {
        SqlValue::Null => Err(TypeError::UnexpectedNull(target)),
        SqlValue::Real(_) | SqlValue::Float(_) => {
            let f = value.as_f64().unwrap_or(f64::NAN);
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                Ok(f as i64)
            } else {
                Err(TypeError::out_of_range(target, f))
            }
        }
        SqlValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| TypeError::mismatch(target, format!("string {s:?}"))),
        other => Err(TypeError::mismatch(target, other.type_name())),
    }
}

macro_rules! from_sql_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromSql for $ty {
                fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
                    let v = integral(value, stringify!($ty))?;
                    <$ty>::try_from(v).map_err(|_| TypeError::out_of_range(stringify!($ty), v))
                }
            }
        )*
    };
}

from_sql_int!(u8, i8, i16, u16, i32, u32, i64, u64, isize, usize);

fn floating(value: &SqlValue, target: &'static str) -> Result<f64, TypeError> {
    if let Some(v) = value.as_f64() {
        return Ok(v);
    }
    match value {
        SqlValue::Null => Err(TypeError::UnexpectedNull(target)),
        SqlValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| TypeError::mismatch(target, format!("string {s:?}"))),
        other => Err(TypeError::mismatch(target, other.type_name())),
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        floating(value, "f64")
    }
}

impl FromSql for f32 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        if let SqlValue::Real(v) = value {
            return Ok(*v);
        }
        let v = floating(value, "f32")?;
        if v.is_finite() && v.abs() > f64::from(f32::MAX) {
            return Err(TypeError::out_of_range("f32", v));
        }
        Ok(v as f32)
    }
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            SqlValue::Null => Err(TypeError::UnexpectedNull("bool")),
            SqlValue::String(s) => match s.trim() {
                "1" => Ok(true),
                "0" => Ok(false),
                t if t.eq_ignore_ascii_case("true") => Ok(true),
                t if t.eq_ignore_ascii_case("false") => Ok(false),
                _ => Err(TypeError::mismatch("bool", format!("string {s:?}"))),
            },
            other => match other.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                Some(v) => Err(TypeError::out_of_range("bool", v)),
                None => Err(TypeError::mismatch("bool", other.type_name())),
            },
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(s) => Ok(s.clone()),
            SqlValue::Null => Err(TypeError::UnexpectedNull("String")),
            SqlValue::Binary(b) => String::from_utf8(b.to_vec())
                .map_err(|_| TypeError::mismatch("String", "non UTF-8 binary data")),
            other => Ok(other.to_string()),
        }
    }
}

impl FromSql for Vec<u8> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Bytes::from_sql(value).map(|b| b.to_vec())
    }
}

impl FromSql for Bytes {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(b) => Ok(b.clone()),
            SqlValue::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            SqlValue::Null => Err(TypeError::UnexpectedNull("Bytes")),
            other => Err(TypeError::mismatch("Bytes", other.type_name())),
        }
    }
}

impl FromSql for NaiveDateTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTime(dt) => Ok(*dt),
            SqlValue::Null => Err(TypeError::UnexpectedNull("NaiveDateTime")),
            SqlValue::String(s) => parse_datetime(s),
            other => Err(TypeError::mismatch("NaiveDateTime", other.type_name())),
        }
    }
}

impl FromSql for DateTime<Local> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        let naive = NaiveDateTime::from_sql(value)?;
        resolve_local(naive)
    }
}

impl FromSql for DateTime<Utc> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        DateTime::<Local>::from_sql(value).map(|dt| dt.with_timezone(&Utc))
    }
}

impl FromSql for SqlValue {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        T::from_sql_nullable(value)
    }
}

/// Attach the local time zone to a wall-clock value.
///
/// See [`resolve_in`] for how DST edges are handled.
pub fn resolve_local(naive: NaiveDateTime) -> Result<DateTime<Local>, TypeError> {
    resolve_in(&Local, naive)
}

/// Attach a time zone to a wall-clock value.
///
/// Times repeated by a DST fold resolve to the earlier instant; times skipped
/// by a DST gap move forward by the width of the gap.
pub fn resolve_in<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>, TypeError> {
    earliest_instant(tz.from_local_datetime(&naive))
        // Gaps are at most an hour wide in every real zone.
        .or_else(|| earliest_instant(tz.from_local_datetime(&(naive + TimeDelta::hours(1)))))
        .ok_or_else(|| TypeError::mismatch("DateTime", naive.to_string()))
}

// The pair in `Ambiguous` is not guaranteed to be in time order.
fn earliest_instant<Tz: TimeZone>(result: LocalResult<DateTime<Tz>>) -> Option<DateTime<Tz>> {
    match result {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(a, b) => Some(a.min(b)),
        LocalResult::None => None,
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, TypeError> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    let s = s.trim();
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|_| TypeError::mismatch("NaiveDateTime", format!("string {s:?}")))
}
