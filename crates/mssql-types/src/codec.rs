//! Wire encoding of parameter values and decoding of column buffers.
//!
//! All fixed-width numbers are little-endian. The layouts match what the
//! DB-Library binds produce and accept:
//!
//! | Type            | Layout                                                   |
//! |-----------------|----------------------------------------------------------|
//! | `TINYINT`..`BIGINT` | 1/2/4/8 byte integer (`TINYINT` unsigned)            |
//! | `REAL`/`FLOAT`  | IEEE-754 single/double                                   |
//! | `BIT`           | one byte, `1` is true                                    |
//! | `SMALLMONEY`    | `i32` of value x 10000                                   |
//! | `MONEY`         | `i32` high half, then `u32` low half, of value x 10000   |
//! | `DATETIME`      | `i32` days since 1900-01-01, `u32` 1/300 s since midnight |
//! | `SMALLDATETIME` | `u16` days since 1900-01-01, `u16` minutes since midnight |
//! | binary types    | raw bytes followed by one pad byte                       |
//! | everything else | text bytes, NUL terminated on the way in                 |

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::error::TypeError;
use crate::value::SqlValue;
use crate::wire::WireType;

const TICKS_PER_SECOND: u64 = 300;
const TICKS_PER_DAY: u32 = 86_400 * 300;
const MONEY_SCALE: f64 = 10_000.0;

/// `DATETIME` encoding of 9999-12-31 23:59:59.997.
pub const DATETIME_MAX_PARTS: (i32, u32) = (2_958_463, 25_919_999);
/// `DATETIME` encoding of 1753-01-01 00:00:00.000.
pub const DATETIME_MIN_PARTS: (i32, u32) = (-53_690, 0);

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// The largest value a `DATETIME` column holds.
#[must_use]
pub fn datetime_max() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 997))
        .unwrap_or(NaiveDateTime::MAX)
}

/// The smallest value a `DATETIME` column holds.
#[must_use]
pub fn datetime_min() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1753, 1, 1)
        .map(|d| d.and_time(NaiveTime::MIN))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Options that change how values are laid out for the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Double wide-character (`NVARCHAR`/`NCHAR`) buffers with zero bytes.
    ///
    /// Transport library releases before 0.95 only read the full value when
    /// the buffer is padded this way.
    pub legacy_wide_padding: bool,
}

impl EncodeOptions {
    /// Options for a transport library older than 0.95.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            legacy_wide_padding: true,
        }
    }
}

/// An encoded parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// The bytes to hand to the transport, `None` for NULL.
    pub data: Option<Bytes>,
    /// The length to declare for the value.
    pub declared_len: i32,
}

impl Encoded {
    fn null() -> Self {
        Self {
            data: None,
            declared_len: 0,
        }
    }

    fn bytes(data: Bytes) -> Self {
        let declared_len = i32::try_from(data.len()).unwrap_or(i32::MAX);
        Self {
            data: Some(data),
            declared_len,
        }
    }
}

/// Encode a value for a parameter of the given wire type.
pub fn encode(wire: WireType, value: &SqlValue, opts: EncodeOptions) -> Result<Encoded, TypeError> {
    if value.is_null() {
        return Ok(Encoded::null());
    }
    let mut buf = BytesMut::with_capacity(8);
    match wire {
        WireType::TinyInt => buf.put_u8(int_for::<u8>(value, "u8")?),
        WireType::SmallInt => buf.put_i16_le(int_for::<i16>(value, "i16")?),
        WireType::Int => buf.put_i32_le(int_for::<i32>(value, "i32")?),
        WireType::BigInt => buf.put_i64_le(int_for::<i64>(value, "i64")?),
        WireType::Real => {
            let v = float_for(value, "f32")?;
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                return Err(TypeError::out_of_range("f32", v));
            }
            buf.put_f32_le(v as f32);
        }
        WireType::Float => buf.put_f64_le(float_for(value, "f64")?),
        WireType::Bit | WireType::BitN => match value {
            SqlValue::Bool(b) => buf.put_u8(u8::from(*b)),
            other => return Err(TypeError::mismatch("bool", other.type_name())),
        },
        WireType::SmallMoney => {
            let scaled = money_scaled(value)?;
            let v = i32::try_from(scaled).map_err(|_| TypeError::out_of_range("SMALLMONEY", value))?;
            buf.put_i32_le(v);
        }
        WireType::Money => {
            let scaled = money_scaled(value)?;
            buf.put_i32_le((scaled >> 32) as i32);
            buf.put_u32_le(scaled as u32);
        }
        WireType::DateTime => {
            let (days, ticks) = datetime_parts(datetime_for(value)?)?;
            buf.put_i32_le(days);
            buf.put_u32_le(ticks);
        }
        WireType::SmallDateTime => {
            let (days, minutes) = smalldatetime_parts(datetime_for(value)?)?;
            buf.put_u16_le(days);
            buf.put_u16_le(minutes);
        }
        w if w.is_binary() => match value {
            SqlValue::Binary(b) => {
                buf.reserve(b.len() + 1);
                buf.put_slice(b);
                buf.put_u8(0);
            }
            other => return Err(TypeError::mismatch("Bytes", other.type_name())),
        },
        w => return encode_text(w, value, opts),
    }
    Ok(Encoded::bytes(buf.freeze()))
}

fn encode_text(wire: WireType, value: &SqlValue, opts: EncodeOptions) -> Result<Encoded, TypeError> {
    let text = match value {
        SqlValue::String(s) => s.clone(),
        SqlValue::Bool(_) | SqlValue::Binary(_) | SqlValue::Null => {
            return Err(TypeError::mismatch("String", value.type_name()));
        }
        other => other.to_string(),
    };
    if text.is_empty() {
        // A zero length parameter reads as NULL.
        return Ok(Encoded::bytes(Bytes::from_static(b" ")));
    }
    let chars = text.chars().count();
    let mut data = text.into_bytes();
    let mut declared = data.len();
    if wire.is_wide() && opts.legacy_wide_padding {
        data.resize(data.len() * 2, 0);
        declared = data.len();
    } else if wire == WireType::XNChar {
        declared = declared.max(chars * 2);
    }
    Ok(Encoded {
        declared_len: i32::try_from(declared).map_err(|_| TypeError::out_of_range("i32", declared))?,
        data: Some(Bytes::from(data)),
    })
}

fn int_for<T: TryFrom<i64>>(value: &SqlValue, target: &'static str) -> Result<T, TypeError> {
    let v = match value {
        SqlValue::Real(_) | SqlValue::Float(_) => {
            let f = value.as_f64().unwrap_or(f64::NAN);
            if f.fract() != 0.0 || !f.is_finite() {
                return Err(TypeError::mismatch(target, format!("{} {f}", value.type_name())));
            }
            if f < i64::MIN as f64 || f >= i64::MAX as f64 {
                return Err(TypeError::out_of_range(target, f));
            }
            f as i64
        }
        other => other
            .as_i64()
            .ok_or_else(|| TypeError::mismatch(target, other.type_name()))?,
    };
    T::try_from(v).map_err(|_| TypeError::out_of_range(target, v))
}

fn float_for(value: &SqlValue, target: &'static str) -> Result<f64, TypeError> {
    value
        .as_f64()
        .ok_or_else(|| TypeError::mismatch(target, value.type_name()))
}

fn datetime_for(value: &SqlValue) -> Result<NaiveDateTime, TypeError> {
    match value {
        SqlValue::DateTime(dt) => Ok(*dt),
        other => Err(TypeError::mismatch("NaiveDateTime", other.type_name())),
    }
}

/// Scale a currency value by 10000.
///
/// Integers scale exactly. Floats are nudged away from zero by a few ulps
/// before truncation so values with four or fewer decimals survive binary
/// rounding (`2.639 * 10000` is `26389.999999999996`).
fn money_scaled(value: &SqlValue) -> Result<i64, TypeError> {
    if let Some(v) = value.as_i64() {
        return v
            .checked_mul(10_000)
            .ok_or_else(|| TypeError::out_of_range("MONEY", v));
    }
    let f = float_for(value, "f64")?;
    let scaled = f * MONEY_SCALE;
    let epsilon = 1e-6_f64.max(scaled.abs() * 3.0 * f64::EPSILON);
    let nudged = (scaled + scaled.signum() * epsilon).trunc();
    if !nudged.is_finite() || nudged < i64::MIN as f64 || nudged >= i64::MAX as f64 {
        return Err(TypeError::out_of_range("MONEY", f));
    }
    Ok(nudged as i64)
}

/// Split a wall-clock value into `DATETIME` days and ticks, rounding to the
/// nearest 1/300 second.
pub fn datetime_parts(dt: NaiveDateTime) -> Result<(i32, u32), TypeError> {
    if dt == datetime_max() {
        return Ok(DATETIME_MAX_PARTS);
    }
    if dt == datetime_min() {
        return Ok(DATETIME_MIN_PARTS);
    }
    let mut days = (dt.date() - epoch()).num_days();
    let time = dt.time();
    let nanos = u64::from(time.nanosecond().min(999_999_999));
    let mut ticks = u64::from(time.num_seconds_from_midnight()) * TICKS_PER_SECOND
        + (nanos * 3 + 5_000_000) / 10_000_000;
    if ticks >= u64::from(TICKS_PER_DAY) {
        days += 1;
        ticks -= u64::from(TICKS_PER_DAY);
    }
    let days = i32::try_from(days).map_err(|_| TypeError::out_of_range("DATETIME", dt))?;
    Ok((days, ticks as u32))
}

/// Split a wall-clock value into `SMALLDATETIME` days and minutes.
pub fn smalldatetime_parts(dt: NaiveDateTime) -> Result<(u16, u16), TypeError> {
    let days = (dt.date() - epoch()).num_days();
    let days = u16::try_from(days).map_err(|_| TypeError::out_of_range("SMALLDATETIME", dt))?;
    let minutes = (dt.time().num_seconds_from_midnight() / 60) as u16;
    Ok((days, minutes))
}

/// Rebuild a wall-clock value from `DATETIME` days and ticks.
pub fn datetime_from_parts(days: i32, ticks: u32) -> Result<NaiveDateTime, TypeError> {
    if (days, ticks) == DATETIME_MAX_PARTS {
        return Ok(datetime_max());
    }
    if (days, ticks) == DATETIME_MIN_PARTS {
        return Ok(datetime_min());
    }
    let nanos = i64::from(ticks) * 1_000_000_000 / TICKS_PER_SECOND as i64;
    epoch()
        .and_time(NaiveTime::MIN)
        .checked_add_signed(TimeDelta::days(i64::from(days)))
        .and_then(|dt| dt.checked_add_signed(TimeDelta::nanoseconds(nanos)))
        .ok_or_else(|| TypeError::out_of_range("DATETIME", format!("{days} days, {ticks} ticks")))
}

fn fixed<const N: usize>(data: &[u8], wire: WireType) -> Result<[u8; N], TypeError> {
    data.get(..N)
        .and_then(|s| <[u8; N]>::try_from(s).ok())
        .ok_or_else(|| TypeError::Truncated {
            type_name: wire.name(),
            expected: N,
            actual: data.len(),
        })
}

/// Decode a non-NULL column or output parameter buffer.
pub fn decode(wire: WireType, data: &[u8]) -> Result<SqlValue, TypeError> {
    let value = match wire {
        WireType::TinyInt => SqlValue::TinyInt(fixed::<1>(data, wire)?[0]),
        WireType::SmallInt => SqlValue::SmallInt(i16::from_le_bytes(fixed(data, wire)?)),
        WireType::Int => SqlValue::Int(i32::from_le_bytes(fixed(data, wire)?)),
        WireType::BigInt => SqlValue::BigInt(i64::from_le_bytes(fixed(data, wire)?)),
        WireType::Real => SqlValue::Real(f32::from_le_bytes(fixed(data, wire)?)),
        WireType::Float | WireType::Decimal | WireType::Numeric => {
            SqlValue::Float(f64::from_le_bytes(fixed(data, wire)?))
        }
        WireType::Bit | WireType::BitN => SqlValue::Bool(fixed::<1>(data, wire)?[0] == 1),
        WireType::SmallMoney => {
            let v = i32::from_le_bytes(fixed(data, wire)?);
            SqlValue::Float(f64::from(v) / MONEY_SCALE)
        }
        WireType::Money => {
            let raw = fixed::<8>(data, wire)?;
            let high = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let low = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
            let v = (i64::from(high) << 32) | i64::from(low);
            SqlValue::Float(v as f64 / MONEY_SCALE)
        }
        WireType::DateTime => {
            let raw = fixed::<8>(data, wire)?;
            let days = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let ticks = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
            SqlValue::DateTime(datetime_from_parts(days, ticks)?)
        }
        WireType::SmallDateTime => {
            let raw = fixed::<4>(data, wire)?;
            let days = u16::from_le_bytes([raw[0], raw[1]]);
            let minutes = u16::from_le_bytes([raw[2], raw[3]]);
            let dt = epoch().and_time(NaiveTime::MIN)
                + TimeDelta::days(i64::from(days))
                + TimeDelta::minutes(i64::from(minutes));
            SqlValue::DateTime(dt)
        }
        w if w.is_binary() => {
            let end = data.len().saturating_sub(1);
            SqlValue::Binary(Bytes::copy_from_slice(&data[..end]))
        }
        _ => {
            let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
            SqlValue::String(String::from_utf8_lossy(&data[..end]).into_owned())
        }
    };
    Ok(value)
}

/// Decode a buffer the transport may have flagged as NULL (`None`).
pub fn decode_nullable(wire: WireType, data: Option<&[u8]>) -> Result<SqlValue, TypeError> {
    data.map_or(Ok(SqlValue::Null), |d| decode(wire, d))
}
