//! `Decimal(P, S)` columns.
//!
//! The wire value of a cell is the scaled mantissa `round(value * 10^S)` as
//! a two's-complement little-endian integer whose width follows from the
//! precision: P <= 9 is 32 bits, P <= 18 is 64, P <= 38 is 128, P <= 76 is
//! 256. The 128- and 256-bit widths are transmitted as 2 or 4 consecutive
//! little-endian 64-bit limbs, least significant first; all limbs come from
//! the same shifted mantissa.
//!
//! Text conversion rounds HALF_UP, i.e. ties away from zero.

use super::{
    conversion_error,
    Column,
    ColumnRef,
};
use crate::{
    types::Type,
    value::{
        Int256,
        Value,
    },
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};

/// Column for fixed-point decimals. Mantissas are held as 256-bit integers
/// regardless of the wire width; the width only matters at the buffer
/// boundary.
pub struct ColumnDecimal {
    type_: Type,
    precision: usize,
    scale: usize,
    nobits: usize,
    data: Vec<Int256>,
}

impl ColumnDecimal {
    pub fn new(type_: Type) -> Result<Self> {
        let (precision, scale) = match &type_ {
            Type::Decimal { precision, scale } => (*precision, *scale),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Decimal".to_string(),
                    actual: other.name(),
                });
            }
        };

        let nobits = match precision {
            1..=9 => 32,
            10..=18 => 64,
            19..=38 => 128,
            39..=76 => 256,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "Decimal precision {} is out of boundary",
                    precision
                )));
            }
        };

        Ok(Self { type_, precision, scale, nobits, data: Vec::new() })
    }

    /// Append a raw scaled mantissa.
    pub fn append_mantissa(&mut self, mantissa: impl Into<Int256>) -> Result<()> {
        let mantissa = mantissa.into();
        self.check_precision(&mantissa)?;
        self.data.push(mantissa);
        Ok(())
    }

    /// Append from text like `"123.45"`, rounding HALF_UP past the scale.
    pub fn append_from_string(&mut self, s: &str) -> Result<()> {
        let mantissa = parse_decimal(s, self.scale).map_err(|message| {
            Error::ValueConversion { target: self.type_.name(), message }
        })?;
        self.append_mantissa(mantissa)
    }

    /// Mantissa at `index`; panics when out of bounds.
    pub fn mantissa_at(&self, index: usize) -> Int256 {
        self.data[index]
    }

    /// Cell at `index` rendered as decimal text.
    pub fn as_string(&self, index: usize) -> String {
        format_decimal(&self.data[index], self.scale)
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn scale(&self) -> usize {
        self.scale
    }

    fn check_precision(&self, mantissa: &Int256) -> Result<()> {
        if mantissa.to_decimal_digits().len() > self.precision {
            return Err(Error::ValueConversion {
                target: self.type_.name(),
                message: format!(
                    "mantissa {} exceeds precision {}",
                    mantissa, self.precision
                ),
            });
        }
        Ok(())
    }

    fn convert(&self, value: &Value) -> Result<Int256> {
        match value {
            Value::Decimal(m) => Ok(Int256::from_i128(*m)),
            Value::Decimal256(m) => Ok(*m),
            Value::String(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| {
                    conversion_error(&self.type_, value)
                })?;
                parse_decimal(text, self.scale).map_err(|message| {
                    Error::ValueConversion {
                        target: self.type_.name(),
                        message,
                    }
                })
            }
            Value::Float64(f) => self.from_float(*f),
            Value::Float32(f) => self.from_float(*f as f64),
            other => match other.as_int() {
                // Whole numbers scale up by 10^S
                Some(whole) => {
                    let mut mantissa = Int256::from_i128(whole);
                    for _ in 0..self.scale {
                        mantissa = mantissa.mul_small(10);
                    }
                    Ok(mantissa)
                }
                None => Err(conversion_error(&self.type_, value)),
            },
        }
    }

    fn from_float(&self, f: f64) -> Result<Int256> {
        if !f.is_finite() {
            return Err(Error::ValueConversion {
                target: self.type_.name(),
                message: "non-finite float".to_string(),
            });
        }
        let scaled = f * 10f64.powi(self.scale as i32);
        // f64::round ties away from zero, matching HALF_UP
        Ok(Int256::from_i128(scaled.round() as i128))
    }
}

impl Column for ColumnDecimal {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let mantissa = self.convert(value)?;
        self.check_precision(&mantissa)?;
        self.data.push(mantissa);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        let mantissa = self.data.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Row {} out of bounds (size: {})",
                index,
                self.data.len()
            ))
        })?;

        Ok(match mantissa.to_i128() {
            Some(m) if self.nobits <= 128 => Value::Decimal(m),
            _ => Value::Decimal256(*mantissa),
        })
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        let width = self.nobits / 8;
        if buffer.len() < rows * width {
            return Err(Error::ShortRead {
                needed: rows * width,
                available: buffer.len(),
            });
        }

        self.data.reserve(rows);
        for _ in 0..rows {
            let mantissa = match self.nobits {
                32 => Int256::from_i128(buffer.get_i32_le() as i128),
                64 => Int256::from_i128(buffer.get_i64_le() as i128),
                128 => Int256::from_i128(buffer.get_i128_le()),
                _ => {
                    let mut limbs = [0u64; 4];
                    for limb in limbs.iter_mut() {
                        *limb = buffer.get_u64_le();
                    }
                    Int256::from_limbs(limbs)
                }
            };
            self.data.push(mantissa);
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for mantissa in &self.data {
            match self.nobits {
                32 => {
                    let m = mantissa.to_i128().unwrap_or_default();
                    buffer.put_i32_le(m as i32);
                }
                64 => {
                    let m = mantissa.to_i128().unwrap_or_default();
                    buffer.put_i64_le(m as i64);
                }
                128 => {
                    let m = mantissa.to_i128().unwrap_or_default();
                    buffer.put_i128_le(m);
                }
                _ => {
                    for limb in mantissa.limbs {
                        buffer.put_u64_le(limb);
                    }
                }
            }
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Box::new(ColumnDecimal {
            type_: self.type_.clone(),
            precision: self.precision,
            scale: self.scale,
            nobits: self.nobits,
            data: Vec::new(),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Parse decimal text into a scaled mantissa, rounding HALF_UP past
/// `scale` fractional digits. `"123.45"` with scale 3 becomes `123450`.
fn parse_decimal(s: &str, scale: usize) -> std::result::Result<Int256, String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(format!("invalid decimal literal '{}'", s));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!("invalid decimal literal '{}'", s));
    }

    let mut mantissa = Int256::ZERO;
    for b in int_part.bytes() {
        mantissa = mantissa.mul_small(10).add_small((b - b'0') as u64);
    }

    for i in 0..scale {
        let digit = frac_part.as_bytes().get(i).map_or(0, |b| b - b'0');
        mantissa = mantissa.mul_small(10).add_small(digit as u64);
    }

    // HALF_UP on the first dropped digit
    if let Some(&b) = frac_part.as_bytes().get(scale) {
        if b - b'0' >= 5 {
            mantissa = mantissa.add_small(1);
        }
    }

    Ok(if negative { mantissa.negate() } else { mantissa })
}

/// Render a scaled mantissa back to decimal text. `1500` with scale 3
/// becomes `"1.500"`.
fn format_decimal(mantissa: &Int256, scale: usize) -> String {
    let negative = mantissa.is_negative();
    let mut digits = mantissa.to_decimal_digits();

    if digits.len() <= scale {
        let pad = scale - digits.len() + 1;
        digits.insert_str(0, &"0".repeat(pad));
    }

    let split = digits.len() - scale;
    let mut out = String::with_capacity(digits.len() + 2);
    if negative {
        out.push('-');
    }
    out.push_str(&digits[..split]);
    if scale > 0 {
        out.push('.');
        out.push_str(&digits[split..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("123.45", 2).unwrap().to_i128(), Some(12345));
        assert_eq!(parse_decimal("123", 2).unwrap().to_i128(), Some(12300));
        assert_eq!(parse_decimal("0.5", 2).unwrap().to_i128(), Some(50));
        assert_eq!(
            parse_decimal("-123.45", 2).unwrap().to_i128(),
            Some(-12345)
        );
        assert!(parse_decimal("12a.4", 2).is_err());
        assert!(parse_decimal(".", 2).is_err());
    }

    #[test]
    fn test_parse_rounds_half_up() {
        assert_eq!(parse_decimal("1.005", 2).unwrap().to_i128(), Some(101));
        assert_eq!(parse_decimal("1.004", 2).unwrap().to_i128(), Some(100));
        // Ties round away from zero
        assert_eq!(parse_decimal("-1.005", 2).unwrap().to_i128(), Some(-101));
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(&Int256::from_i128(12345), 2), "123.45");
        assert_eq!(format_decimal(&Int256::from_i128(12300), 2), "123.00");
        assert_eq!(format_decimal(&Int256::from_i128(50), 2), "0.50");
        assert_eq!(format_decimal(&Int256::from_i128(-12345), 2), "-123.45");
        assert_eq!(format_decimal(&Int256::from_i128(123), 0), "123");
        assert_eq!(format_decimal(&Int256::from_i128(1500), 3), "1.500");
    }

    #[test]
    fn test_widths_follow_precision() {
        for (precision, expected_bytes) in
            [(9usize, 4usize), (18, 8), (38, 16), (76, 32)]
        {
            let mut col =
                ColumnDecimal::new(Type::decimal(precision, 2)).unwrap();
            col.append_mantissa(Int256::from_i128(150)).unwrap();

            let mut buf = BytesMut::new();
            col.save_to_buffer(&mut buf).unwrap();
            assert_eq!(
                buf.len(),
                expected_bytes,
                "wrong width for precision {}",
                precision
            );
        }
    }

    #[test]
    fn test_decimal64_wire_bytes() {
        // toDecimal64(1.5, 3) travels as the 8 LE bytes of 1500
        let mut col = ColumnDecimal::new(Type::decimal(18, 3)).unwrap();
        col.append_from_string("1.5").unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(&buf[..], &1500i64.to_le_bytes());

        let mut col2 = ColumnDecimal::new(Type::decimal(18, 3)).unwrap();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.as_string(0), "1.500");
    }

    #[test]
    fn test_roundtrip_all_widths() {
        for precision in [9usize, 18, 38, 76] {
            let type_ = Type::decimal(precision, 4);
            let mut col = ColumnDecimal::new(type_.clone()).unwrap();
            col.append_from_string("12.3456").unwrap();
            col.append_from_string("-0.0001").unwrap();
            col.append_from_string("0").unwrap();

            let mut buf = BytesMut::new();
            col.save_to_buffer(&mut buf).unwrap();

            let mut col2 = ColumnDecimal::new(type_).unwrap();
            let mut reader = &buf[..];
            col2.load_from_buffer(&mut reader, 3).unwrap();

            assert_eq!(col2.as_string(0), "12.3456");
            assert_eq!(col2.as_string(1), "-0.0001");
            assert_eq!(col2.as_string(2), "0.0000");
        }
    }

    #[test]
    fn test_256_bit_limbs_from_shifted_mantissa() {
        // A negative mantissa must sign-extend across all four limbs
        let type_ = Type::decimal(76, 0);
        let mut col = ColumnDecimal::new(type_.clone()).unwrap();
        col.append_mantissa(Int256::from_i128(-1)).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xFFu8; 32]);

        let mut col2 = ColumnDecimal::new(type_).unwrap();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.as_string(0), "-1");
    }

    #[test]
    fn test_mantissa_beyond_i128() {
        // 10^40 only fits the 256-bit width
        let type_ = Type::decimal(76, 0);
        let mut col = ColumnDecimal::new(type_.clone()).unwrap();
        col.append_from_string(&format!("1{}", "0".repeat(40))).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnDecimal::new(type_).unwrap();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.as_string(0), format!("1{}", "0".repeat(40)));
        assert!(matches!(
            col2.value_at(0).unwrap(),
            Value::Decimal256(_)
        ));
    }

    #[test]
    fn test_precision_bound() {
        let mut col = ColumnDecimal::new(Type::decimal(4, 2)).unwrap();
        col.append_from_string("99.99").unwrap();
        assert!(col.append_from_string("100.00").is_err());
        assert_eq!(col.size(), 1);
    }

    #[test]
    fn test_append_value_variants() {
        let mut col = ColumnDecimal::new(Type::decimal(9, 2)).unwrap();
        col.append_value(&Value::Decimal(12345)).unwrap();
        col.append_value(&Value::from("1.5")).unwrap();
        col.append_value(&Value::Int32(3)).unwrap();
        col.append_value(&Value::Float64(2.555)).unwrap();

        assert_eq!(col.as_string(0), "123.45");
        assert_eq!(col.as_string(1), "1.50");
        assert_eq!(col.as_string(2), "3.00");
        assert_eq!(col.as_string(3), "2.56");
    }
}
