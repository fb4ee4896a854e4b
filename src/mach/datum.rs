use crate::error;
use crate::lang::Error;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// ## The uniform stack cell
///
/// Every value the machine touches is a `Datum`: a tagged integer or
/// real. The machine never promotes one kind to the other on its own;
/// the compiler emits explicit conversion opcodes, and a mixed-kind
/// operation here is a `BadDataType` error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datum {
    Integer(i64),
    Real(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Integer,
    Real,
}

impl Datum {
    pub fn kind(&self) -> Kind {
        match self {
            Datum::Integer(_) => Kind::Integer,
            Datum::Real(_) => Kind::Real,
        }
    }

    pub fn neg(val: Datum) -> Result<Datum> {
        use Datum::*;
        match val {
            Integer(v) => Ok(Integer(-v)),
            Real(v) => Ok(Real(-v)),
        }
    }

    pub fn add(lhs: Datum, rhs: Datum) -> Result<Datum> {
        use Datum::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(Integer(l.wrapping_add(r))),
            (Real(l), Real(r)) => Ok(Real(l + r)),
            _ => Err(error!(BadDataType)),
        }
    }

    pub fn sub(lhs: Datum, rhs: Datum) -> Result<Datum> {
        use Datum::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(Integer(l.wrapping_sub(r))),
            (Real(l), Real(r)) => Ok(Real(l - r)),
            _ => Err(error!(BadDataType)),
        }
    }

    pub fn mul(lhs: Datum, rhs: Datum) -> Result<Datum> {
        use Datum::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(Integer(l.wrapping_mul(r))),
            (Real(l), Real(r)) => Ok(Real(l * r)),
            _ => Err(error!(BadDataType)),
        }
    }

    /// Integer division truncates; real division is IEEE, so a real zero
    /// divisor yields an infinity rather than an error.
    pub fn div(lhs: Datum, rhs: Datum) -> Result<Datum> {
        use Datum::*;
        match (lhs, rhs) {
            (Integer(_), Integer(0)) => Err(error!(DivideByZero)),
            (Integer(l), Integer(r)) => Ok(Integer(l.wrapping_div(r))),
            (Real(l), Real(r)) => Ok(Real(l / r)),
            _ => Err(error!(BadDataType)),
        }
    }

    pub fn rem(lhs: Datum, rhs: Datum) -> Result<Datum> {
        use Datum::*;
        match (lhs, rhs) {
            (Integer(_), Integer(0)) => Err(error!(DivideByZero)),
            (Integer(l), Integer(r)) => Ok(Integer(l.wrapping_rem(r))),
            _ => Err(error!(BadDataType)),
        }
    }

    fn compare(lhs: Datum, rhs: Datum) -> Result<std::cmp::Ordering> {
        use Datum::*;
        let ordering = match (lhs, rhs) {
            (Integer(l), Integer(r)) => l.cmp(&r),
            (Real(l), Real(r)) => l.partial_cmp(&r).ok_or(error!(BadDataType))?,
            _ => return Err(error!(BadDataType)),
        };
        Ok(ordering)
    }

    pub fn lt(lhs: Datum, rhs: Datum) -> Result<Datum> {
        Ok(Datum::from(Datum::compare(lhs, rhs)?.is_lt()))
    }

    pub fn lte(lhs: Datum, rhs: Datum) -> Result<Datum> {
        Ok(Datum::from(Datum::compare(lhs, rhs)?.is_le()))
    }

    pub fn equ(lhs: Datum, rhs: Datum) -> Result<Datum> {
        Ok(Datum::from(Datum::compare(lhs, rhs)?.is_eq()))
    }

    pub fn gte(lhs: Datum, rhs: Datum) -> Result<Datum> {
        Ok(Datum::from(Datum::compare(lhs, rhs)?.is_ge()))
    }

    pub fn gt(lhs: Datum, rhs: Datum) -> Result<Datum> {
        Ok(Datum::from(Datum::compare(lhs, rhs)?.is_gt()))
    }

    pub fn nequ(lhs: Datum, rhs: Datum) -> Result<Datum> {
        Ok(Datum::from(Datum::compare(lhs, rhs)?.is_ne()))
    }

    pub fn lor(lhs: Datum, rhs: Datum) -> Result<Datum> {
        let (l, r) = (i64::try_from(lhs)?, i64::try_from(rhs)?);
        Ok(Datum::from(l != 0 || r != 0))
    }

    pub fn land(lhs: Datum, rhs: Datum) -> Result<Datum> {
        let (l, r) = (i64::try_from(lhs)?, i64::try_from(rhs)?);
        Ok(Datum::from(l != 0 && r != 0))
    }

    pub fn lnot(val: Datum) -> Result<Datum> {
        Ok(Datum::from(i64::try_from(val)? == 0))
    }

    pub fn itor(val: Datum) -> Result<Datum> {
        match val {
            Datum::Integer(v) => Ok(Datum::Real(v as f64)),
            Datum::Real(_) => Err(error!(BadDataType)),
        }
    }

    pub fn round(val: Datum) -> Result<Datum> {
        match val {
            Datum::Real(v) => Ok(Datum::Integer(v.round() as i64)),
            Datum::Integer(_) => Err(error!(BadDataType)),
        }
    }

    pub fn trunc(val: Datum) -> Result<Datum> {
        match val {
            Datum::Real(v) => Ok(Datum::Integer(v.trunc() as i64)),
            Datum::Integer(_) => Err(error!(BadDataType)),
        }
    }

    pub fn abs(val: Datum) -> Result<Datum> {
        use Datum::*;
        match val {
            Integer(v) => Ok(Integer(v.wrapping_abs())),
            Real(v) => Ok(Real(v.abs())),
        }
    }

    pub fn odd(val: Datum) -> Result<Datum> {
        Ok(Datum::from(i64::try_from(val)? & 1 == 1))
    }

    /// Squaring preserves the operand's kind.
    pub fn sqr(val: Datum) -> Result<Datum> {
        use Datum::*;
        match val {
            Integer(v) => Ok(Integer(v.wrapping_mul(v))),
            Real(v) => Ok(Real(v * v)),
        }
    }

    fn as_real(val: Datum) -> f64 {
        match val {
            Datum::Integer(v) => v as f64,
            Datum::Real(v) => v,
        }
    }

    // The transcendentals take either kind and produce a real.

    pub fn atan(val: Datum) -> Result<Datum> {
        Ok(Datum::Real(Datum::as_real(val).atan()))
    }

    pub fn exp(val: Datum) -> Result<Datum> {
        Ok(Datum::Real(Datum::as_real(val).exp()))
    }

    pub fn log(val: Datum) -> Result<Datum> {
        Ok(Datum::Real(Datum::as_real(val).ln()))
    }

    pub fn sin(val: Datum) -> Result<Datum> {
        Ok(Datum::Real(Datum::as_real(val).sin()))
    }

    pub fn sqrt(val: Datum) -> Result<Datum> {
        Ok(Datum::Real(Datum::as_real(val).sqrt()))
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Datum {
        Datum::Integer(value)
    }
}

impl From<usize> for Datum {
    fn from(value: usize) -> Datum {
        Datum::Integer(value as i64)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Datum {
        Datum::Real(value)
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Datum {
        Datum::Integer(value as i64)
    }
}

impl From<char> for Datum {
    fn from(value: char) -> Datum {
        Datum::Integer(value as i64)
    }
}

impl TryFrom<Datum> for i64 {
    type Error = Error;
    fn try_from(val: Datum) -> Result<i64> {
        match val {
            Datum::Integer(v) => Ok(v),
            Datum::Real(_) => Err(error!(BadDataType)),
        }
    }
}

impl TryFrom<Datum> for usize {
    type Error = Error;
    fn try_from(val: Datum) -> Result<usize> {
        match val {
            Datum::Integer(v) if v >= 0 => Ok(v as usize),
            _ => Err(error!(BadDataType)),
        }
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Datum) -> Option<std::cmp::Ordering> {
        use Datum::*;
        match (self, other) {
            (Integer(l), Integer(r)) => l.partial_cmp(r),
            _ => Datum::as_real(*self).partial_cmp(&Datum::as_real(*other)),
        }
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Datum::Integer(v) => write!(f, "{}", v),
            Datum::Real(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_kind_arithmetic() {
        assert_eq!(
            Datum::add(Datum::Integer(2), Datum::Integer(3)),
            Ok(Datum::Integer(5))
        );
        assert_eq!(
            Datum::mul(Datum::Real(1.5), Datum::Real(2.0)),
            Ok(Datum::Real(3.0))
        );
    }

    #[test]
    fn test_no_auto_promotion() {
        let err = Datum::add(Datum::Integer(1), Datum::Real(2.0)).unwrap_err();
        assert_eq!(err.code(), crate::lang::ErrorCode::BadDataType);
    }

    #[test]
    fn test_division() {
        assert_eq!(
            Datum::div(Datum::Integer(7), Datum::Integer(2)),
            Ok(Datum::Integer(3))
        );
        assert_eq!(
            Datum::div(Datum::Integer(-7), Datum::Integer(2)),
            Ok(Datum::Integer(-3))
        );
        assert!(Datum::div(Datum::Integer(1), Datum::Integer(0)).is_err());
        // real division is IEEE
        assert_eq!(
            Datum::div(Datum::Real(1.0), Datum::Real(0.0)),
            Ok(Datum::Real(f64::INFINITY))
        );
    }

    #[test]
    fn test_comparisons_yield_flags() {
        assert_eq!(
            Datum::lt(Datum::Integer(1), Datum::Integer(2)),
            Ok(Datum::Integer(1))
        );
        assert_eq!(
            Datum::gte(Datum::Real(1.0), Datum::Real(2.0)),
            Ok(Datum::Integer(0))
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Datum::itor(Datum::Integer(2)), Ok(Datum::Real(2.0)));
        assert_eq!(Datum::round(Datum::Real(2.5)), Ok(Datum::Integer(3)));
        assert_eq!(Datum::trunc(Datum::Real(2.9)), Ok(Datum::Integer(2)));
        assert!(Datum::round(Datum::Integer(2)).is_err());
    }

    #[test]
    fn test_sqr_preserves_kind() {
        assert_eq!(Datum::sqr(Datum::Integer(5)), Ok(Datum::Integer(25)));
        assert_eq!(Datum::sqr(Datum::Real(1.5)), Ok(Datum::Real(2.25)));
    }
}
