//! Typed values produced and consumed by the expression evaluator.
//!
//! Mirrors the four storage types the definition language exposes
//! (`int`, `short`, `float`, `string`) and the C-style promotion rules
//! used when two differently-typed operands meet.

use std::fmt;

use crate::error::EvalError;

/// A value carried by an expression AST node or stored in a variable slot.
///
/// Numeric variants use signed storage (`i32`/`i16`/`f32`); see
/// `DESIGN.md` for why unsigned storage was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Short(i16),
    Float(f32),
    Str(String),
}

/// Promotion rank used to pick the common type of a binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Short,
    Int,
    Float,
}

impl Value {
    fn rank(&self) -> Rank {
        match self {
            Value::Short(_) => Rank::Short,
            Value::Int(_) => Rank::Int,
            Value::Float(_) => Rank::Float,
            Value::Str(_) => Rank::Float, // unreachable for numeric ops; see guard in `promote`
        }
    }

    pub fn as_f32(&self) -> Result<f32, EvalError> {
        match self {
            Value::Int(v) => Ok(*v as f32),
            Value::Short(v) => Ok(*v as f32),
            Value::Float(v) => Ok(*v),
            Value::Str(s) => Err(EvalError::TypeMismatch(format!(
                "cannot use string {s:?} as a number"
            ))),
        }
    }

    pub fn as_i32(&self) -> Result<i32, EvalError> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Short(v) => Ok(*v as i32),
            Value::Float(v) => Ok(*v as i32),
            Value::Str(s) => Err(EvalError::TypeMismatch(format!(
                "cannot use string {s:?} as a number"
            ))),
        }
    }

    /// Truthiness used by guards: nonzero numeric result ⇒ true.
    pub fn is_truthy(&self) -> Result<bool, EvalError> {
        match self {
            Value::Int(v) => Ok(*v != 0),
            Value::Short(v) => Ok(*v != 0),
            Value::Float(v) => Ok(*v != 0.0),
            Value::Str(s) => Ok(!s.is_empty()),
        }
    }

    pub fn to_float(&self) -> Result<Value, EvalError> {
        Ok(Value::Float(self.as_f32()?))
    }

    pub fn to_int(&self) -> Result<Value, EvalError> {
        Ok(Value::Int(self.as_i32()?))
    }

    pub fn to_short(&self) -> Result<Value, EvalError> {
        Ok(Value::Short(self.as_i32()? as i16))
    }

    pub fn to_string_value(&self) -> Value {
        Value::Str(match self {
            Value::Int(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Str(s) => s.clone(),
        })
    }

    fn promote(a: &Value, b: &Value) -> Result<Rank, EvalError> {
        if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
            return Err(EvalError::TypeMismatch(
                "arithmetic/bitwise operators do not accept string operands".into(),
            ));
        }
        Ok(a.rank().max(b.rank()))
    }

    pub fn add(&self, other: &Value) -> Result<Value, EvalError> {
        if matches!(self, Value::Str(_)) || matches!(other, Value::Str(_)) {
            let mut s = self.to_string_value_raw();
            s.push_str(&other.to_string_value_raw());
            return Ok(Value::Str(s));
        }
        self.numeric_binop(other, |a, b| a + b, |a, b| a + b, |a, b| a + b)
    }

    fn to_string_value_raw(&self) -> String {
        match self.to_string_value() {
            Value::Str(s) => s,
            _ => unreachable!(),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, EvalError> {
        self.numeric_binop(other, |a, b| a - b, |a, b| a - b, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value, EvalError> {
        self.numeric_binop(other, |a, b| a * b, |a, b| a * b, |a, b| a * b)
    }

    pub fn div(&self, other: &Value) -> Result<Value, EvalError> {
        match Self::promote(self, other)? {
            Rank::Float => Ok(Value::Float(self.as_f32()? / other.as_f32()?)),
            _ => {
                let rhs = other.as_i32()?;
                if rhs == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                let result = self.as_i32()? / rhs;
                Ok(Self::wrap_int(Self::promote(self, other)?, result))
            }
        }
    }

    fn numeric_binop(
        &self,
        other: &Value,
        f32op: impl Fn(f32, f32) -> f32,
        intop: impl Fn(i32, i32) -> i32,
        shortop: impl Fn(i16, i16) -> i16,
    ) -> Result<Value, EvalError> {
        match Self::promote(self, other)? {
            Rank::Float => Ok(Value::Float(f32op(self.as_f32()?, other.as_f32()?))),
            Rank::Int => Ok(Value::Int(intop(self.as_i32()?, other.as_i32()?))),
            Rank::Short => {
                if let (Value::Short(a), Value::Short(b)) = (self, other) {
                    Ok(Value::Short(shortop(*a, *b)))
                } else {
                    Ok(Value::Int(intop(self.as_i32()?, other.as_i32()?)))
                }
            }
        }
    }

    fn wrap_int(rank: Rank, v: i32) -> Value {
        match rank {
            Rank::Short => Value::Short(v as i16),
            _ => Value::Int(v),
        }
    }

    pub fn compare(&self, other: &Value) -> Result<std::cmp::Ordering, EvalError> {
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return Ok(a.cmp(b));
        }
        self.as_f32()?
            .partial_cmp(&other.as_f32()?)
            .ok_or_else(|| EvalError::TypeMismatch("NaN is not ordered".into()))
    }

    pub fn eq_value(&self, other: &Value) -> Result<bool, EvalError> {
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return Ok(a == b);
        }
        Ok(self.as_f32()? == other.as_f32()?)
    }

    fn int_pair(&self, other: &Value) -> Result<(i32, i32), EvalError> {
        Ok((self.as_i32()?, other.as_i32()?))
    }

    pub fn band(&self, other: &Value) -> Result<Value, EvalError> {
        let (a, b) = self.int_pair(other)?;
        Ok(Value::Int(a & b))
    }
    pub fn bor(&self, other: &Value) -> Result<Value, EvalError> {
        let (a, b) = self.int_pair(other)?;
        Ok(Value::Int(a | b))
    }
    pub fn bxor(&self, other: &Value) -> Result<Value, EvalError> {
        let (a, b) = self.int_pair(other)?;
        Ok(Value::Int(a ^ b))
    }
    pub fn lshift(&self, other: &Value) -> Result<Value, EvalError> {
        let (a, b) = self.int_pair(other)?;
        Ok(Value::Int(a.wrapping_shl(b as u32)))
    }
    pub fn rshift(&self, other: &Value) -> Result<Value, EvalError> {
        let (a, b) = self.int_pair(other)?;
        Ok(Value::Int(a.wrapping_shr(b as u32)))
    }

    pub fn negate(&self) -> Result<Value, EvalError> {
        match self {
            Value::Int(v) => Ok(Value::Int(-v)),
            Value::Short(v) => Ok(Value::Short(-v)),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Str(s) => Err(EvalError::TypeMismatch(format!("cannot negate string {s:?}"))),
        }
    }

    pub fn logical_not(&self) -> Result<Value, EvalError> {
        Ok(Value::Int(if self.is_truthy()? { 0 } else { 1 }))
    }

    pub fn increment(&self) -> Result<Value, EvalError> {
        self.add(&Value::Int(1))
    }

    pub fn decrement(&self) -> Result<Value, EvalError> {
        self.sub(&Value::Int(1))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_plus_float_promotes_to_float() {
        let result = Value::Int(2).add(&Value::Float(1.5)).unwrap();
        assert_eq!(result, Value::Float(3.5));
    }

    #[test]
    fn short_plus_short_stays_short() {
        let result = Value::Short(2).add(&Value::Short(3)).unwrap();
        assert_eq!(result, Value::Short(5));
    }

    #[test]
    fn string_concatenation_via_add() {
        let result = Value::Str("a".into()).add(&Value::Str("b".into())).unwrap();
        assert_eq!(result, Value::Str("ab".into()));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(Value::Int(1).div(&Value::Int(0)).is_err());
    }

    #[test]
    fn truthiness_follows_nonzero_rule() {
        assert!(Value::Int(1).is_truthy().unwrap());
        assert!(!Value::Int(0).is_truthy().unwrap());
        assert!(Value::Float(0.5).is_truthy().unwrap());
    }

    #[test]
    fn bitwise_ops_reject_strings() {
        assert!(Value::Str("x".into()).band(&Value::Int(1)).is_err());
    }
}
