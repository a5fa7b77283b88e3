use crate::Value;
use anyhow::{Result, bail};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Conversion between Rust types and [`Value`].
///
/// `prototype` yields a typed null used as the column type witness,
/// `as_value` converts outward and `try_from_value` converts a fetched value
/// back, widening or narrowing numerics where the payload allows it.
pub trait AsValue: Sized {
    fn prototype() -> Value;
    fn as_value(&self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>;
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

macro_rules! try_integer {
    ($target:ty, $value:expr) => {
        match $value {
            Value::Int8(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            Value::Int16(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            Value::Int32(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            Value::Int64(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            Value::UInt8(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            Value::UInt16(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            Value::UInt32(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            Value::UInt64(Some(v)) => Ok::<$target, anyhow::Error>(<$target>::try_from(v)?),
            v => bail!(
                "cannot convert {:?} into {}",
                v,
                core::any::type_name::<$target>()
            ),
        }
    };
}

macro_rules! impl_as_value_integer {
    ($type:ty, $variant:ident) => {
        impl AsValue for $type {
            fn prototype() -> Value {
                Value::$variant(None)
            }
            fn as_value(&self) -> Value {
                Value::$variant(Some(*self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                try_integer!($type, value)
            }
        }
    };
}

impl_as_value_integer!(i8, Int8);
impl_as_value_integer!(i16, Int16);
impl_as_value_integer!(i32, Int32);
impl_as_value_integer!(i64, Int64);
impl_as_value_integer!(u8, UInt8);
impl_as_value_integer!(u16, UInt16);
impl_as_value_integer!(u32, UInt32);
impl_as_value_integer!(u64, UInt64);

impl AsValue for bool {
    fn prototype() -> Value {
        Value::Boolean(None)
    }
    fn as_value(&self) -> Value {
        Value::Boolean(Some(*self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(Some(v)) => Ok(v),
            v @ (Value::Int8(..)
            | Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::UInt8(..)
            | Value::UInt16(..)
            | Value::UInt32(..)
            | Value::UInt64(..)) if !v.is_null() => Ok(try_integer!(i64, v)? != 0),
            v => bail!("cannot convert {:?} into bool", v),
        }
    }
}

impl AsValue for f32 {
    fn prototype() -> Value {
        Value::Float32(None)
    }
    fn as_value(&self) -> Value {
        Value::Float32(Some(*self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(Some(v)) => Ok(v),
            v => bail!("cannot convert {:?} into f32", v),
        }
    }
}

impl AsValue for f64 {
    fn prototype() -> Value {
        Value::Float64(None)
    }
    fn as_value(&self) -> Value {
        Value::Float64(Some(*self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float64(Some(v)) => Ok(v),
            Value::Float32(Some(v)) => Ok(v as f64),
            v => bail!("cannot convert {:?} into f64", v),
        }
    }
}

impl AsValue for Decimal {
    fn prototype() -> Value {
        Value::Decimal(None, 0, 0)
    }
    fn as_value(&self) -> Value {
        Value::Decimal(Some(*self), 0, self.scale() as u8)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(Some(v), ..) => Ok(v),
            Value::Int8(Some(v)) => Ok(v.into()),
            Value::Int16(Some(v)) => Ok(v.into()),
            Value::Int32(Some(v)) => Ok(v.into()),
            Value::Int64(Some(v)) => Ok(v.into()),
            v => bail!("cannot convert {:?} into Decimal", v),
        }
    }
}

impl AsValue for String {
    fn prototype() -> Value {
        Value::Varchar(None)
    }
    fn as_value(&self) -> Value {
        Value::Varchar(Some(self.clone()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) => Ok(v),
            v => bail!("cannot convert {:?} into String", v),
        }
    }
}

impl AsValue for &str {
    fn prototype() -> Value {
        Value::Varchar(None)
    }
    fn as_value(&self) -> Value {
        Value::Varchar(Some((*self).into()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        bail!("cannot borrow {:?} as &str, use String", value)
    }
}

impl AsValue for Box<[u8]> {
    fn prototype() -> Value {
        Value::Blob(None)
    }
    fn as_value(&self) -> Value {
        Value::Blob(Some(self.clone()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            v => bail!("cannot convert {:?} into Box<[u8]>", v),
        }
    }
}

impl AsValue for Vec<u8> {
    fn prototype() -> Value {
        Value::Blob(None)
    }
    fn as_value(&self) -> Value {
        Value::Blob(Some(self.clone().into_boxed_slice()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Ok(<Box<[u8]>>::try_from_value(value)?.into_vec())
    }
}

macro_rules! impl_as_value_simple {
    ($type:ty, $variant:ident) => {
        impl AsValue for $type {
            fn prototype() -> Value {
                Value::$variant(None)
            }
            fn as_value(&self) -> Value {
                Value::$variant(Some(self.clone()))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(Some(v)) => Ok(v),
                    v => bail!(
                        "cannot convert {:?} into {}",
                        v,
                        core::any::type_name::<$type>()
                    ),
                }
            }
        }
    };
}

impl_as_value_simple!(Date, Date);
impl_as_value_simple!(Time, Time);
impl_as_value_simple!(PrimitiveDateTime, Timestamp);
impl_as_value_simple!(OffsetDateTime, TimestampWithTimezone);

impl AsValue for Uuid {
    fn prototype() -> Value {
        Value::Uuid(None)
    }
    fn as_value(&self) -> Value {
        Value::Uuid(Some(*self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(Some(v)) => Ok(v),
            Value::Varchar(Some(v)) => Ok(Uuid::parse_str(&v)?),
            v => bail!("cannot convert {:?} into Uuid", v),
        }
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn prototype() -> Value {
        T::prototype()
    }
    fn as_value(&self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::prototype(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(T::try_from_value(value)?))
        }
    }
}

impl<T: AsValue> AsValue for Vec<T> {
    fn prototype() -> Value {
        Value::List(None, Box::new(T::prototype()))
    }
    fn as_value(&self) -> Value {
        Value::List(
            Some(self.iter().map(AsValue::as_value).collect()),
            Box::new(T::prototype()),
        )
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(Some(v), ..) => v.into_iter().map(T::try_from_value).collect(),
            v => bail!("cannot convert {:?} into a list", v),
        }
    }
}
