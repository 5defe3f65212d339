//! Scalar-to-scalar conversion.
//!
//! The converter hands every scalar it cannot map by shape alone to a
//! [`ConversionService`]: stored values into declared simple types, and stored map
//! keys (always strings) into the declared key type.

use bson::{Bson, DateTime, Uuid, oid::ObjectId, spec::BinarySubtype};
use chrono::{SecondsFormat, Utc};
use std::fmt::Debug;

use crate::{
    error::{MappingError, MappingResult},
    types::{EnumType, SimpleType, TypeInfo},
    value::{EnumValue, Value},
};

/// Converts store scalars into domain values of a declared type.
pub trait ConversionService: Send + Sync + Debug {
    fn convert(&self, source: &Bson, target: &TypeInfo) -> MappingResult<Value>;

    fn can_convert(&self, source: &Bson, target: &TypeInfo) -> bool {
        self.convert(source, target).is_ok()
    }
}

/// The built-in scalar conversion rules.
///
/// - identity when the stored shape already matches
/// - numeric widening, and narrowing when no information is lost
/// - strings parsed into numbers, booleans, ObjectIds, UUIDs and RFC 3339 datetimes
/// - any scalar rendered as a string
/// - 64-bit millisecond timestamps to and from datetimes
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConversionService;

fn fail(source: &Bson, target: impl std::fmt::Display) -> MappingError {
    MappingError::conversion(source, target)
}

impl DefaultConversionService {
    fn render(&self, source: &Bson) -> MappingResult<String> {
        Ok(match source {
            Bson::String(s) => s.clone(),
            Bson::Boolean(b) => b.to_string(),
            Bson::Int32(i) => i.to_string(),
            Bson::Int64(i) => i.to_string(),
            Bson::Double(d) => d.to_string(),
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::DateTime(dt) => dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true),
            Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => {
                match <[u8; 16]>::try_from(binary.bytes.as_slice()) {
                    Ok(bytes) => Uuid::from_bytes(bytes).to_string(),
                    Err(_) => return Err(fail(source, "string")),
                }
            }
            Bson::Symbol(s) | Bson::JavaScriptCode(s) => s.clone(),
            other => return Err(fail(other, "string")),
        })
    }

    fn to_simple(&self, source: &Bson, target: SimpleType) -> MappingResult<Value> {
        let value = match (target, source) {
            (SimpleType::String, source) => Some(Value::String(self.render(source)?)),

            (SimpleType::Bool, Bson::Boolean(b)) => Some(Value::Bool(*b)),
            (SimpleType::Bool, Bson::String(s)) => s.trim().parse().ok().map(Value::Bool),

            (SimpleType::Int32, Bson::Int32(i)) => Some(Value::Int32(*i)),
            (SimpleType::Int32, Bson::Int64(i)) => i32::try_from(*i).ok().map(Value::Int32),
            (SimpleType::Int32, Bson::Double(d)) => exact_integer(*d)
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Int32),
            (SimpleType::Int32, Bson::String(s)) => s.trim().parse().ok().map(Value::Int32),

            (SimpleType::Int64, Bson::Int32(i)) => Some(Value::Int64((*i).into())),
            (SimpleType::Int64, Bson::Int64(i)) => Some(Value::Int64(*i)),
            (SimpleType::Int64, Bson::Double(d)) => exact_integer(*d).map(Value::Int64),
            (SimpleType::Int64, Bson::DateTime(dt)) => Some(Value::Int64(dt.timestamp_millis())),
            (SimpleType::Int64, Bson::String(s)) => s.trim().parse().ok().map(Value::Int64),

            (SimpleType::Double, Bson::Int32(i)) => Some(Value::Double((*i).into())),
            (SimpleType::Double, Bson::Int64(i)) => Some(Value::Double(*i as f64)),
            (SimpleType::Double, Bson::Double(d)) => Some(Value::Double(*d)),
            (SimpleType::Double, Bson::String(s)) => s.trim().parse().ok().map(Value::Double),

            (SimpleType::Binary, Bson::Binary(binary)) => Some(Value::Binary(binary.bytes.clone())),

            (SimpleType::ObjectId, Bson::ObjectId(oid)) => Some(Value::ObjectId(*oid)),
            (SimpleType::ObjectId, Bson::String(s)) => {
                ObjectId::parse_str(s).ok().map(Value::ObjectId)
            }

            (SimpleType::Uuid, Bson::Binary(binary)) if binary.subtype == BinarySubtype::Uuid => {
                <[u8; 16]>::try_from(binary.bytes.as_slice())
                    .ok()
                    .map(|bytes| Value::Uuid(Uuid::from_bytes(bytes)))
            }
            (SimpleType::Uuid, Bson::String(s)) => uuid::Uuid::parse_str(s.trim())
                .ok()
                .map(|u| Value::Uuid(Uuid::from_bytes(*u.as_bytes()))),

            (SimpleType::DateTime, Bson::DateTime(dt)) => Some(Value::DateTime(*dt)),
            (SimpleType::DateTime, Bson::Int64(ms)) => Some(Value::DateTime(DateTime::from_millis(*ms))),
            (SimpleType::DateTime, Bson::Int32(ms)) => {
                Some(Value::DateTime(DateTime::from_millis((*ms).into())))
            }
            (SimpleType::DateTime, Bson::String(s)) => chrono::DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| Value::DateTime(DateTime::from_chrono(dt.with_timezone(&Utc)))),

            _ => None,
        };

        value.ok_or_else(|| fail(source, target.name()))
    }

    fn to_enum(&self, source: &Bson, target: &EnumType) -> MappingResult<Value> {
        let name = match source {
            Bson::String(s) => s.as_str(),
            other => return Err(fail(other, target.name())),
        };

        target
            .variant(name)
            .map(|variant| Value::Enum(EnumValue::new(target.name(), variant)))
            .ok_or_else(|| MappingError::UnknownEnumVariant(target.name().to_string(), name.to_string()))
    }
}

fn exact_integer(d: f64) -> Option<i64> {
    (d.fract() == 0.0 && d >= i64::MIN as f64 && d < i64::MAX as f64).then_some(d as i64)
}

impl ConversionService for DefaultConversionService {
    fn convert(&self, source: &Bson, target: &TypeInfo) -> MappingResult<Value> {
        if matches!(source, Bson::Null | Bson::Undefined) {
            return Ok(Value::Null);
        }

        match target {
            TypeInfo::Any => {
                Value::from_scalar(source).ok_or_else(|| fail(source, target))
            }
            TypeInfo::Simple(simple) => self.to_simple(source, *simple),
            TypeInfo::Enum(enum_type) => self.to_enum(source, enum_type),
            TypeInfo::Record => match source {
                Bson::Document(doc) => Ok(Value::Record(doc.clone())),
                other => Err(fail(other, target)),
            },
            other => Err(fail(source, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(source: Bson, target: SimpleType) -> MappingResult<Value> {
        DefaultConversionService.convert(&source, &TypeInfo::Simple(target))
    }

    #[test]
    fn numeric_widening_and_narrowing() {
        assert_eq!(convert(Bson::Int32(3), SimpleType::Int64).unwrap(), Value::Int64(3));
        assert_eq!(convert(Bson::Int64(3), SimpleType::Int32).unwrap(), Value::Int32(3));
        assert!(convert(Bson::Int64(i64::MAX), SimpleType::Int32).is_err());
        assert_eq!(convert(Bson::Double(4.0), SimpleType::Int32).unwrap(), Value::Int32(4));
        assert!(convert(Bson::Double(4.5), SimpleType::Int64).is_err());
        assert_eq!(convert(Bson::Int32(2), SimpleType::Double).unwrap(), Value::Double(2.0));
    }

    #[test]
    fn strings_parse_and_render() {
        let oid = ObjectId::new();
        assert_eq!(
            convert(Bson::String(oid.to_hex()), SimpleType::ObjectId).unwrap(),
            Value::ObjectId(oid)
        );
        assert_eq!(
            convert(Bson::ObjectId(oid), SimpleType::String).unwrap(),
            Value::String(oid.to_hex())
        );
        assert_eq!(convert(Bson::String("42".into()), SimpleType::Int32).unwrap(), Value::Int32(42));
        assert_eq!(convert(Bson::String("true".into()), SimpleType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(convert(Bson::Int64(9), SimpleType::String).unwrap(), Value::String("9".into()));
        assert!(convert(Bson::String("nope".into()), SimpleType::Double).is_err());
    }

    #[test]
    fn uuids_and_datetimes() {
        let uuid = Uuid::new();
        assert_eq!(
            convert(Bson::String(uuid.to_string()), SimpleType::Uuid).unwrap(),
            Value::Uuid(uuid)
        );

        let at = DateTime::from_millis(1_700_000_000_000);
        assert_eq!(convert(Bson::Int64(1_700_000_000_000), SimpleType::DateTime).unwrap(), Value::DateTime(at));
        assert_eq!(convert(Bson::DateTime(at), SimpleType::Int64).unwrap(), Value::Int64(1_700_000_000_000));

        let rendered = convert(Bson::DateTime(at), SimpleType::String).unwrap();
        let Value::String(text) = rendered else { panic!("expected a string") };
        assert_eq!(
            convert(Bson::String(text), SimpleType::DateTime).unwrap(),
            Value::DateTime(at)
        );
    }

    #[test]
    fn enums_by_variant_name() {
        let color = TypeInfo::Enum(EnumType::new("Color", ["Red", "Green"]));
        assert_eq!(
            DefaultConversionService.convert(&Bson::String("Red".into()), &color).unwrap(),
            Value::Enum(EnumValue::new("Color", "Red"))
        );
        assert_eq!(
            DefaultConversionService.convert(&Bson::String("Blue".into()), &color).unwrap_err(),
            MappingError::UnknownEnumVariant("Color".into(), "Blue".into())
        );
    }

    #[test]
    fn null_and_unsupported_targets() {
        assert_eq!(convert(Bson::Null, SimpleType::Int32).unwrap(), Value::Null);
        assert!(!DefaultConversionService.can_convert(&Bson::Int32(1), &TypeInfo::list(TypeInfo::Any)));
        assert!(DefaultConversionService.can_convert(&Bson::Int32(1), &TypeInfo::Any));
    }
}
