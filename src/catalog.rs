//! In-memory model loaded from JSON, implementing [`ModelContext`].

use crate::ast::ScalarValue;
use crate::config::{read_json, ConfigError};
use crate::error::ConversionError;
use crate::model::{EntityProperty, EntityType, ModelContext, PropertyType};
use crate::value::{DateFormat, TypedValue};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Name used in queries.
    pub name: String,
    pub uri: String,
    pub property_id: String,
    #[serde(default)]
    pub data_type: PropertyType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Name used in queries.
    pub name: String,
    pub identifier: String,
    pub uri: String,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub date_format: DateFormat,
}

impl ModelCatalog {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_json(path)
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn type_def(&self, identifier: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.identifier == identifier)
    }

    fn coerce(
        &self,
        property: &PropertyDef,
        raw: ScalarValue,
    ) -> Result<TypedValue, ConversionError> {
        let reject = |raw: &ScalarValue, reason: &str| ConversionError {
            field: property.name.clone(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        match (property.data_type, raw) {
            (_, raw @ ScalarValue::Null) => Err(reject(&raw, "null is only allowed as an open range bound")),
            (_, raw @ ScalarValue::List(_)) => Err(reject(&raw, "nested lists are not supported")),

            (PropertyType::String, ScalarValue::Date(dt)) => {
                Ok(TypedValue::Literal(self.date_format.format(&dt)))
            }
            (PropertyType::String, raw) => Ok(TypedValue::Literal(raw.to_string())),

            (PropertyType::Number, ScalarValue::Integer(n)) => Ok(TypedValue::Integer(n)),
            (PropertyType::Number, ScalarValue::Float(x)) if x.is_finite() => Ok(TypedValue::Float(x)),
            (PropertyType::Number, ScalarValue::String(s)) => match s.parse::<i64>() {
                Ok(n) => Ok(TypedValue::Integer(n)),
                Err(_) => match s.parse::<f64>() {
                    Ok(x) if x.is_finite() => Ok(TypedValue::Float(x)),
                    _ => Err(reject(&ScalarValue::String(s), "expected a finite number")),
                },
            },
            (PropertyType::Number, raw) => Err(reject(&raw, "expected a number")),

            (PropertyType::Boolean, ScalarValue::Boolean(b)) => Ok(TypedValue::Literal(b.to_string())),
            (PropertyType::Boolean, ScalarValue::String(s))
                if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") =>
            {
                Ok(TypedValue::Literal(s.to_ascii_lowercase()))
            }
            (PropertyType::Boolean, raw) => Err(reject(&raw, "expected true or false")),

            (PropertyType::Date, ScalarValue::Date(dt)) => Ok(TypedValue::date_time(&dt)),
            (PropertyType::Date, ScalarValue::String(s)) => match self.date_format.parse(&s) {
                Ok(dt) => Ok(TypedValue::date_time(&dt)),
                Err(e) => Err(reject(&ScalarValue::String(s), &format!("expected a date: {e}"))),
            },
            (PropertyType::Date, raw) => Err(reject(&raw, "expected a date")),

            (PropertyType::Reference, raw @ (ScalarValue::String(_) | ScalarValue::Integer(_))) => {
                Ok(TypedValue::Object(raw.to_string()))
            }
            (PropertyType::Reference, raw) => Err(reject(&raw, "expected a reference")),
        }
    }
}

impl ModelContext for ModelCatalog {
    fn type_by_external_name(&self, name: &str) -> Option<EntityType> {
        self.types
            .iter()
            .find(|t| t.name == name || t.uri == name)
            .map(|t| EntityType { identifier: t.identifier.clone(), uri: t.uri.clone() })
    }

    fn property_by_external_name(&self, type_id: &str, field_uri: &str) -> Option<EntityProperty> {
        self.type_def(type_id)?
            .properties
            .iter()
            .find(|p| p.name == field_uri || p.uri == field_uri)
            .map(|p| EntityProperty {
                uri: p.uri.clone(),
                property_id: p.property_id.clone(),
                data_type: p.data_type,
            })
    }

    fn convert_value(
        &self,
        field_id: &str,
        raw: ScalarValue,
        type_id: &str,
    ) -> Result<(String, TypedValue), ConversionError> {
        let property = self
            .type_def(type_id)
            .and_then(|t| t.properties.iter().find(|p| p.uri == field_id))
            .ok_or_else(|| ConversionError {
                field: field_id.to_string(),
                value: raw.to_string(),
                reason: format!("no such property on '{type_id}'"),
            })?;
        let value = self.coerce(property, raw)?;
        Ok((property.property_id.clone(), value))
    }
}
