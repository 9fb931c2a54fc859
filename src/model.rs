//! The boundary to the entity/property model and the lookups made against it.

use crate::ast::{NodeId, NodeKind, QueryAst, ScalarValue, Term};
use crate::error::{CompileError, ConversionError, Result};
use crate::value::TypedValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub identifier: String,
    pub uri: String,
}

/// Declared storage type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProperty {
    pub uri: String,
    pub property_id: String,
    #[serde(default)]
    pub data_type: PropertyType,
}

/// Read-only access to the searchable model. Implementations may cache; the
/// compiler never does.
pub trait ModelContext {
    fn type_by_external_name(&self, name: &str) -> Option<EntityType>;

    fn property_by_external_name(&self, type_id: &str, field_uri: &str) -> Option<EntityProperty>;

    /// Maps an external field id and raw value to the internal field id and
    /// an internally typed value.
    fn convert_value(
        &self,
        field_id: &str,
        raw: ScalarValue,
        type_id: &str,
    ) -> std::result::Result<(String, TypedValue), ConversionError>;
}

/// Resolves types and properties for the rule builder.
pub struct ModelResolver<'m> {
    model: &'m dyn ModelContext,
    type_field: &'m str,
}

impl<'m> ModelResolver<'m> {
    pub fn new(model: &'m dyn ModelContext, type_field: &'m str) -> Self {
        Self { model, type_field }
    }

    pub fn model(&self) -> &'m dyn ModelContext {
        self.model
    }

    pub fn is_type_field(&self, field: &str) -> bool {
        field == self.type_field
    }

    pub fn resolve_type(&self, name: &str) -> Result<EntityType> {
        self.model
            .type_by_external_name(name)
            .ok_or_else(|| CompileError::UnresolvedType { type_name: name.to_string() })
    }

    pub fn resolve_property(&self, entity: &EntityType, field: &str) -> Result<EntityProperty> {
        self.model
            .property_by_external_name(&entity.identifier, field)
            .ok_or_else(|| CompileError::UnresolvedProperty {
                field: field.to_string(),
                type_name: entity.identifier.clone(),
            })
    }

    /// Looks for a type constraint governing `node`: each ancestor's direct
    /// children are checked, nearest ancestor first, and the first type
    /// leaf wins.
    pub fn find_type_constraint<'a>(&self, ast: &'a QueryAst, node: NodeId) -> Option<&'a Term> {
        ast.ancestors(node).find_map(|ancestor| {
            ast.children(ancestor).iter().find_map(|child| match ast.kind(*child) {
                NodeKind::Field { field, term } if self.is_type_field(field) => Some(term),
                _ => None,
            })
        })
    }
}
