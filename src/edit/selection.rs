//! In-memory model of the fields chosen for a bulk edit and their values.
//!
//! A field is *active* exactly when it has an entry in the value map, so the
//! active set and the stored values can never drift apart.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::edit::catalog::{EditKind, EditableFieldDescriptor, FieldCatalog, OptionSource};
use crate::edit::tenant::{SelectOption, TenantConfig};

/// Option collections supplied at runtime, keyed by the descriptor's
/// dynamic option key (e.g. `"proveedores"`).
pub type DynamicOptions = HashMap<String, Vec<SelectOption>>;

/// Dynamic keys that fall back to lists derived from the tenant.
const TENANT_SUB_ENTITIES_KEY: &str = "subempresas";
const TENANT_CURRENCIES_KEY: &str = "monedas";

// ─────────────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────────────

/// Arithmetic applied to a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericOperator {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
    /// Adjust by a percentage (`value = 10` means +10%).
    Percent,
}

impl NumericOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            NumericOperator::Set => "set",
            NumericOperator::Add => "add",
            NumericOperator::Subtract => "subtract",
            NumericOperator::Multiply => "multiply",
            NumericOperator::Divide => "divide",
            NumericOperator::Percent => "percent",
        }
    }
}

impl FromStr for NumericOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(NumericOperator::Set),
            "add" => Ok(NumericOperator::Add),
            "subtract" => Ok(NumericOperator::Subtract),
            "multiply" => Ok(NumericOperator::Multiply),
            "divide" => Ok(NumericOperator::Divide),
            "percent" => Ok(NumericOperator::Percent),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// Change applied to a date field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOperator {
    Set,
    AddDays,
    SubtractDays,
}

impl DateOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            DateOperator::Set => "set",
            DateOperator::AddDays => "add_days",
            DateOperator::SubtractDays => "subtract_days",
        }
    }
}

impl FromStr for DateOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(DateOperator::Set),
            "add_days" => Ok(DateOperator::AddDays),
            "subtract_days" => Ok(DateOperator::SubtractDays),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// Operator name not recognised for the field kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operator '{}'", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

// ─────────────────────────────────────────────────────────────────────────────
// Edit Values
// ─────────────────────────────────────────────────────────────────────────────

/// Pending `{op, value}` for a numeric field. `value` is the raw decimal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericEdit {
    pub op: Option<NumericOperator>,
    pub value: String,
}

/// Pending `{op, value}` for a date field. `value` is `YYYY-MM-DD` for `set`
/// and a day count for the relative operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateEdit {
    pub op: Option<DateOperator>,
    pub value: Option<String>,
}

/// The user's chosen mutation for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEditValue {
    Numeric(NumericEdit),
    Date(DateEdit),
    Scalar(String),
}

impl FieldEditValue {
    /// Default value a field starts with when it is toggled on.
    pub fn default_for(kind: EditKind) -> Self {
        match kind {
            EditKind::NumericOperation => FieldEditValue::Numeric(NumericEdit {
                op: Some(NumericOperator::Set),
                value: String::new(),
            }),
            EditKind::DateOperation => FieldEditValue::Date(DateEdit {
                op: Some(DateOperator::Set),
                value: None,
            }),
            EditKind::SingleSelect | EditKind::FreeTextWithSuggestions | EditKind::PlainText => {
                FieldEditValue::Scalar(String::new())
            }
        }
    }

    /// A value is complete when its operator (if any) is chosen and its
    /// operand is non-empty.
    pub fn is_complete(&self) -> bool {
        match self {
            FieldEditValue::Numeric(edit) => edit.op.is_some() && !edit.value.trim().is_empty(),
            FieldEditValue::Date(edit) => {
                edit.op.is_some()
                    && edit.value.as_deref().is_some_and(|v| !v.trim().is_empty())
            }
            FieldEditValue::Scalar(value) => !value.is_empty(),
        }
    }
}

/// Which half of an `{op, value}` pair to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKey {
    Op,
    Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// FieldSelection
// ─────────────────────────────────────────────────────────────────────────────

/// Active fields and their pending values for one bulk edit.
#[derive(Debug, Clone)]
pub struct FieldSelection {
    catalog: Arc<FieldCatalog>,
    values: HashMap<String, FieldEditValue>,
}

impl FieldSelection {
    pub fn new(catalog: Arc<FieldCatalog>) -> Self {
        Self {
            catalog,
            values: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Activates the field with its kind default, or deactivates it and drops
    /// its value. Names not in the catalog are ignored.
    pub fn toggle_field(&mut self, name: &str) {
        if self.values.remove(name).is_some() {
            return;
        }
        if let Some(descriptor) = self.catalog.get(name) {
            self.values
                .insert(name.to_string(), FieldEditValue::default_for(descriptor.kind));
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Active field names in catalog order.
    pub fn active_fields(&self) -> Vec<&str> {
        self.catalog
            .fields()
            .iter()
            .filter(|f| self.values.contains_key(&f.name))
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn value(&self, name: &str) -> Option<&FieldEditValue> {
        self.values.get(name)
    }

    /// Replaces the value of an active select/text field. Operation fields
    /// and inactive fields are left untouched.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) {
        if let Some(FieldEditValue::Scalar(current)) = self.values.get_mut(name) {
            *current = value.into();
        }
    }

    /// Updates one half of an operation field, keeping the other half.
    ///
    /// `None` clears that half. An operator name that does not belong to the
    /// field's kind clears the operator, leaving the field incomplete.
    pub fn set_operation_field(&mut self, name: &str, key: OperationKey, value: Option<&str>) {
        match (self.values.get_mut(name), key) {
            (Some(FieldEditValue::Numeric(edit)), OperationKey::Op) => {
                edit.op = value.and_then(|v| v.parse().ok());
            }
            (Some(FieldEditValue::Numeric(edit)), OperationKey::Value) => {
                edit.value = value.unwrap_or_default().to_string();
            }
            (Some(FieldEditValue::Date(edit)), OperationKey::Op) => {
                edit.op = value.and_then(|v| v.parse().ok());
            }
            (Some(FieldEditValue::Date(edit)), OperationKey::Value) => {
                edit.value = value.map(str::to_string);
            }
            _ => {}
        }
    }

    /// True iff at least one active field holds a complete value.
    pub fn is_ready_to_submit(&self) -> bool {
        self.values.values().any(FieldEditValue::is_complete)
    }

    /// Drops every active field and value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Resolves the options offered by a select/autocomplete field.
///
/// Order of preference: static list on the descriptor, then the named
/// collection in `dynamic`, then lists derived from the tenant for the
/// designated keys. Anything else yields an empty list.
pub fn resolve_options(
    descriptor: &EditableFieldDescriptor,
    dynamic: &DynamicOptions,
    tenant: &TenantConfig,
) -> Vec<SelectOption> {
    match &descriptor.options {
        Some(OptionSource::Static(options)) => options.clone(),
        Some(OptionSource::Dynamic(key)) => {
            if let Some(options) = dynamic.get(key) {
                return options.clone();
            }
            match key.as_str() {
                TENANT_SUB_ENTITIES_KEY => tenant
                    .sub_entities
                    .iter()
                    .cloned()
                    .map(SelectOption::plain)
                    .collect(),
                TENANT_CURRENCIES_KEY => tenant
                    .currencies
                    .iter()
                    .cloned()
                    .map(SelectOption::plain)
                    .collect(),
                _ => Vec::new(),
            }
        }
        None => Vec::new(),
    }
}
