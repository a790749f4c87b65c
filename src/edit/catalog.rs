//! Catalog of record fields that can be bulk edited.
//!
//! The catalog is built once and never mutated. Tenants see a filtered view
//! through [`FieldCatalog::visible_for`].

use std::collections::HashSet;

use serde::Serialize;

use crate::edit::tenant::{SelectOption, TenantConfig};
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Descriptor Types
// ─────────────────────────────────────────────────────────────────────────────

/// How a field is edited in bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    /// Numeric value combined with an arithmetic operator.
    NumericOperation,
    /// Date that is either replaced or shifted by a number of days.
    DateOperation,
    /// One value out of a fixed or supplied option list.
    SingleSelect,
    /// Free text with suggested values.
    FreeTextWithSuggestions,
    /// Free text.
    PlainText,
}

impl EditKind {
    /// Whether the field stores an `{op, value}` pair instead of a plain value.
    pub fn is_operation(self) -> bool {
        matches!(self, EditKind::NumericOperation | EditKind::DateOperation)
    }

    /// Whether the field offers an option list.
    pub fn has_options(self) -> bool {
        matches!(self, EditKind::SingleSelect | EditKind::FreeTextWithSuggestions)
    }
}

/// Where a select/autocomplete field gets its options from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    /// Options fixed at catalog construction.
    Static(Vec<SelectOption>),
    /// Key into the option collections supplied by the caller at runtime.
    Dynamic(String),
}

/// Tenant-dependent visibility of a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Always,
    RequiresFeature(String),
    RequiresSubEntities,
    RequiresMultiCurrency,
}

impl Visibility {
    pub fn is_visible(&self, tenant: &TenantConfig) -> bool {
        match self {
            Visibility::Always => true,
            Visibility::RequiresFeature(feature) => tenant.has_feature(feature),
            Visibility::RequiresSubEntities => !tenant.sub_entities.is_empty(),
            Visibility::RequiresMultiCurrency => tenant.is_multi_currency(),
        }
    }
}

/// One editable attribute of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditableFieldDescriptor {
    pub name: String,
    pub label: String,
    pub kind: EditKind,
    pub options: Option<OptionSource>,
    pub visibility: Visibility,
}

impl EditableFieldDescriptor {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: EditKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            options: None,
            visibility: Visibility::Always,
        }
    }

    pub fn with_static_options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = Some(OptionSource::Static(options));
        self
    }

    pub fn with_dynamic_options(mut self, key: impl Into<String>) -> Self {
        self.options = Some(OptionSource::Dynamic(key.into()));
        self
    }

    pub fn visible_when(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FieldCatalog
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable, ordered set of editable fields with unique names.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: Vec<EditableFieldDescriptor>,
}

impl FieldCatalog {
    /// Builds a catalog, rejecting duplicate field names.
    pub fn new(fields: Vec<EditableFieldDescriptor>) -> Result<Self, AppError> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate field '{}' in edit catalog",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&EditableFieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[EditableFieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the sub-catalog visible to the given tenant, preserving order.
    pub fn visible_for(&self, tenant: &TenantConfig) -> FieldCatalog {
        FieldCatalog {
            fields: self
                .fields
                .iter()
                .filter(|f| f.visibility.is_visible(tenant))
                .cloned()
                .collect(),
        }
    }
}

/// Default catalog for cash movements (`movimientos`).
pub fn movement_catalog() -> FieldCatalog {
    use EditKind::*;

    let fields = vec![
        EditableFieldDescriptor::new("fecha_factura", "Invoice date", DateOperation),
        EditableFieldDescriptor::new("fecha_pago", "Payment date", DateOperation),
        EditableFieldDescriptor::new("total", "Total", NumericOperation),
        EditableFieldDescriptor::new("subtotal", "Subtotal", NumericOperation),
        EditableFieldDescriptor::new("iva", "VAT", NumericOperation),
        EditableFieldDescriptor::new("type", "Type", SingleSelect).with_static_options(vec![
            SelectOption::new("ingreso", "Income"),
            SelectOption::new("egreso", "Expense"),
        ]),
        EditableFieldDescriptor::new("estado", "Status", SingleSelect).with_static_options(vec![
            SelectOption::new("Pendiente", "Pending"),
            SelectOption::new("Parcialmente Pagado", "Partially paid"),
            SelectOption::new("Pagado", "Paid"),
        ]),
        EditableFieldDescriptor::new("categoria", "Category", SingleSelect)
            .with_dynamic_options("categorias"),
        EditableFieldDescriptor::new("subcategoria", "Subcategory", FreeTextWithSuggestions)
            .with_dynamic_options("subcategorias"),
        EditableFieldDescriptor::new("nombre_proveedor", "Supplier", FreeTextWithSuggestions)
            .with_dynamic_options("proveedores"),
        EditableFieldDescriptor::new("medio_pago", "Payment method", SingleSelect)
            .with_dynamic_options("medios_pago"),
        EditableFieldDescriptor::new("proyecto", "Project", SingleSelect)
            .with_dynamic_options("proyectos"),
        EditableFieldDescriptor::new("etapa", "Stage", FreeTextWithSuggestions)
            .with_dynamic_options("etapas")
            .visible_when(Visibility::RequiresFeature("etapas".into())),
        EditableFieldDescriptor::new("subempresa", "Sub-entity", SingleSelect)
            .with_dynamic_options("subempresas")
            .visible_when(Visibility::RequiresSubEntities),
        EditableFieldDescriptor::new("moneda", "Currency", SingleSelect)
            .with_dynamic_options("monedas")
            .visible_when(Visibility::RequiresMultiCurrency),
        EditableFieldDescriptor::new("observacion", "Notes", PlainText),
    ];

    FieldCatalog { fields }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_duplicate_names() {
        let result = FieldCatalog::new(vec![
            EditableFieldDescriptor::new("total", "Total", EditKind::NumericOperation),
            EditableFieldDescriptor::new("total", "Total again", EditKind::PlainText),
        ]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn movement_catalog_has_unique_names() {
        let catalog = movement_catalog();
        let rebuilt = FieldCatalog::new(catalog.fields().to_vec());
        assert!(rebuilt.is_ok());
        assert!(!catalog.is_empty());
    }

    #[test]
    fn visible_for_filters_by_tenant() {
        let catalog = movement_catalog();

        let plain = TenantConfig::new("t1", "Plain");
        let visible = catalog.visible_for(&plain);
        assert!(visible.get("total").is_some());
        assert!(visible.get("subempresa").is_none());
        assert!(visible.get("moneda").is_none());
        assert!(visible.get("etapa").is_none());

        let full = TenantConfig::new("t2", "Full")
            .with_sub_entities(["Norte"])
            .with_currencies(["ARS", "USD"])
            .with_feature("etapas");
        let visible = catalog.visible_for(&full);
        assert_eq!(visible.len(), catalog.len());
    }

    #[test]
    fn visible_for_preserves_order() {
        let catalog = movement_catalog();
        let visible = catalog.visible_for(&TenantConfig::default());
        let names: Vec<&str> = visible.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"fecha_factura"));
        assert_eq!(names.last(), Some(&"observacion"));
    }

    #[test]
    fn edit_kind_flags() {
        assert!(EditKind::NumericOperation.is_operation());
        assert!(EditKind::DateOperation.is_operation());
        assert!(!EditKind::SingleSelect.is_operation());
        assert!(EditKind::FreeTextWithSuggestions.has_options());
        assert!(!EditKind::PlainText.has_options());
    }
}
