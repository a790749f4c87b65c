//! Edit model: field catalog, tenant settings, field selection and the
//! normalized mutation request built from it.

pub mod catalog;
pub mod request;
pub mod selection;
pub mod tenant;

pub use catalog::{movement_catalog, EditKind, EditableFieldDescriptor, FieldCatalog, OptionSource, Visibility};
pub use request::{build_request, BulkMutationRequest, OperandValue, ResolvedOperation};
pub use selection::{
    resolve_options, DateEdit, DateOperator, DynamicOptions, FieldEditValue, FieldSelection,
    NumericEdit, NumericOperator, OperationKey,
};
pub use tenant::{SelectOption, TenantConfig};
