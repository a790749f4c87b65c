//! Normalization of a [`FieldSelection`] into the payload sent to the
//! bulk-update endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use tracing::warn;

use crate::edit::selection::{DateEdit, DateOperator, FieldEditValue, FieldSelection, NumericEdit};

/// Operand of a resolved operation, serialized as a bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperandValue {
    Number(f64),
    Integer(i64),
    Text(String),
}

/// One field's mutation as the server expects it: `{"op": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOperation {
    pub op: &'static str,
    pub value: OperandValue,
}

/// Mapping from field name to resolved operation. Serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BulkMutationRequest(BTreeMap<String, ResolvedOperation>);

impl BulkMutationRequest {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&ResolvedOperation> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Builds the mutation request from the active fields.
///
/// Incomplete fields are skipped. So are fields whose operand does not parse
/// (logged at `warn`). An empty result means there is nothing to submit and
/// the caller must not contact the server.
pub fn build_request(selection: &FieldSelection) -> BulkMutationRequest {
    let mut resolved = BTreeMap::new();

    for name in selection.active_fields() {
        let Some(value) = selection.value(name) else {
            continue;
        };
        if !value.is_complete() {
            continue;
        }

        let operation = match value {
            FieldEditValue::Numeric(edit) => resolve_numeric(edit),
            FieldEditValue::Date(edit) => resolve_date(edit),
            FieldEditValue::Scalar(text) => Some(ResolvedOperation {
                op: "set",
                value: OperandValue::Text(text.clone()),
            }),
        };

        match operation {
            Some(op) => {
                resolved.insert(name.to_string(), op);
            }
            None => warn!("[BULK-EDIT] Skipping field '{}': operand does not parse", name),
        }
    }

    BulkMutationRequest(resolved)
}

fn resolve_numeric(edit: &NumericEdit) -> Option<ResolvedOperation> {
    let op = edit.op?;
    let value = parse_decimal(&edit.value)?;
    Some(ResolvedOperation {
        op: op.as_str(),
        value: OperandValue::Number(value),
    })
}

fn resolve_date(edit: &DateEdit) -> Option<ResolvedOperation> {
    let op = edit.op?;
    let raw = edit.value.as_deref()?.trim();
    let value = match op {
        DateOperator::Set => OperandValue::Integer(parse_epoch_millis(raw)?),
        DateOperator::AddDays | DateOperator::SubtractDays => {
            OperandValue::Integer(raw.parse::<i64>().ok()?)
        }
    };
    Some(ResolvedOperation {
        op: op.as_str(),
        value,
    })
}

/// Parses a decimal that may use `,` as the decimal separator.
fn parse_decimal(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `YYYY-MM-DD` maps to UTC midnight; RFC 3339 timestamps keep their instant.
fn parse_epoch_millis(raw: &str) -> Option<i64> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
