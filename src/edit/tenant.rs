//! Tenant configuration consulted by the field catalog.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A selectable option for select/autocomplete fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Value sent to the server.
    pub value: String,
    /// Label shown to the user.
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    /// Option whose label is the value itself.
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

/// Per-tenant settings that affect which fields are editable and which
/// options they offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    pub name: String,
    /// Sub-entities (e.g. subsidiaries) the tenant books movements against.
    #[serde(default)]
    pub sub_entities: Vec<String>,
    /// Currencies enabled for this tenant.
    #[serde(default)]
    pub currencies: Vec<String>,
    /// Feature flags enabled for this tenant.
    #[serde(default)]
    pub features: HashSet<String>,
}

impl TenantConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_sub_entities<I, S>(mut self, sub_entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_entities = sub_entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_currencies<I, S>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.currencies = currencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// More than one currency means amounts can be re-labelled per movement.
    pub fn is_multi_currency(&self) -> bool {
        self.currencies.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_all_fields() {
        let tenant = TenantConfig::new("t1", "Constructora Sur")
            .with_sub_entities(["Norte", "Sur"])
            .with_currencies(["ARS", "USD"])
            .with_feature("etapas");

        assert_eq!(tenant.sub_entities, vec!["Norte", "Sur"]);
        assert!(tenant.is_multi_currency());
        assert!(tenant.has_feature("etapas"));
        assert!(!tenant.has_feature("proyecciones"));
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let tenant: TenantConfig =
            serde_json::from_str(r#"{"id":"t1","name":"Acme"}"#).unwrap();
        assert!(tenant.sub_entities.is_empty());
        assert!(!tenant.is_multi_currency());
    }
}
