//! Serializable view of a registry's catalog.
//!
//! Produced by [`OperationRegistry::snapshot`](crate::OperationRegistry::snapshot)
//! and rendered as JSON by the registry's `Display` impl and the
//! `registry-inspect` binary.

use opreg_core::{DescriptorKind, FactoryRef};
use serde::Serialize;

use crate::table::{ProductView, RegistrationTable};

/// Every mode, in definition order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub modes: Vec<ModeSnapshot>,
}

impl RegistrySnapshot {
    /// Looks up a mode by (caseless) name.
    #[must_use]
    pub fn mode(&self, name: &str) -> Option<&ModeSnapshot> {
        self.modes.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

/// One mode and the operations declared for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeSnapshot {
    pub name: String,
    pub descriptor_kind: DescriptorKind,
    pub supports_preferences: bool,
    pub supports_properties: bool,
    pub factory_type: String,
    pub operations: Vec<OperationSnapshot>,
}

/// One declared operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSnapshot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub products: Vec<ProductSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub product_preferences: Vec<PreferenceSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_properties: Option<Vec<String>>,
}

/// Factories of one namespace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Registration order.
    pub factories: Vec<FactorySnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preferences: Vec<PreferenceSnapshot>,
    /// Preference order; `None` if the preferences are cyclic.
    pub resolved: Option<Vec<String>>,
}

/// A registered factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorySnapshot {
    pub id: String,
    pub type_name: String,
}

/// A `preferred -> other` edge by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferenceSnapshot {
    pub preferred: String,
    pub other: String,
}

fn label(factory: &FactoryRef) -> String {
    format!("{}@{}", factory.type_name(), factory.id())
}

impl From<&FactoryRef> for FactorySnapshot {
    fn from(factory: &FactoryRef) -> Self {
        Self {
            id: factory.id().to_string(),
            type_name: factory.type_name().to_string(),
        }
    }
}

impl From<&ProductView> for ProductSnapshot {
    fn from(view: &ProductView) -> Self {
        Self {
            namespace: view.namespace_name().map(str::to_string),
            factories: view.factories.iter().map(FactorySnapshot::from).collect(),
            preferences: view
                .edges
                .iter()
                .map(|(p, o)| PreferenceSnapshot {
                    preferred: label(p),
                    other: label(o),
                })
                .collect(),
            resolved: view.resolve().map(|order| order.iter().map(label).collect()),
        }
    }
}

impl ModeSnapshot {
    /// Captures one mode's table.
    #[must_use]
    pub fn from_table(table: &RegistrationTable) -> Self {
        let mode = table.mode();
        let operations = table
            .descriptors()
            .filter_map(|descriptor| {
                let name = descriptor.name().name();
                let view = table.operation_view(name).ok()?;
                Some(OperationSnapshot {
                    name: name.to_string(),
                    vendor: descriptor.vendor().map(str::to_string),
                    products: view.products.iter().map(ProductSnapshot::from).collect(),
                    product_preferences: view
                        .product_edges
                        .iter()
                        .map(|(p, o)| PreferenceSnapshot {
                            preferred: p.name().to_string(),
                            other: o.name().to_string(),
                        })
                        .collect(),
                    generated_properties: table
                        .properties(name)
                        .ok()
                        .map(|state| state.generated_names()),
                })
            })
            .collect();

        Self {
            name: mode.name().name().to_string(),
            descriptor_kind: mode.descriptor_kind(),
            supports_preferences: mode.supports_preferences(),
            supports_properties: mode.supports_properties(),
            factory_type: mode.factory_type_name().to_string(),
            operations,
        }
    }
}
