//! Inbound action request types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of a service entity referenced by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    ContainerPod,
    Container,
    Application,
    VirtualApplication,
    VirtualMachine,
    PhysicalMachine,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ContainerPod => "ContainerPod",
            Self::Container => "Container",
            Self::Application => "Application",
            Self::VirtualApplication => "VirtualApplication",
            Self::VirtualMachine => "VirtualMachine",
            Self::PhysicalMachine => "PhysicalMachine",
        };
        f.write_str(name)
    }
}

/// Kind of action requested by the analysis engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionItemType {
    Start,
    Move,
    Suspend,
    Provision,
    Reconfigure,
    Resize,
}

impl fmt::Display for ActionItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::Move => "MOVE",
            Self::Suspend => "SUSPEND",
            Self::Provision => "PROVISION",
            Self::Reconfigure => "RECONFIGURE",
            Self::Resize => "RESIZE",
        };
        f.write_str(name)
    }
}

/// A commodity an entity buys from a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityBought {
    pub provider_id: String,
    pub provider_type: EntityType,
}

/// Reference to a service entity in the upstream supply chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub commodities_bought: Vec<CommodityBought>,
}

impl EntityRef {
    #[must_use]
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: String::new(),
            entity_type,
            commodities_bought: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn buying_from(mut self, provider_type: EntityType, provider_id: impl Into<String>) -> Self {
        self.commodities_bought.push(CommodityBought {
            provider_id: provider_id.into(),
            provider_type,
        });
        self
    }

    /// Human readable name, falling back to the id
    #[must_use]
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

/// Providers of one entity type offered for an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub entity_type: EntityType,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// A single action recommendation. Never mutated after it is received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub uid: String,
    pub action_type: ActionItemType,
    #[serde(rename = "targetSE")]
    pub target_se: EntityRef,
    #[serde(default, rename = "currentSE")]
    pub current_se: Option<EntityRef>,
    #[serde(default)]
    pub providers: Vec<ProviderInfo>,
}

impl ActionItem {
    #[must_use]
    pub fn new(uid: impl Into<String>, action_type: ActionItemType, target_se: EntityRef) -> Self {
        Self {
            uid: uid.into(),
            action_type,
            target_se,
            current_se: None,
            providers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_current(mut self, current_se: EntityRef) -> Self {
        self.current_se = Some(current_se);
        self
    }

    #[must_use]
    pub fn with_providers(mut self, entity_type: EntityType, ids: &[&str]) -> Self {
        self.providers.push(ProviderInfo {
            entity_type,
            ids: ids.iter().map(ToString::to_string).collect(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_provision_request() {
        let json = r#"{
            "uid": "action-42",
            "actionType": "PROVISION",
            "targetSE": {
                "id": "app-1",
                "displayName": "frontend",
                "entityType": "APPLICATION"
            },
            "providers": [
                { "entityType": "VIRTUAL_MACHINE", "ids": ["vm-1"] },
                { "entityType": "CONTAINER_POD", "ids": ["pod-uid-1", "pod-uid-2"] }
            ]
        }"#;

        let item: ActionItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.action_type, ActionItemType::Provision);
        assert_eq!(item.target_se.entity_type, EntityType::Application);
        assert_eq!(item.target_se.label(), "frontend");
        assert!(item.current_se.is_none());
        assert_eq!(item.providers.len(), 2);
        assert_eq!(item.providers[1].ids, vec!["pod-uid-1", "pod-uid-2"]);
    }

    #[test]
    fn deserializes_unbind_request_with_current_entity() {
        let json = r#"{
            "uid": "action-43",
            "actionType": "MOVE",
            "targetSE": { "id": "vapp-1", "entityType": "VIRTUAL_APPLICATION" },
            "currentSE": {
                "id": "app-1",
                "entityType": "APPLICATION",
                "commoditiesBought": [
                    { "providerId": "pod-uid-9", "providerType": "CONTAINER_POD" }
                ]
            }
        }"#;

        let item: ActionItem = serde_json::from_str(json).unwrap();
        let current = item.current_se.expect("current entity");
        assert_eq!(current.label(), "app-1");
        assert_eq!(current.commodities_bought[0].provider_id, "pod-uid-9");
    }

    #[test]
    fn unknown_action_type_is_rejected_by_deserialization() {
        let json = r#"{
            "uid": "a",
            "actionType": "TELEPORT",
            "targetSE": { "id": "p", "entityType": "CONTAINER_POD" }
        }"#;
        assert!(serde_json::from_str::<ActionItem>(json).is_err());
    }
}
