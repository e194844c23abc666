use std::collections::{BTreeMap, BTreeSet};

use super::manifest::{self, ManifestSet};
use super::version::{self, GenericVersion, PlatformVersion, VersionError};
use super::Component;
use crate::config::Overrides;

/// A component with its resolved version and manifests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    pub component: Component,
    pub version: String,
    pub manifests: ManifestSet,
}

impl InventoryItem {
    pub fn new(
        component: Component,
        version: impl Into<String>,
        region_cn: bool,
        overrides: &Overrides,
    ) -> Result<Self, VersionError> {
        let version = version.into();
        let manifests = manifest::locate(component, &version, region_cn, overrides)?;
        Ok(Self {
            component,
            version,
            manifests,
        })
    }
}

/// Everything one run acts on, keyed by component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    items: BTreeMap<Component, InventoryItem>,
}

impl Inventory {
    /// Resolve versions for an install on a cluster running `server`
    pub fn for_install(
        selection: &BTreeSet<Component>,
        server: &GenericVersion,
        platform: &PlatformVersion,
        region_cn: bool,
        overrides: &Overrides,
    ) -> Result<Self, VersionError> {
        let mut inventory = Inventory::default();
        for &component in selection {
            let version = if component.is_platform() {
                platform.to_string()
            } else {
                version::resolve(component, server, overrides)
            };
            inventory.insert(InventoryItem::new(component, version, region_cn, overrides)?);
        }
        Ok(inventory)
    }

    /// Rebuild items for an uninstall from the versions that were recorded
    pub fn from_recorded(
        recorded: &BTreeMap<Component, String>,
        region_cn: bool,
        overrides: &Overrides,
    ) -> Result<Self, VersionError> {
        let mut inventory = Inventory::default();
        for (&component, version) in recorded {
            inventory.insert(InventoryItem::new(
                component,
                version.clone(),
                region_cn,
                overrides,
            )?);
        }
        Ok(inventory)
    }

    pub fn insert(&mut self, item: InventoryItem) {
        self.items.insert(item.component, item);
    }

    pub fn get(&self, component: Component) -> Option<&InventoryItem> {
        self.items.get(&component)
    }

    pub fn contains(&self, component: Component) -> bool {
        self.items.contains_key(&component)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryItem> {
        self.items.values()
    }

    pub fn components(&self) -> BTreeSet<Component> {
        self.items.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keep only the components in `keep`
    pub fn retain(&mut self, keep: &BTreeSet<Component>) {
        self.items.retain(|component, _| keep.contains(component));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ManifestRole;

    fn server() -> GenericVersion {
        GenericVersion::new(1, 20, 4)
    }

    #[test]
    fn test_install_inventory_versions() {
        let selection = BTreeSet::from([
            Component::OpenFunction,
            Component::KnativeServing,
            Component::TektonPipelines,
            Component::Dapr,
        ]);
        let inventory = Inventory::for_install(
            &selection,
            &server(),
            &PlatformVersion::default(),
            false,
            &Overrides::default(),
        )
        .unwrap();

        assert_eq!(inventory.len(), 4);
        assert_eq!(
            inventory.get(Component::OpenFunction).unwrap().version,
            "0.4.0"
        );
        assert_eq!(
            inventory.get(Component::KnativeServing).unwrap().version,
            "1.0.1"
        );
        assert_eq!(
            inventory.get(Component::TektonPipelines).unwrap().version,
            "0.30.0"
        );
        assert!(inventory.get(Component::Dapr).unwrap().manifests.is_empty());
        assert!(!inventory.contains(Component::Keda));
    }

    #[test]
    fn test_latest_platform() {
        let selection = BTreeSet::from([Component::OpenFunction]);
        let inventory = Inventory::for_install(
            &selection,
            &server(),
            &PlatformVersion::Latest,
            false,
            &Overrides::default(),
        )
        .unwrap();
        let item = inventory.get(Component::OpenFunction).unwrap();
        assert_eq!(item.version, "latest");
        assert!(item.manifests[&ManifestRole::Main].contains("/main/config/bundle.yaml"));
    }

    #[test]
    fn test_from_recorded_uses_recorded_versions() {
        let recorded = BTreeMap::from([
            (Component::KnativeServing, "0.23.3".to_string()),
            (Component::Keda, "2.5.0".to_string()),
        ]);
        let inventory = Inventory::from_recorded(&recorded, false, &Overrides::default()).unwrap();
        let knative = inventory.get(Component::KnativeServing).unwrap();
        assert!(knative.manifests[&ManifestRole::Crd].contains("/v0.23.3/"));
        assert!(inventory.get(Component::Keda).unwrap().manifests[&ManifestRole::Main]
            .contains("keda-2.5.0.yaml"));
    }

    #[test]
    fn test_retain() {
        let recorded = BTreeMap::from([
            (Component::Keda, "2.4.0".to_string()),
            (Component::Dapr, "1.5.1".to_string()),
        ]);
        let mut inventory =
            Inventory::from_recorded(&recorded, false, &Overrides::default()).unwrap();
        inventory.retain(&BTreeSet::from([Component::Dapr]));
        assert_eq!(inventory.components(), BTreeSet::from([Component::Dapr]));
    }
}
