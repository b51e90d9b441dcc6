//! Snapshot registry of endpoint definitions.
//!
//! Each group is held as an immutable [`EndpointMap`] behind an `ArcSwap`.
//! Reads are a single atomic load; the first read of a group scans disk
//! behind a lock so concurrent first readers wait for one scan instead of
//! repeating it. Reloads build the replacement snapshot completely before
//! swapping it in, so readers never observe an empty group.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::conflicts::{self, RouteConflict};
use crate::definition::EndpointDefinition;
use crate::kind::EndpointGroup;
use crate::loader::{LoadReport, load_group};

/// Immutable routing-key map of one group.
///
/// Definitions are keyed by their routing key. Namespaced definitions are
/// also reachable by their bare name while no other definition of the group
/// claims that name as its key or shares it in another namespace; those bare
/// entries are kept apart so they are never
/// mistaken for real keys.
#[derive(Debug, Default)]
pub struct EndpointMap {
    primary: IndexMap<String, Arc<EndpointDefinition>>,
    aliases: HashMap<String, Arc<EndpointDefinition>>,
}

impl EndpointMap {
    /// Builds the map from definitions in scan order; a later definition
    /// with the same routing key replaces an earlier one.
    pub fn build(group: EndpointGroup, definitions: Vec<EndpointDefinition>) -> Self {
        let mut primary: IndexMap<String, Arc<EndpointDefinition>> = IndexMap::new();
        for definition in definitions {
            let key = definition.routing_key();
            if let Some(previous) = primary.insert(key.clone(), Arc::new(definition)) {
                warn!(
                    group = %group,
                    key = %key,
                    replaced = %previous.source.display(),
                    "Duplicate routing key within group, last scanned definition wins"
                );
            }
        }

        // A bare name shared by several namespaces is ambiguous and gets no alias.
        let mut candidates: HashMap<&str, Vec<&Arc<EndpointDefinition>>> = HashMap::new();
        for definition in primary.values() {
            if definition.namespace.is_some() && !primary.contains_key(&definition.name) {
                candidates.entry(&definition.name).or_default().push(definition);
            }
        }
        let mut aliases = HashMap::new();
        for (name, owners) in candidates {
            match owners.as_slice() {
                [definition] => {
                    aliases.insert(name.to_string(), Arc::clone(definition));
                }
                _ => warn!(
                    group = %group,
                    name = %name,
                    keys = ?owners.iter().map(|d| d.routing_key()).collect::<Vec<_>>(),
                    "Bare name shared by several namespaces, reachable only by routing key"
                ),
            }
        }

        Self { primary, aliases }
    }

    /// Looks up a routing key, falling back to bare-name aliases.
    pub fn get(&self, key: &str) -> Option<&Arc<EndpointDefinition>> {
        self.primary.get(key).or_else(|| self.aliases.get(key))
    }

    /// Looks up a routing key without the alias fallback.
    pub fn get_primary(&self, key: &str) -> Option<&Arc<EndpointDefinition>> {
        self.primary.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Routing keys, excluding bare-name aliases.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.primary.keys().map(String::as_str)
    }

    /// Each definition once, in scan order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<EndpointDefinition>> {
        self.primary.values()
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }
}

/// A definition matched against an inbound path.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub group: EndpointGroup,
    pub definition: Arc<EndpointDefinition>,
    /// Path segments after the routing key.
    pub remainder: Vec<String>,
}

/// Outcome of a reload: definition count per rebuilt group and the
/// conflicts found afterwards.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadReport {
    pub counts: BTreeMap<EndpointGroup, usize>,
    pub conflicts: Vec<RouteConflict>,
}

/// Registry of all endpoint groups below one definitions root.
pub struct EndpointRegistry {
    root: PathBuf,
    snapshots: [ArcSwapOption<EndpointMap>; EndpointGroup::ALL.len()],
    load_lock: Mutex<()>,
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("root", &self.root)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl EndpointRegistry {
    /// Creates an empty registry; nothing is read until first access.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshots: Default::default(),
            load_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot(&self, group: EndpointGroup) -> &ArcSwapOption<EndpointMap> {
        &self.snapshots[group as usize]
    }

    /// Current snapshot of a group, scanning disk on first access.
    pub async fn get(&self, group: EndpointGroup) -> Arc<EndpointMap> {
        if let Some(map) = self.slot(group).load_full() {
            return map;
        }

        let _guard = self.load_lock.lock().await;
        if let Some(map) = self.slot(group).load_full() {
            return map;
        }

        let map = self.scan(group).await;
        self.slot(group).store(Some(map.clone()));
        map
    }

    /// Snapshots of every group, in precedence order.
    pub async fn get_all(&self) -> Vec<(EndpointGroup, Arc<EndpointMap>)> {
        let mut maps = Vec::with_capacity(EndpointGroup::ALL.len());
        for group in EndpointGroup::ALL {
            maps.push((group, self.get(group).await));
        }
        maps
    }

    /// True once every group has been built at least once.
    pub fn is_ready(&self) -> bool {
        EndpointGroup::ALL
            .iter()
            .all(|group| self.slot(*group).load().is_some())
    }

    /// Rebuilds one group (or all of them) from disk, swaps the new
    /// snapshots in and re-runs the conflict audit.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn reload(&self, scope: Option<EndpointGroup>) -> ReloadReport {
        let groups: Vec<EndpointGroup> = match scope {
            Some(group) => vec![group],
            None => EndpointGroup::ALL.to_vec(),
        };

        let mut counts = BTreeMap::new();
        {
            let _guard = self.load_lock.lock().await;
            for group in groups {
                let map = self.scan(group).await;
                counts.insert(group, map.len());
                self.slot(group).store(Some(map));
            }
        }

        info!(counts = ?counts, "Endpoint definitions reloaded");
        let conflicts = self.audit().await;
        ReloadReport { counts, conflicts }
    }

    /// Runs the conflict auditor over the current snapshots.
    pub async fn audit(&self) -> Vec<RouteConflict> {
        let maps = self.get_all().await;
        conflicts::audit(&maps)
    }

    /// Matches the longest leading run of `segments` that forms a routing
    /// key in a routable group.
    ///
    /// Real routing keys in any group take priority over bare-name aliases;
    /// among equals the group precedence order decides.
    pub async fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Option<ResolvedEndpoint> {
        let mut maps = Vec::with_capacity(EndpointGroup::ROUTABLE.len());
        for group in EndpointGroup::ROUTABLE {
            maps.push((group, self.get(group).await));
        }

        for len in (1..=segments.len()).rev() {
            let key = segments[..len]
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join("/");

            let found = maps
                .iter()
                .find_map(|(group, map)| map.get_primary(&key).map(|d| (*group, d)))
                .or_else(|| {
                    maps.iter()
                        .find_map(|(group, map)| map.get(&key).map(|d| (*group, d)))
                });

            if let Some((group, definition)) = found {
                return Some(ResolvedEndpoint {
                    group,
                    definition: definition.clone(),
                    remainder: segments[len..]
                        .iter()
                        .map(|s| s.as_ref().to_string())
                        .collect(),
                });
            }
        }
        None
    }

    async fn scan(&self, group: EndpointGroup) -> Arc<EndpointMap> {
        let root = self.root.clone();
        let report = match tokio::task::spawn_blocking(move || load_group(&root, group)).await {
            Ok(report) => report,
            Err(e) => {
                error!(group = %group, error = %e, "Definition scan task failed");
                LoadReport::default()
            }
        };
        Arc::new(EndpointMap::build(group, report.definitions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, body: &str) {
        let dir = root.join(relative);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(crate::loader::DEFINITION_FILE), body).unwrap();
    }

    fn sql(object: &str) -> String {
        format!(r#"{{"Type": "SQL", "DatabaseObjectName": "{object}", "AllowedMethods": ["GET"]}}"#)
    }

    fn proxy(url: &str) -> String {
        format!(r#"{{"Type": "Standard", "Url": "{url}", "Methods": ["GET", "POST"]}}"#)
    }

    #[tokio::test]
    async fn test_namespaced_definition_has_bare_alias() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "SQL/CRM/Accounts", &sql("Accounts"));

        let registry = EndpointRegistry::new(tmp.path());
        let map = registry.get(EndpointGroup::Sql).await;
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("CRM/Accounts").unwrap().name, "Accounts");
        assert_eq!(map.get("Accounts").unwrap().routing_key(), "CRM/Accounts");
        assert!(map.get_primary("Accounts").is_none());
    }

    #[tokio::test]
    async fn test_real_key_beats_alias() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "SQL/Accounts", &sql("Plain"));
        write(tmp.path(), "SQL/CRM/Accounts", &sql("Namespaced"));

        let registry = EndpointRegistry::new(tmp.path());
        let map = registry.get(EndpointGroup::Sql).await;
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("Accounts").unwrap().namespace, None);
        assert_eq!(map.get_primary("Accounts").unwrap().namespace, None);
    }

    #[tokio::test]
    async fn test_shared_bare_name_gets_no_alias() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "SQL/Sales/Order", &sql("SalesOrder"));
        write(tmp.path(), "SQL/Billing/Order", &sql("BillingOrder"));
        write(tmp.path(), "SQL/Billing/Invoice", &sql("Invoice"));

        let registry = EndpointRegistry::new(tmp.path());
        let map = registry.get(EndpointGroup::Sql).await;
        assert!(map.get("Order").is_none());
        assert_eq!(map.get("Sales/Order").unwrap().name, "Order");
        assert_eq!(map.get("Billing/Order").unwrap().routing_key(), "Billing/Order");
        assert_eq!(map.get("Invoice").unwrap().routing_key(), "Billing/Invoice");

        let resolved = registry.resolve(&["Order", "7"]).await;
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_survives_until_reload() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Proxy/Orders", &proxy("http://backend/svc/Orders"));

        let registry = EndpointRegistry::new(tmp.path());
        let before = registry.get(EndpointGroup::Proxy).await;
        assert_eq!(before.len(), 1);

        write(tmp.path(), "Proxy/Invoices", &proxy("http://backend/svc/Invoices"));
        assert_eq!(registry.get(EndpointGroup::Proxy).await.len(), 1);

        let report = registry.reload(Some(EndpointGroup::Proxy)).await;
        assert_eq!(report.counts.get(&EndpointGroup::Proxy), Some(&2));
        assert!(report.conflicts.is_empty());
        assert_eq!(registry.get(EndpointGroup::Proxy).await.len(), 2);
        // Readers holding the old snapshot keep a consistent view.
        assert_eq!(before.len(), 1);
    }

    #[tokio::test]
    async fn test_readiness() {
        let tmp = TempDir::new().unwrap();
        let registry = EndpointRegistry::new(tmp.path());
        assert!(!registry.is_ready());
        registry.get_all().await;
        assert!(registry.is_ready());
    }

    #[tokio::test]
    async fn test_resolve_longest_prefix_with_remainder() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Proxy/Orders", &proxy("http://backend/svc/Orders"));
        write(tmp.path(), "Proxy/Sales/Orders", &proxy("http://backend/svc/SalesOrders"));

        let registry = EndpointRegistry::new(tmp.path());

        let hit = registry.resolve(&["Orders", "42"]).await.unwrap();
        assert_eq!(hit.group, EndpointGroup::Proxy);
        assert_eq!(hit.definition.routing_key(), "Orders");
        assert_eq!(hit.remainder, vec!["42".to_string()]);

        let nested = registry.resolve(&["Sales", "Orders", "7", "lines"]).await.unwrap();
        assert_eq!(nested.definition.routing_key(), "Sales/Orders");
        assert_eq!(nested.remainder, vec!["7".to_string(), "lines".to_string()]);

        assert!(registry.resolve(&["Unknown"]).await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_prefers_group_precedence() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "SQL/Items", &sql("Items"));
        write(tmp.path(), "Proxy/Items", &proxy("http://backend/svc/Items"));

        let registry = EndpointRegistry::new(tmp.path());
        let hit = registry.resolve(&["Items"]).await.unwrap();
        assert_eq!(hit.group, EndpointGroup::Sql);
    }
}
