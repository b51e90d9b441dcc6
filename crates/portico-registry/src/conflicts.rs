//! Cross-group routing-key conflict audit.
//!
//! Advisory only: conflicts are reported and logged, registry contents are
//! left as they are.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::kind::EndpointGroup;
use crate::registry::EndpointMap;

/// One routing key claimed by more than one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConflict {
    pub key: String,
    /// Every claiming group, in precedence order.
    pub owners: Vec<EndpointGroup>,
    /// Group that serves the key.
    pub winner: EndpointGroup,
    /// Groups left unreachable under the key.
    pub shadowed: Vec<EndpointGroup>,
}

/// Builds the key -> owners index over real routing keys and reports every
/// key with more than one owner. Bare-name aliases are not real keys and
/// never count as owners.
pub fn audit(maps: &[(EndpointGroup, Arc<EndpointMap>)]) -> Vec<RouteConflict> {
    let mut owners: BTreeMap<&str, BTreeSet<EndpointGroup>> = BTreeMap::new();
    for (group, map) in maps {
        for key in map.keys() {
            owners.entry(key).or_default().insert(*group);
        }
    }

    let conflicts: Vec<RouteConflict> = owners
        .into_iter()
        .filter(|(_, groups)| groups.len() > 1)
        .filter_map(|(key, groups)| {
            let owners: Vec<EndpointGroup> = groups.into_iter().collect();
            let (winner, shadowed) = owners.split_first()?;
            Some(RouteConflict {
                key: key.to_string(),
                winner: *winner,
                shadowed: shadowed.to_vec(),
                owners: owners.clone(),
            })
        })
        .collect();

    for conflict in &conflicts {
        warn!(
            key = %conflict.key,
            winner = %conflict.winner,
            shadowed = ?conflict.shadowed,
            "Routing key defined by several endpoint groups"
        );
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EndpointRegistry;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, body: &str) {
        let dir = root.join(relative);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(crate::loader::DEFINITION_FILE), body).unwrap();
    }

    #[tokio::test]
    async fn test_namespaced_twin_is_not_a_conflict() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "SQL/CRM/Accounts",
            r#"{"Type": "SQL", "DatabaseObjectName": "Accounts", "AllowedMethods": ["GET"]}"#,
        );

        let registry = EndpointRegistry::new(tmp.path());
        assert!(registry.audit().await.is_empty());
    }

    #[tokio::test]
    async fn test_precedence_picks_winner() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "Proxy/Items",
            r#"{"Type": "Standard", "Url": "http://backend/svc/Items", "Methods": ["GET"]}"#,
        );
        write(
            tmp.path(),
            "SQL/Items",
            r#"{"Type": "SQL", "DatabaseObjectName": "Items", "AllowedMethods": ["GET"]}"#,
        );
        write(
            tmp.path(),
            "Webhooks/Items",
            r#"{"Type": "Webhook", "DatabaseObjectName": "Hooks", "AllowedColumns": ["orders"]}"#,
        );

        let registry = EndpointRegistry::new(tmp.path());
        let conflicts = registry.audit().await;
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.key, "Items");
        assert_eq!(conflict.winner, EndpointGroup::Sql);
        assert_eq!(
            conflict.shadowed,
            vec![EndpointGroup::Proxy, EndpointGroup::Webhook]
        );
        assert_eq!(conflict.owners.len(), 3);
    }
}
