//! Endpoint kinds and the registry groups they are stored in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Behaviour a definition activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Forwarding endpoint declared with the current document format.
    Standard,
    /// Table, view or table-valued function served through the query executor.
    RelationalObject,
    /// Forwarding endpoint declared with the legacy document format.
    Forwarding,
    CompositeWorkflow,
    Webhook,
    File,
    Static,
    /// Forwarding endpoint reachable only as a workflow step.
    Private,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointKind::Standard => "standard",
            EndpointKind::RelationalObject => "relational-object",
            EndpointKind::Forwarding => "forwarding",
            EndpointKind::CompositeWorkflow => "composite-workflow",
            EndpointKind::Webhook => "webhook",
            EndpointKind::File => "file",
            EndpointKind::Static => "static",
            EndpointKind::Private => "private",
        };
        f.write_str(name)
    }
}

/// One routing-key map in the registry.
///
/// Variants are declared in serving precedence order: when two groups own the
/// same routing key, the one declared first serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointGroup {
    Sql,
    Proxy,
    File,
    Static,
    Composite,
    Webhook,
}

impl EndpointGroup {
    /// All groups, highest precedence first.
    pub const ALL: [EndpointGroup; 6] = [
        EndpointGroup::Sql,
        EndpointGroup::Proxy,
        EndpointGroup::File,
        EndpointGroup::Static,
        EndpointGroup::Composite,
        EndpointGroup::Webhook,
    ];

    /// Groups reachable through the generic `/api/{env}/{path}` route, in precedence order.
    pub const ROUTABLE: [EndpointGroup; 4] = [
        EndpointGroup::Sql,
        EndpointGroup::Proxy,
        EndpointGroup::File,
        EndpointGroup::Static,
    ];

    /// Directories (below the definitions root) scanned for this group.
    pub fn directories(&self) -> &'static [&'static str] {
        match self {
            EndpointGroup::Sql => &["SQL"],
            EndpointGroup::Proxy => &["Proxy"],
            EndpointGroup::Composite => &["Proxy", "Composite"],
            EndpointGroup::Webhook => &["Webhooks"],
            EndpointGroup::File => &["Files"],
            EndpointGroup::Static => &["Static"],
        }
    }

    /// Group whose documents a directory holds by default.
    pub fn for_directory(directory: &str) -> Option<EndpointGroup> {
        match directory {
            "SQL" => Some(EndpointGroup::Sql),
            "Proxy" => Some(EndpointGroup::Proxy),
            "Composite" => Some(EndpointGroup::Composite),
            "Webhooks" => Some(EndpointGroup::Webhook),
            "Files" => Some(EndpointGroup::File),
            "Static" => Some(EndpointGroup::Static),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointGroup::Sql => "sql",
            EndpointGroup::Proxy => "proxy",
            EndpointGroup::File => "file",
            EndpointGroup::Static => "static",
            EndpointGroup::Composite => "composite",
            EndpointGroup::Webhook => "webhook",
        }
    }
}

impl fmt::Display for EndpointGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointGroup::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown endpoint group: {s}"))
    }
}
