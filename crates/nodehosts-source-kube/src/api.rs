//! The slice of the Kubernetes core/v1 API the source reads
//!
//! Only node names, resource versions and status addresses are decoded;
//! every other field is ignored.

use nodehosts_core::node::{NodeAddress, NodeDescriptor};
use nodehosts_core::{Error, Result};
use serde::Deserialize;

/// `metadata` of a list response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// `metadata` of a single object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

/// A `v1/Node` object
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

impl Node {
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }
}

impl From<Node> for NodeDescriptor {
    fn from(node: Node) -> Self {
        NodeDescriptor {
            name: node.metadata.name,
            resource_version: node.metadata.resource_version,
            addresses: node.status.addresses,
        }
    }
}

/// Response of `GET /api/v1/nodes`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Node>,
}

impl NodeList {
    /// Resource version to start watching from
    pub fn resource_version(&self) -> Option<String> {
        self.metadata.resource_version.clone()
    }

    /// Nodes as descriptors, skipping objects without a name
    pub fn into_descriptors(self) -> Vec<NodeDescriptor> {
        self.items
            .into_iter()
            .filter(|node| !node.metadata.name.is_empty())
            .map(NodeDescriptor::from)
            .collect()
    }
}

/// A `meta/v1/Status` carried by watch `ERROR` lines
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Status {
    /// The watch's resource version is too old to resume from
    pub fn is_expired(&self) -> bool {
        self.code == Some(410) || matches!(self.reason.as_deref(), Some("Expired" | "Gone"))
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            self.message.as_deref().unwrap_or("unknown error"),
            self.code.map(|c| c.to_string()).unwrap_or_else(|| "no code".to_string())
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum WatchType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

#[derive(Debug, Deserialize)]
struct WatchLine {
    #[serde(rename = "type")]
    kind: WatchType,
    object: serde_json::Value,
}

/// One decoded line of a watch response
#[derive(Debug, Clone)]
pub enum WatchNotice {
    Added(Node),
    Modified(Node),
    Deleted(Node),
    /// Progress marker; only the resource version is meaningful
    Bookmark { resource_version: Option<String> },
    Error(Status),
}

impl WatchNotice {
    /// Decode one newline-delimited JSON watch line
    pub fn parse(line: &str) -> Result<Self> {
        let line: WatchLine = serde_json::from_str(line)?;
        let notice = match line.kind {
            WatchType::Added => WatchNotice::Added(serde_json::from_value(line.object)?),
            WatchType::Modified => WatchNotice::Modified(serde_json::from_value(line.object)?),
            WatchType::Deleted => WatchNotice::Deleted(serde_json::from_value(line.object)?),
            WatchType::Bookmark => {
                let node: Node = serde_json::from_value(line.object)?;
                WatchNotice::Bookmark {
                    resource_version: node.metadata.resource_version,
                }
            }
            WatchType::Error => WatchNotice::Error(serde_json::from_value(line.object)?),
        };

        if let Some(node) = notice.node() {
            if node.metadata.name.is_empty() {
                return Err(Error::invalid_input("watch object has no name"));
            }
        }
        Ok(notice)
    }

    /// The node carried by an object notice
    pub fn node(&self) -> Option<&Node> {
        match self {
            WatchNotice::Added(node) | WatchNotice::Modified(node) | WatchNotice::Deleted(node) => {
                Some(node)
            }
            WatchNotice::Bookmark { .. } | WatchNotice::Error(_) => None,
        }
    }

    /// Resource version to resume from after this notice
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            WatchNotice::Bookmark { resource_version } => resource_version.as_deref(),
            WatchNotice::Error(_) => None,
            _ => self.node().and_then(Node::resource_version),
        }
    }
}
