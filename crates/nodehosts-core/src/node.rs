//! Node descriptors and host record extraction
//!
//! A [`NodeDescriptor`] is the read-only snapshot an event source hands us
//! for one cluster node. [`HostRecord::from_node`] reduces it to the single
//! hostname/address pair that ends up in the hosts file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a node address, named after the Kubernetes node address types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    #[serde(rename = "InternalIP")]
    InternalIp,
    #[serde(rename = "ExternalIP")]
    ExternalIp,
    Hostname,
    #[serde(rename = "InternalDNS")]
    InternalDns,
    #[serde(rename = "ExternalDNS")]
    ExternalDns,
    /// Any address type this crate does not know about
    #[serde(other)]
    Unknown,
}

impl AddressType {
    /// The Kubernetes spelling of this address type
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::InternalIp => "InternalIP",
            AddressType::ExternalIp => "ExternalIP",
            AddressType::Hostname => "Hostname",
            AddressType::InternalDns => "InternalDNS",
            AddressType::ExternalDns => "ExternalDNS",
            AddressType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internalip" => Ok(AddressType::InternalIp),
            "externalip" => Ok(AddressType::ExternalIp),
            "hostname" => Ok(AddressType::Hostname),
            "internaldns" => Ok(AddressType::InternalDns),
            "externaldns" => Ok(AddressType::ExternalDns),
            other => Err(crate::Error::invalid_input(format!(
                "Unknown address type '{}'. Valid: InternalIP, ExternalIP, Hostname, InternalDNS, ExternalDNS",
                other
            ))),
        }
    }
}

/// One address reported for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: AddressType,
    pub address: String,
}

impl NodeAddress {
    pub fn new(kind: AddressType, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
        }
    }
}

/// Snapshot of a cluster node as reported by an event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node name, unique within the cluster; becomes the hostname
    pub name: String,

    /// Opaque version marker that changes whenever the node changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Addresses in the order the source reported them
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

impl NodeDescriptor {
    /// Create a node without any addresses
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_version: None,
            addresses: Vec::new(),
        }
    }

    /// Set the version marker
    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }

    /// Append an address
    pub fn with_address(mut self, kind: AddressType, address: impl Into<String>) -> Self {
        self.addresses.push(NodeAddress::new(kind, address));
        self
    }
}

/// Ordered address-type preference used to pick a node's hosts file address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressPolicy {
    preference: Vec<AddressType>,
}

impl AddressPolicy {
    /// Create a policy; earlier types win over later ones
    pub fn new(preference: Vec<AddressType>) -> Self {
        Self { preference }
    }

    /// Address types in order of preference
    pub fn preference(&self) -> &[AddressType] {
        &self.preference
    }

    /// Pick the address for `node`, if any
    ///
    /// The first preferred type that has a non-blank address wins; within
    /// a type the first occurrence wins.
    pub fn select<'a>(&self, node: &'a NodeDescriptor) -> Option<&'a str> {
        self.preference.iter().find_map(|kind| {
            node.addresses
                .iter()
                .filter(|addr| addr.kind == *kind)
                .map(|addr| addr.address.trim())
                .find(|addr| !addr.is_empty())
        })
    }
}

impl Default for AddressPolicy {
    /// Internal address first, external as fallback
    fn default() -> Self {
        Self::new(vec![AddressType::InternalIp, AddressType::ExternalIp])
    }
}

impl FromStr for AddressPolicy {
    type Err = crate::Error;

    /// Parse a comma-separated list such as `InternalIP,ExternalIP`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let preference = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(AddressType::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        if preference.is_empty() {
            return Err(crate::Error::invalid_input(
                "Address preference must name at least one address type",
            ));
        }

        Ok(Self::new(preference))
    }
}

/// One entry of the hosts file, derived from a single event
///
/// An absent address means the host should be removed from the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub hostname: String,
    pub address: Option<String>,
}

impl HostRecord {
    /// Record that maps `hostname` to `address`
    ///
    /// An empty address yields a removal record.
    pub fn upsert(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            hostname: hostname.into(),
            address: (!address.is_empty()).then_some(address),
        }
    }

    /// Record that removes `hostname`
    pub fn removal(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: None,
        }
    }

    /// Derive the record for a node using the default address policy
    pub fn from_node(node: &NodeDescriptor) -> Self {
        Self::from_node_with_policy(node, &AddressPolicy::default())
    }

    /// Derive the record for a node
    ///
    /// Nodes without a usable address produce a removal record; this is
    /// not an error.
    pub fn from_node_with_policy(node: &NodeDescriptor, policy: &AddressPolicy) -> Self {
        Self {
            hostname: node.name.clone(),
            address: policy.select(node).map(str::to_owned),
        }
    }

    /// Whether this record removes its host
    pub fn is_removal(&self) -> bool {
        self.address.is_none()
    }
}

impl fmt::Display for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.address.as_deref().unwrap_or("<removed>");
        write!(f, "{} -> {}", self.hostname, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(addresses: &[(AddressType, &str)]) -> NodeDescriptor {
        addresses
            .iter()
            .fold(NodeDescriptor::new("host"), |node, (kind, addr)| {
                node.with_address(*kind, *addr)
            })
    }

    #[test]
    fn internal_address_only() {
        let rec = HostRecord::from_node(&node(&[(AddressType::InternalIp, "1.1.1.1")]));
        assert_eq!(rec, HostRecord::upsert("host", "1.1.1.1"));
    }

    #[test]
    fn external_address_only() {
        let rec = HostRecord::from_node(&node(&[(AddressType::ExternalIp, "2.2.2.2")]));
        assert_eq!(rec, HostRecord::upsert("host", "2.2.2.2"));
    }

    #[test]
    fn internal_wins_over_external() {
        let rec = HostRecord::from_node(&node(&[
            (AddressType::ExternalIp, "2.2.2.2"),
            (AddressType::InternalIp, "1.1.1.1"),
        ]));
        assert_eq!(rec.address.as_deref(), Some("1.1.1.1"));
    }

    #[test]
    fn first_internal_address_wins() {
        let rec = HostRecord::from_node(&node(&[
            (AddressType::InternalIp, "10.0.0.1"),
            (AddressType::InternalIp, "10.0.0.2"),
        ]));
        assert_eq!(rec.address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn no_usable_address_is_removal() {
        let rec = HostRecord::from_node(&node(&[(AddressType::Hostname, "host.local")]));
        assert!(rec.is_removal());

        let rec = HostRecord::from_node(&NodeDescriptor::new("host"));
        assert!(rec.is_removal());
    }

    #[test]
    fn blank_addresses_are_skipped() {
        let rec = HostRecord::from_node(&node(&[
            (AddressType::InternalIp, "  "),
            (AddressType::ExternalIp, "2.2.2.2"),
        ]));
        assert_eq!(rec.address.as_deref(), Some("2.2.2.2"));
    }

    #[test]
    fn custom_policy_order() {
        let policy: AddressPolicy = "ExternalIP, InternalIP".parse().unwrap();
        let n = node(&[
            (AddressType::InternalIp, "1.1.1.1"),
            (AddressType::ExternalIp, "2.2.2.2"),
        ]);
        let rec = HostRecord::from_node_with_policy(&n, &policy);
        assert_eq!(rec.address.as_deref(), Some("2.2.2.2"));
    }

    #[test]
    fn policy_parse_rejects_garbage() {
        assert!("".parse::<AddressPolicy>().is_err());
        assert!("InternalIP,Carrier".parse::<AddressPolicy>().is_err());
    }

    #[test]
    fn record_display() {
        assert_eq!(HostRecord::upsert("host", "1.1.1.1").to_string(), "host -> 1.1.1.1");
        assert_eq!(HostRecord::removal("host").to_string(), "host -> <removed>");
        assert!(HostRecord::upsert("host", "").is_removal());
    }

    #[test]
    fn address_type_uses_kubernetes_names() {
        let addr: NodeAddress =
            serde_json::from_str(r#"{"type":"InternalIP","address":"10.0.0.1"}"#).unwrap();
        assert_eq!(addr.kind, AddressType::InternalIp);

        let addr: NodeAddress =
            serde_json::from_str(r#"{"type":"SomethingNew","address":"x"}"#).unwrap();
        assert_eq!(addr.kind, AddressType::Unknown);
    }
}
