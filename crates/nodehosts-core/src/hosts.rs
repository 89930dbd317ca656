//! Hosts mapping and rendering
//!
//! [`HostsMapping`] is an immutable-by-convention hostname → address map.
//! Every change goes through [`HostsMapping::with_upsert`] or
//! [`HostsMapping::with_removal`], which return a fresh copy and leave the
//! original untouched. Change detection is plain structural equality.

use std::collections::BTreeMap;
use std::fmt;

use crate::node::HostRecord;

/// Header written at the top of every generated hosts file
pub const HOSTS_FILE_HEADER: &str = "## THIS IS AN AUTO-GENERATED HOSTS FILE -- DO NOT EDIT.\n#";

/// Mapping from hostname to address
///
/// Invariant: every key appears once and no value is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostsMapping {
    hosts: BTreeMap<String, String>,
}

impl HostsMapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this mapping with `hostname` pointing at `address`
    ///
    /// An empty address removes the host instead, so the no-empty-value
    /// invariant cannot be broken through this constructor.
    pub fn with_upsert(&self, hostname: &str, address: &str) -> Self {
        if address.is_empty() {
            return self.with_removal(hostname);
        }

        let mut hosts = self.hosts.clone();
        hosts.insert(hostname.to_owned(), address.to_owned());
        Self { hosts }
    }

    /// Copy of this mapping without `hostname`
    ///
    /// Removing an absent host yields an equal mapping.
    pub fn with_removal(&self, hostname: &str) -> Self {
        let mut hosts = self.hosts.clone();
        hosts.remove(hostname);
        Self { hosts }
    }

    /// Copy of this mapping with `record` applied
    pub fn with_record(&self, record: &HostRecord) -> Self {
        match record.address.as_deref() {
            Some(address) => self.with_upsert(&record.hostname, address),
            None => self.with_removal(&record.hostname),
        }
    }

    /// Address of `hostname`, if present
    pub fn get(&self, hostname: &str) -> Option<&str> {
        self.hosts.get(hostname).map(String::as_str)
    }

    /// Whether `hostname` is present
    pub fn contains(&self, hostname: &str) -> bool {
        self.hosts.contains_key(hostname)
    }

    /// Number of hosts
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the mapping has no hosts
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Entries in ascending hostname order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hosts.iter().map(|(h, a)| (h.as_str(), a.as_str()))
    }

    /// Render the hosts file
    ///
    /// Output is byte-identical for equal mappings, whatever order the
    /// entries were inserted in.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(HOSTS_FILE_HEADER.len() + 1 + self.hosts.len() * 32);
        out.push_str(HOSTS_FILE_HEADER);
        out.push('\n');
        for (hostname, address) in self.iter() {
            out.push_str(address);
            out.push_str("\t\t");
            out.push_str(hostname);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for HostsMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<H, A> FromIterator<(H, A)> for HostsMapping
where
    H: Into<String>,
    A: Into<String>,
{
    /// Build a mapping from pairs; pairs with an empty address are skipped
    fn from_iter<I: IntoIterator<Item = (H, A)>>(iter: I) -> Self {
        let hosts = iter
            .into_iter()
            .map(|(h, a)| (h.into(), a.into()))
            .filter(|(_, a): &(String, String)| !a.is_empty())
            .collect();
        Self { hosts }
    }
}
