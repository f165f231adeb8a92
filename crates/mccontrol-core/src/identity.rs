//! Discovered instance identity and the raw platform records it is built from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a platform instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One candidate instance as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub name: String,
    /// Cluster-internal address. May be empty while the instance is pending.
    pub address: String,
    pub phase: Phase,
    pub started_at: Option<DateTime<Utc>>,
}

/// How an endpoint is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    ClusterInternal,
    NodePort,
    LoadBalancer,
}

impl EndpointKind {
    /// Whether the endpoint is reachable from outside the cluster.
    #[must_use]
    pub const fn is_external(self) -> bool {
        matches!(self, Self::NodePort | Self::LoadBalancer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    pub port: u16,
    pub target_port: Option<u16>,
}

/// One endpoint (service) as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub name: String,
    pub kind: EndpointKind,
    pub ports: Vec<EndpointPort>,
    /// Addresses assigned by a load balancer.
    pub ingress_addresses: Vec<String>,
    /// Statically declared external addresses.
    pub external_addresses: Vec<String>,
}

impl EndpointInfo {
    /// Whether any port of this endpoint maps to `port`.
    #[must_use]
    pub fn exposes(&self, port: u16) -> bool {
        self.ports
            .iter()
            .any(|p| p.port == port || p.target_port == Some(port))
    }

    /// First load-balancer ingress, else first declared external address.
    #[must_use]
    pub fn external_address(&self) -> Option<&str> {
        self.ingress_addresses
            .first()
            .or_else(|| self.external_addresses.first())
            .map(String::as_str)
    }
}

/// The binding of the configured selector to one concrete instance.
///
/// Owned by the discovery cache; everyone else receives clones and must not
/// hold them across long operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub instance_name: String,
    pub address: String,
    pub phase: Phase,
    pub external_address: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Identity {
    /// Build an identity from a selected instance.
    #[must_use]
    pub fn from_instance(instance: &InstanceInfo, external_address: Option<String>) -> Self {
        Self {
            instance_name: instance.name.clone(),
            address: instance.address.clone(),
            phase: instance.phase,
            external_address,
            discovered_at: Utc::now(),
        }
    }

    /// Whether `other` points at a different instance or address.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.instance_name != other.instance_name || self.address != other.address
    }
}

/// Addressing of a process inside an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTarget {
    pub namespace: String,
    pub instance: String,
    /// Empty means the platform's default container.
    pub container: String,
}

impl ProcessTarget {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        instance: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            instance: instance.into(),
            container: container.into(),
        }
    }

    /// Whether namespace, instance and container are all set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.namespace.is_empty() && !self.instance.is_empty() && !self.container.is_empty()
    }
}

impl fmt::Display for ProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.instance, self.container)
    }
}
