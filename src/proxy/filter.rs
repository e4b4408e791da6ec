//! Destination policy for the local agent

use crate::protocol::{Address, AddressRecord};

/// Decides whether a requested destination may be proxied
pub trait DestinationFilter: Send + Sync {
    fn allow(&self, record: &AddressRecord) -> bool;
}

impl<F> DestinationFilter for F
where
    F: Fn(&AddressRecord) -> bool + Send + Sync,
{
    fn allow(&self, record: &AddressRecord) -> bool {
        self(record)
    }
}

/// Allows every destination
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl DestinationFilter for AllowAll {
    fn allow(&self, _record: &AddressRecord) -> bool {
        true
    }
}

/// Refuses listed hosts.
///
/// An entry matches the host exactly or, for domain names, any subdomain
/// of it: `example.com` blocks `ads.example.com` but not `badexample.com`.
#[derive(Debug, Default, Clone)]
pub struct HostBlocklist {
    hosts: Vec<String>,
}

impl HostBlocklist {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn blocks(&self, address: &Address) -> bool {
        let host = address.host().to_ascii_lowercase();
        let host = host.trim_end_matches('.');

        self.hosts.iter().any(|blocked| {
            host == blocked
                || (matches!(address, Address::Domain(..))
                    && host.len() > blocked.len()
                    && host.ends_with(blocked.as_str())
                    && host.as_bytes()[host.len() - blocked.len() - 1] == b'.')
        })
    }
}

impl DestinationFilter for HostBlocklist {
    fn allow(&self, record: &AddressRecord) -> bool {
        !self.blocks(&record.address)
    }
}
