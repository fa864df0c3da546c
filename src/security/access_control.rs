//! Source address allow-list.

use ipnet::IpNet;
use std::net::IpAddr;

use crate::routing::ValidationError;

/// CIDR allow-list. An empty list allows every source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    nets: Vec<IpNet>,
}

impl AllowList {
    /// Parse CIDR entries. Bare addresses are taken as host routes
    /// (`/32` or `/128`). Every bad entry is reported.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, Vec<ValidationError>> {
        let mut nets = Vec::with_capacity(entries.len());
        let mut errors = Vec::new();

        for entry in entries {
            let value = entry.as_ref().trim();
            let parsed = value
                .parse::<IpNet>()
                .or_else(|e| value.parse::<IpAddr>().map(IpNet::from).map_err(|_| e));
            match parsed {
                Ok(net) => nets.push(net.trunc()),
                Err(e) => errors.push(ValidationError::InvalidCidr {
                    value: value.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        if errors.is_empty() {
            Ok(Self { nets })
        } else {
            Err(errors)
        }
    }

    pub fn from_nets(nets: Vec<IpNet>) -> Self {
        Self { nets }
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    pub fn nets(&self) -> &[IpNet] {
        &self.nets
    }

    /// IPv4-mapped IPv6 sources are compared as IPv4.
    pub fn permits(&self, source: IpAddr) -> bool {
        if self.nets.is_empty() {
            return true;
        }
        let source = source.to_canonical();
        self.nets.iter().any(|net| net.contains(&source))
    }
}
