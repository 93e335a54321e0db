// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The server's endpoint list.

use std::net::SocketAddr;

use parking_lot::RwLock;

use uasrv_core::address::{netloc_from_socket, replace_inaddr_any};
use uasrv_core::types::EndpointDescription;

/// Endpoints the server listens on, in registration order.
#[derive(Debug, Default)]
pub struct EndpointList {
    endpoints: RwLock<Vec<EndpointDescription>>,
}

impl EndpointList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list holding `endpoints`.
    pub fn from_descriptions(endpoints: Vec<EndpointDescription>) -> Self {
        Self {
            endpoints: RwLock::new(endpoints),
        }
    }

    /// Appends an endpoint.
    pub fn add(&self, endpoint: EndpointDescription) {
        self.endpoints.write().push(endpoint);
    }

    /// Returns the configured endpoints unchanged.
    pub fn all(&self) -> Vec<EndpointDescription> {
        self.endpoints.read().clone()
    }

    /// Returns the number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    /// Returns `true` if no endpoint is configured.
    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Returns the endpoints as seen from a client at `observed`.
    ///
    /// Wildcard bind addresses in endpoint URLs are replaced by the observed
    /// address; other hosts are kept. Without an observed address the raw
    /// endpoints are returned.
    pub fn for_client(&self, observed: Option<SocketAddr>) -> Vec<EndpointDescription> {
        let Some(addr) = observed else {
            return self.all();
        };
        let netloc = netloc_from_socket(&addr);
        self.endpoints
            .read()
            .iter()
            .map(|endpoint| {
                let mut endpoint = endpoint.clone();
                endpoint.endpoint_url = replace_inaddr_any(&endpoint.endpoint_url, &netloc);
                endpoint
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> EndpointDescription {
        EndpointDescription {
            endpoint_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_for_client_rewrites_wildcards_only() {
        let list = EndpointList::new();
        list.add(endpoint("opc.tcp://0.0.0.0:4840/uasrv/server/"));
        list.add(endpoint("opc.tcp://plc-01:4841"));

        let observed: SocketAddr = "10.0.0.5:4840".parse().unwrap();
        let urls: Vec<_> = list
            .for_client(Some(observed))
            .into_iter()
            .map(|e| e.endpoint_url)
            .collect();
        assert_eq!(
            urls,
            vec!["opc.tcp://10.0.0.5:4840/uasrv/server/", "opc.tcp://plc-01:4841"]
        );

        let raw = list.for_client(None);
        assert_eq!(raw[0].endpoint_url, "opc.tcp://0.0.0.0:4840/uasrv/server/");
        assert_eq!(list.len(), 2);
    }
}
