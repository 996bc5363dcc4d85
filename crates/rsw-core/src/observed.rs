//! Ephemeral truth pulled from the network every pass. Never persisted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health status reported by the load balancer for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Healthy,
    Unhealthy,
    Other(String),
}

impl TargetStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "HEALTHY" => Self::Healthy,
            "UNHEALTHY" => Self::Unhealthy,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// healthcheck address -> status
pub type HealthSnapshot = BTreeMap<String, TargetStatus>;

/// One static route as the route-table API represents it.
///
/// Routes the switcher does not manage (gateways, foreign next hops) pass
/// through unchanged because the API replaces the whole list at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticRoute {
    pub destination_prefix: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_address: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StaticRoute {
    pub fn via(prefix: impl Into<String>, next_hop: impl Into<String>) -> Self {
        Self {
            destination_prefix: prefix.into(),
            next_hop_address: Some(next_hop.into()),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedRouteTable {
    pub id: String,
    pub name: String,
    pub static_routes: Vec<StaticRoute>,
}

impl ObservedRouteTable {
    /// `(prefix, next hop)` for every route that has a next-hop address.
    pub fn next_hops(&self) -> impl Iterator<Item = (&str, &str)> {
        self.static_routes.iter().filter_map(|route| {
            route
                .next_hop_address
                .as_deref()
                .map(|hop| (route.destination_prefix.as_str(), hop))
        })
    }
}

/// Live security-group assignment of one VM network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInterface {
    pub index: u32,
    pub security_group_ids: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_status() {
        assert_eq!(TargetStatus::parse("HEALTHY"), TargetStatus::Healthy);
        assert_eq!(TargetStatus::parse("UNHEALTHY"), TargetStatus::Unhealthy);
        assert_eq!(
            TargetStatus::parse("DRAINING"),
            TargetStatus::Other("DRAINING".into())
        );
        assert!(!TargetStatus::parse("INITIAL").is_healthy());
    }

    #[test]
    fn test_static_route_keeps_unknown_fields() {
        let raw = r#"{"destinationPrefix":"0.0.0.0/0","gatewayId":"gw-1"}"#;
        let route: StaticRoute = serde_json::from_str(raw).unwrap();
        assert_eq!(route.next_hop_address, None);
        let back = serde_json::to_value(&route).unwrap();
        assert_eq!(back["gatewayId"], "gw-1");
        assert!(back.get("nextHopAddress").is_none());
    }

    #[test]
    fn test_next_hops_skips_gateway_routes() {
        let mut gateway = StaticRoute::via("0.0.0.0/0", "x");
        gateway.next_hop_address = None;
        let table = ObservedRouteTable {
            id: "rt".into(),
            name: "main".into(),
            static_routes: vec![StaticRoute::via("10.0.0.0/8", "192.168.1.10"), gateway],
        };
        let hops: Vec<_> = table.next_hops().collect();
        assert_eq!(hops, vec![("10.0.0.0/8", "192.168.1.10")]);
    }
}
