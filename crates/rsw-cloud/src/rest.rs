//! REST client for the cloud APIs used by the switcher.
//!
//! Token acquisition is out of scope: the client is handed a bearer token.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{IntoUrl, Method, RequestBuilder, StatusCode, Url};
use rsw_config::ApiEndpoints;
use rsw_core::{
    HealthSnapshot, LiveInterface, MetricEvent, ObservedRouteTable, StaticRoute, TargetStatus,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::{ComputeApi, HealthSource, MetricsSink, OperationApi, OperationStatus, RouteTableApi};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Holds the bearer token; must not implement `Debug`.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    endpoints: ApiEndpoints,
    token: String,
    folder_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetStatesResponse {
    #[serde(default)]
    target_states: Vec<TargetState>,
}

#[derive(Deserialize)]
struct TargetState {
    address: String,
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteTableResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    static_routes: Vec<StaticRoute>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceResponse {
    network_interfaces: Option<Vec<NetworkInterface>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    index: InterfaceIndex,
    #[serde(default)]
    security_group_ids: BTreeSet<String>,
}

/// The compute API reports interface indexes as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum InterfaceIndex {
    Number(u32),
    Text(String),
}

impl InterfaceIndex {
    fn parse(&self) -> Result<u32> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .parse()
                .with_context(|| format!("Invalid network interface index '{s}'")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    id: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<Value>,
}

impl CloudClient {
    pub fn new(
        endpoints: ApiEndpoints,
        token: impl Into<String>,
        folder_id: impl Into<String>,
    ) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            bail!("an IAM token is required for the cloud API client");
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoints,
            token,
            folder_id: folder_id.into(),
        })
    }

    fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.send_optional(request, what)
            .await?
            .ok_or_else(|| anyhow!("Unexpected status code {} for {what}", StatusCode::NOT_FOUND))
    }

    /// Like [`Self::send`], but a 404 is `Ok(None)`.
    async fn send_optional<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<Option<T>> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {what} failed"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body for {what}"))?;
        decode(status, body, what)
    }

    fn operation_id(response: OperationResponse, what: &str) -> Result<String> {
        response
            .id
            .ok_or_else(|| anyhow!("Failed to start operation for {what}"))
    }
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: String, what: &str) -> Result<Option<T>> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        bail!("Unexpected status code {status} for {what}: {message}");
    }
    serde_json::from_str(&body)
        .map(Some)
        .with_context(|| format!("Failed to parse response for {what}"))
}

#[async_trait]
impl HealthSource for CloudClient {
    async fn target_health(
        &self,
        load_balancer_id: &str,
        target_group_id: &str,
    ) -> Result<HealthSnapshot> {
        let url = format!(
            "{}/networkLoadBalancers/{load_balancer_id}:getTargetStates",
            self.endpoints.load_balancer
        );
        let url = Url::parse_with_params(&url, &[("targetGroupId", target_group_id)])
            .with_context(|| format!("Invalid load balancer URL: {url}"))?;
        let request = self.request(Method::GET, url);
        let response: TargetStatesResponse = self
            .send(request, &format!("target states of {load_balancer_id}"))
            .await?;
        Ok(response
            .target_states
            .into_iter()
            .map(|target| (target.address, TargetStatus::parse(&target.status)))
            .collect())
    }
}

#[async_trait]
impl RouteTableApi for CloudClient {
    async fn read_table(&self, table_id: &str) -> Result<ObservedRouteTable> {
        let url = format!("{}/routeTables/{table_id}", self.endpoints.vpc);
        let response: RouteTableResponse = self
            .send(
                self.request(Method::GET, &url),
                &format!("route table {table_id}"),
            )
            .await?;
        Ok(ObservedRouteTable {
            id: table_id.to_string(),
            name: response.name,
            static_routes: response.static_routes,
        })
    }

    async fn write_table(&self, table_id: &str, routes: &[StaticRoute]) -> Result<String> {
        let url = format!("{}/routeTables/{table_id}", self.endpoints.vpc);
        let what = format!("updating route table {table_id}");
        let request = self.request(Method::PATCH, &url).json(&json!({
            "updateMask": "staticRoutes",
            "staticRoutes": routes,
        }));
        let response: OperationResponse = self.send(request, &what).await?;
        let id = Self::operation_id(response, &what)?;
        debug!(table = %table_id, operation = %id, "Route table update accepted");
        Ok(id)
    }
}

#[async_trait]
impl ComputeApi for CloudClient {
    async fn read_interfaces(&self, vm_id: &str) -> Result<Vec<LiveInterface>> {
        let url = format!("{}/instances/{vm_id}", self.endpoints.compute);
        let response: InstanceResponse = self
            .send(self.request(Method::GET, &url), &format!("instance {vm_id}"))
            .await?;
        let interfaces = response
            .network_interfaces
            .ok_or_else(|| anyhow!("Instance {vm_id} has no network interfaces"))?;
        interfaces
            .into_iter()
            .map(|iface| {
                Ok(LiveInterface {
                    index: iface.index.parse()?,
                    security_group_ids: iface.security_group_ids,
                })
            })
            .collect()
    }

    async fn update_interface(
        &self,
        vm_id: &str,
        index: u32,
        security_group_ids: &BTreeSet<String>,
    ) -> Result<String> {
        let url = format!(
            "{}/instances/{vm_id}/updateNetworkInterface",
            self.endpoints.compute
        );
        let what = format!("updating instance {vm_id} interface {index}");
        let request = self.request(Method::PATCH, &url).json(&json!({
            "networkInterfaceIndex": index.to_string(),
            "updateMask": "securityGroupIds",
            "securityGroupIds": security_group_ids,
        }));
        let response: OperationResponse = self.send(request, &what).await?;
        Self::operation_id(response, &what)
    }
}

#[async_trait]
impl OperationApi for CloudClient {
    async fn operation_status(&self, operation_id: &str) -> Result<Option<OperationStatus>> {
        let url = format!("{}/operations/{operation_id}", self.endpoints.operation);
        let response: Option<OperationResponse> = self
            .send_optional(
                self.request(Method::GET, &url),
                &format!("operation {operation_id}"),
            )
            .await?;
        Ok(response.map(|r| OperationStatus {
            done: r.done,
            error: r.error.map(|e| e.to_string()),
        }))
    }
}

#[async_trait]
impl MetricsSink for CloudClient {
    async fn write_metrics(&self, events: &[MetricEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let url = format!("{}/data/write", self.endpoints.monitoring);
        let url = Url::parse_with_params(
            &url,
            &[("folderId", self.folder_id.as_str()), ("service", "custom")],
        )
        .with_context(|| format!("Invalid monitoring URL: {url}"))?;
        let request = self
            .request(Method::POST, url)
            .json(&json!({ "metrics": events }));
        let response: Value = self.send(request, "writing metrics").await?;
        if let Some(message) = response.get("errorMessage").and_then(Value::as_str) {
            bail!("Error writing metrics: {message}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_token() {
        let Err(err) = CloudClient::new(ApiEndpoints::default(), "", "folder") else {
            panic!("client built without a token");
        };
        assert!(err.to_string().contains("IAM token is required"));
    }

    #[test]
    fn test_instance_interfaces_accept_string_indexes() {
        let raw = r#"{"networkInterfaces":[
            {"index":"0","securityGroupIds":["sg-a","sg-b"]},
            {"index":1}
        ]}"#;
        let parsed: InstanceResponse = serde_json::from_str(raw).unwrap();
        let interfaces = parsed.network_interfaces.unwrap();
        assert_eq!(interfaces[0].index.parse().unwrap(), 0);
        assert_eq!(interfaces[0].security_group_ids.len(), 2);
        assert_eq!(interfaces[1].index.parse().unwrap(), 1);
        assert!(interfaces[1].security_group_ids.is_empty());
    }

    #[test]
    fn test_bad_interface_index_is_an_error() {
        let index = InterfaceIndex::Text("eth0".into());
        assert!(index.parse().is_err());
    }

    #[test]
    fn test_route_table_response_defaults() {
        let parsed: RouteTableResponse = serde_json::from_str(r#"{"name":"main"}"#).unwrap();
        assert_eq!(parsed.name, "main");
        assert!(parsed.static_routes.is_empty());
    }

    #[test]
    fn test_operation_without_id_is_rejected() {
        let response = OperationResponse {
            id: None,
            done: false,
            error: None,
        };
        let err = CloudClient::operation_id(response, "updating route table rt").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to start operation for updating route table rt"
        );
    }

    #[test]
    fn test_missing_resource_decodes_to_none() {
        let decoded: Option<OperationResponse> = decode(
            StatusCode::NOT_FOUND,
            r#"{"code":5,"message":"Operation not found"}"#.into(),
            "operation op-1",
        )
        .unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_error_status_reports_api_message() {
        let err = decode::<OperationResponse>(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"message":"try again later"}"#.into(),
            "operation op-1",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unexpected status code 503 Service Unavailable for operation op-1: try again later"
        );
    }

    #[test]
    fn test_done_operation_decodes() {
        let decoded: Option<OperationResponse> = decode(
            StatusCode::OK,
            r#"{"id":"op-1","done":true}"#.into(),
            "operation op-1",
        )
        .unwrap();
        let response = decoded.unwrap();
        assert!(response.done);
        assert!(response.error.is_none());
    }
}
