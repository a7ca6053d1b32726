//! Test fixtures: sample `Cluster`/`ClusterCredential` objects plus a mock API server
//! harness, built on `kube`'s own `tower_test`-backed mock client pattern. Reconciler
//! tests that must not hit a real API server build a `Client` here instead and drive
//! scripted request/response scenarios.

#![cfg(test)]

use crate::api::{Cluster, ClusterCredential, ClusterCredentialRef, ClusterCredentialSpec, ClusterSpec, ClusterStatus};
use http::{Request, Response};
use hyper::Body;
use kube::Client;
use serde_json::{json, Value};

pub fn test_cluster(name: &str, type_: &str) -> Cluster {
    let mut cluster = Cluster::new(
        name,
        ClusterSpec {
            type_: type_.to_string(),
            tenant_id: "tenant-1".to_string(),
            cluster_credential_ref: None,
            provider_config: Default::default(),
        },
    );
    cluster.metadata.namespace = Some("default".to_string());
    cluster.metadata.resource_version = Some("1".to_string());
    cluster.status = Some(ClusterStatus::default());
    cluster
}

pub fn test_credential(name: &str, cluster_name: &str) -> ClusterCredential {
    let mut credential = ClusterCredential::new(
        name,
        ClusterCredentialSpec {
            tenant_id: "tenant-1".to_string(),
            cluster_name: cluster_name.to_string(),
            data: Default::default(),
        },
    );
    credential.metadata.namespace = Some("default".to_string());
    credential.metadata.resource_version = Some("1".to_string());
    credential
}

pub fn with_credential_ref(mut cluster: Cluster, credential_name: &str) -> Cluster {
    cluster.spec.cluster_credential_ref = Some(ClusterCredentialRef {
        name: credential_name.to_string(),
    });
    cluster
}

/// A single scripted request/response exchange against the mock API server.
pub struct Exchange {
    pub method: http::Method,
    /// Substring expected in the request URI; empty matches anything.
    pub uri_contains: &'static str,
    pub response: Value,
}

impl Exchange {
    pub fn get(uri_contains: &'static str, response: Value) -> Exchange {
        Exchange {
            method: http::Method::GET,
            uri_contains,
            response,
        }
    }

    pub fn put(uri_contains: &'static str, response: Value) -> Exchange {
        Exchange {
            method: http::Method::PUT,
            uri_contains,
            response,
        }
    }

    pub fn post(uri_contains: &'static str, response: Value) -> Exchange {
        Exchange {
            method: http::Method::POST,
            uri_contains,
            response,
        }
    }

    pub fn delete(uri_contains: &'static str, response: Value) -> Exchange {
        Exchange {
            method: http::Method::DELETE,
            uri_contains,
            response,
        }
    }

    pub fn patch(uri_contains: &'static str, response: Value) -> Exchange {
        Exchange {
            method: http::Method::PATCH,
            uri_contains,
            response,
        }
    }
}

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

/// Wraps the server side of a mocked `kube::Client`, replaying a fixed script of
/// exchanges in order. Panics (failing the test) if a call doesn't match the next
/// scripted exchange, or if the test ends without exhausting the script — either means
/// the reconciler under test made a different sequence of API calls than expected.
pub struct MockApiServer(ApiServerHandle);

pub fn mock_client() -> (Client, MockApiServer) {
    let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    let client = Client::new(mock_service, "default");
    (client, MockApiServer(handle))
}

impl MockApiServer {
    /// Spawns a task that plays the given exchanges in order, then drops the handle so
    /// any further unexpected call surfaces as a connection-closed error in the test
    /// rather than hanging forever.
    pub fn run(mut self, script: Vec<Exchange>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            for exchange in script {
                let (request, send) = self
                    .0
                    .next_request()
                    .await
                    .expect("reconciler under test made fewer API calls than scripted");
                assert_eq!(request.method(), exchange.method, "unexpected HTTP method");
                if !exchange.uri_contains.is_empty() {
                    assert!(
                        request.uri().to_string().contains(exchange.uri_contains),
                        "request uri {} did not contain expected substring {}",
                        request.uri(),
                        exchange.uri_contains
                    );
                }
                let body = serde_json::to_vec(&exchange.response).unwrap();
                send.send_response(Response::builder().body(Body::from(body)).unwrap());
            }
        })
    }
}

pub fn cluster_list(items: Vec<ClusterCredential>) -> Value {
    json!({
        "apiVersion": "lifecycle.example.com/v1",
        "kind": "ClusterCredentialList",
        "items": items,
    })
}

pub async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("timed out waiting for the scripted mock API scenario to complete")
        .expect("mock API scenario task panicked");
}
