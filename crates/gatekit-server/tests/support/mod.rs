//! The example users service plus an HTTP client for driving a running server.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Bytes;
use gatekit_client::ClientConfig;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;

#[path = "../../examples/common/mod.rs"]
mod users;

pub use users::*;

/// Status code and collected body of one HTTP exchange.
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub async fn http_get(addr: SocketAddr, path: &str) -> HttpReply {
    let request = http::Request::get(format!("http://{addr}{path}"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    exchange(request).await
}

pub async fn http_post_json(addr: SocketAddr, path: &str, body: &str) -> HttpReply {
    let request = http::Request::post(format!("http://{addr}{path}"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();
    exchange(request).await
}

async fn exchange(request: http::Request<Full<Bytes>>) -> HttpReply {
    let client = HttpClient::builder(TokioExecutor::new()).build_http();
    let response = client.request(request).await.unwrap();

    let status = response.status().as_u16();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    HttpReply {
        status,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

/// Client config pointed at a bound gRPC address.
pub fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        endpoint: format!("http://{addr}"),
        max_retries: 0,
        ..ClientConfig::default()
    }
}
