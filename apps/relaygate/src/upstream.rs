//! Outbound HTTP transport (spec.md §4.E, §9 "one HTTP client per
//! provider/proxy combination"). Grounded directly in the teacher's
//! `upstream_client::WreqUpstreamClient`: a `wreq::Client` cache keyed by
//! proxy, buffered unary responses, and a channel-bridged idle-timeout
//! watchdog for streaming ones.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use http::HeaderMap;
use relaygate_client::Closable;
use relaygate_common::GatewayError;
use relaygate_providers::UpstreamHttpRequest;
use tokio_stream::wrappers::ReceiverStream;
use wreq::{Client, Proxy};

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(30),
        }
    }
}

pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>),
}

pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

/// One `wreq::Client` per distinct outbound proxy, built lazily and cached
/// for the lifetime of this generation (spec.md §4.E: swapping generations,
/// not individual connections, is how a proxy change takes effect).
pub struct UpstreamHttpClient {
    config: UpstreamClientConfig,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl Closable for UpstreamHttpClient {
    fn close(&self) {
        self.clients.lock().expect("upstream client cache poisoned").clear();
    }
}

impl UpstreamHttpClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let proxy = normalize_proxy(config.proxy.clone());
        let initial = build_client(&config, proxy.as_deref())?;
        let mut clients = HashMap::new();
        clients.insert(proxy, initial);
        Ok(Self {
            config,
            clients: Mutex::new(clients),
        })
    }

    fn client(&self) -> Result<Client, GatewayError> {
        let proxy = normalize_proxy(self.config.proxy.clone());
        let mut guard = self.clients.lock().expect("upstream client cache poisoned");
        if let Some(client) = guard.get(&proxy) {
            return Ok(client.clone());
        }
        let client = build_client(&self.config, proxy.as_deref())
            .map_err(|e| GatewayError::service_unavailable(format!("failed building upstream client: {e}")))?;
        guard.insert(proxy, client.clone());
        Ok(client)
    }

    pub async fn send(&self, req: &UpstreamHttpRequest) -> Result<UpstreamResponse, GatewayError> {
        let client = self.client()?;
        let mut builder = client.request(req.method.clone(), &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().await.map_err(map_wreq_error)?;
        convert_response(resp, req.is_stream, self.config.stream_idle_timeout).await
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn build_client(config: &UpstreamClientConfig, proxy: Option<&str>) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .read_timeout(config.stream_idle_timeout);
    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }
    builder.build()
}

async fn convert_response(
    resp: wreq::Response,
    want_stream: bool,
    stream_idle_timeout: Duration,
) -> Result<UpstreamResponse, GatewayError> {
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();

    if !want_stream {
        let body = resp.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, io::Error>>(16);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        loop {
            let next = tokio::time::timeout(stream_idle_timeout, stream.next()).await;
            let item = match next {
                Ok(item) => item,
                Err(_elapsed) => break,
            };
            let Some(item) = item else { break };
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = tx.send(Err(io::Error::other(err.to_string()))).await;
                    break;
                }
            };
            if tx.send(Ok(chunk)).await.is_err() {
                break;
            }
        }
    });

    Ok(UpstreamResponse {
        status,
        headers,
        body: UpstreamBody::Stream(Box::pin(ReceiverStream::new(rx))),
    })
}

fn map_wreq_error(err: wreq::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::service_unavailable(format!("upstream timed out: {err}"))
    } else if err.is_connect() {
        GatewayError::service_unavailable(format!("upstream connection failed: {err}"))
    } else {
        GatewayError::service_unavailable(format!("upstream request failed: {err}"))
    }
}
