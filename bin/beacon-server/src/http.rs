//! HTTP transport exposing the discovery operation surface
//!
//! Every endpoint answers the JSON envelope `{ code, data }`; errors map to
//! the wire codes defined on CoreError. Peers call the same endpoints with
//! `replication: true` set in the body.

use crate::metrics::Metrics;
use anyhow::Result;
use beacon_api::{ArgCancel, ArgFetch, ArgFetchs, ArgPolls, ArgRegister, ArgRenew, Instance, STATUS_UP};
use beacon_core::CoreError;
use beacon_discovery::Discovery;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppContext {
    pub discovery: Arc<Discovery>,
    pub metrics: Arc<Metrics>,
    pub poll_wait: Duration,
}

pub async fn serve(addr: &str, ctx: AppContext) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "discovery API listening");
    loop {
        let (stream, remote) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(ctx.clone(), req));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%remote, %err, "connection closed with error");
            }
        });
    }
}

async fn handle(ctx: AppContext, req: Request<Incoming>) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (&method, path.as_str()) {
        (&Method::POST, "/discovery/register") => register(&ctx, req).await,
        (&Method::POST, "/discovery/renew") => renew(&ctx, req).await,
        (&Method::POST, "/discovery/cancel") => cancel(&ctx, req).await,
        (&Method::GET, "/discovery/fetch/all") => fetch_all(&ctx).await,
        (&Method::GET, "/discovery/fetch") => fetch(&ctx, req).await,
        (&Method::GET, "/discovery/fetchs") => fetchs(&ctx, req).await,
        (&Method::GET, "/discovery/polls") => polls(&ctx, req).await,
        (&Method::GET, "/discovery/nodes") => nodes(&ctx).await,
        (&Method::GET, "/metrics") => metrics_page(&ctx),
        _ => not_found(&ctx, &path),
    };
    Ok(response)
}

async fn register(ctx: &AppContext, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let arg: ArgRegister = match read_json(req).await {
        Ok(arg) => arg,
        Err(err) => return failure(ctx, "/discovery/register", &err),
    };
    let ins = Instance::from_register(&arg);
    ctx.discovery.register(ins, &arg).await;
    success::<()>(ctx, "/discovery/register", None)
}

async fn renew(ctx: &AppContext, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let arg: ArgRenew = match read_json(req).await {
        Ok(arg) => arg,
        Err(err) => return failure(ctx, "/discovery/renew", &err),
    };
    match ctx.discovery.renew(&arg).await {
        Ok(ins) => success(ctx, "/discovery/renew", Some(ins)),
        Err(err) => failure(ctx, "/discovery/renew", &err),
    }
}

async fn cancel(ctx: &AppContext, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let arg: ArgCancel = match read_json(req).await {
        Ok(arg) => arg,
        Err(err) => return failure(ctx, "/discovery/cancel", &err),
    };
    match ctx.discovery.cancel(&arg).await {
        Ok(()) => success::<()>(ctx, "/discovery/cancel", None),
        Err(err) => failure(ctx, "/discovery/cancel", &err),
    }
}

async fn fetch_all(ctx: &AppContext) -> Response<Full<Bytes>> {
    let all = ctx.discovery.fetch_all().await;
    success(ctx, "/discovery/fetch/all", Some(all))
}

async fn fetch(ctx: &AppContext, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let pairs = query_pairs(req.uri().query().unwrap_or(""));
    let arg = ArgFetch {
        zone: first(&pairs, "zone").unwrap_or_default(),
        env: first(&pairs, "env").unwrap_or_default(),
        appid: first(&pairs, "appid").unwrap_or_default(),
        status: status_param(&pairs),
    };
    match ctx.discovery.fetch(&arg).await {
        Ok(info) => success(ctx, "/discovery/fetch", Some(info)),
        Err(err) => failure(ctx, "/discovery/fetch", &err),
    }
}

async fn fetchs(ctx: &AppContext, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let pairs = query_pairs(req.uri().query().unwrap_or(""));
    let arg = ArgFetchs {
        zone: first(&pairs, "zone").unwrap_or_default(),
        env: first(&pairs, "env").unwrap_or_default(),
        appid: all(&pairs, "appid"),
        status: status_param(&pairs),
    };
    let infos = ctx.discovery.fetchs(&arg).await;
    success(ctx, "/discovery/fetchs", Some(infos))
}

async fn polls(ctx: &AppContext, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let arg = polls_arg(req.uri().query().unwrap_or(""));
    let (handle, _is_new) = match ctx.discovery.polls(&arg).await {
        Ok(polled) => polled,
        Err(err) => return failure(ctx, "/discovery/polls", &err),
    };

    ctx.metrics.pollers.inc();
    let outcome = timeout(ctx.poll_wait, handle.wait()).await;
    ctx.metrics.pollers.dec();

    // Always release the subscription before pooling the handle: a pooled
    // handle must never be signaled again until reissued.
    ctx.discovery.del_conns(&arg).await;
    let response = match outcome {
        Ok(Some(result)) => success(ctx, "/discovery/polls", Some(result)),
        _ => failure(ctx, "/discovery/polls", &CoreError::NotModified),
    };
    ctx.discovery.put_chan(handle).await;
    response
}

async fn nodes(ctx: &AppContext) -> Response<Full<Bytes>> {
    success(ctx, "/discovery/nodes", Some(ctx.discovery.nodes()))
}

fn metrics_page(ctx: &AppContext) -> Response<Full<Bytes>> {
    match ctx.metrics.encode() {
        Ok(text) => plain(StatusCode::OK, text),
        Err(err) => plain(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn not_found(ctx: &AppContext, path: &str) -> Response<Full<Bytes>> {
    debug!(%path, "unknown route");
    ctx.metrics.observe("unknown", -404);
    json_response(StatusCode::NOT_FOUND, &Envelope::<()> { code: -404, data: None })
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

fn success<T: Serialize>(ctx: &AppContext, path: &str, data: Option<T>) -> Response<Full<Bytes>> {
    ctx.metrics.observe(path, 0);
    json_response(StatusCode::OK, &Envelope { code: 0, data })
}

fn failure(ctx: &AppContext, path: &str, err: &CoreError) -> Response<Full<Bytes>> {
    ctx.metrics.observe(path, err.code());
    json_response(
        StatusCode::OK,
        &Envelope::<()> {
            code: err.code(),
            data: None,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(body).unwrap_or_else(|_| br#"{"code":-500}"#.to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn plain(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> std::result::Result<T, CoreError> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|err| CoreError::InvalidParam(err.to_string()))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|err| CoreError::InvalidParam(err.to_string()))
}

// Query values here are zone names, envs, appids, and hostnames, none of
// which need percent-decoding.
fn query_pairs(query: &str) -> Vec<(&str, &str)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|kv| kv.split_once('='))
        .collect()
}

fn first(pairs: &[(&str, &str)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

fn all(pairs: &[(&str, &str)], key: &str) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .collect()
}

fn status_param(pairs: &[(&str, &str)]) -> u32 {
    first(pairs, "status")
        .and_then(|v| v.parse().ok())
        .unwrap_or(STATUS_UP)
}

fn polls_arg(query: &str) -> ArgPolls {
    let pairs = query_pairs(query);
    ArgPolls {
        zone: first(&pairs, "zone").unwrap_or_default(),
        env: first(&pairs, "env").unwrap_or_default(),
        appid: all(&pairs, "appid"),
        latest_timestamp: all(&pairs, "latest_timestamp")
            .iter()
            .filter_map(|v| v.parse().ok())
            .collect(),
        hostname: first(&pairs, "hostname").unwrap_or_default(),
    }
}
