//! Request logging middleware shared by both services
//!
//! Logs method, path, status, latency and client address of every request.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::{
    net::SocketAddr,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};

/// Get the client address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
fn client_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    // May contain a chain of IPs, first is the original client
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    fallback_ip.to_string()
}

/// Layer for HTTP request logging
#[derive(Clone)]
pub struct RequestLoggingLayer {
    service: &'static str,
}

impl RequestLoggingLayer {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingMiddleware {
            inner,
            service: self.service,
        }
    }
}

/// Middleware service for HTTP request logging
#[derive(Clone)]
pub struct RequestLoggingMiddleware<S> {
    inner: S,
    service: &'static str,
}

impl<S> Service<Request<Body>> for RequestLoggingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let service = self.service;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();
            let fallback_ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let ip = client_ip(request.headers(), &fallback_ip);

            let started = Instant::now();
            let response = inner.call(request).await?;
            let status = response.status();
            let elapsed_ms = started.elapsed().as_millis() as u64;

            if status.is_server_error() {
                tracing::warn!(service, %method, %path, status = status.as_u16(), elapsed_ms, %ip, "request failed");
            } else {
                tracing::info!(service, %method, %path, status = status.as_u16(), elapsed_ms, %ip, "request");
            }

            Ok(response)
        })
    }
}
