//! Shared HTTP client for every collaborator.
//!
//! Features:
//! - HTTP/2 with HTTP/1.1 fallback, connection pooling with keep-alive
//! - TLS 1.3 via rustls
//! - Brotli, Gzip, Deflate compression (auto-negotiated)
//! - Bot user agent (Reddit rejects generic ones)
//! - Connect and total-request timeouts

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

/// Build the client used by the Reddit, translation, Imgur and image-fetch
/// collaborators. `timeout` bounds a whole request, body included.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        // ═══════════════════════════════════════════════════════════════
        // CONNECTIONS
        // ═══════════════════════════════════════════════════════════════
        .http2_adaptive_window(true)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        // ═══════════════════════════════════════════════════════════════
        // TLS + COMPRESSION
        // ═══════════════════════════════════════════════════════════════
        .use_rustls_tls()
        .brotli(true)
        .gzip(true)
        .deflate(true)
        // ═══════════════════════════════════════════════════════════════
        // IDENTITY
        // ═══════════════════════════════════════════════════════════════
        .user_agent(user_agent)
        // ═══════════════════════════════════════════════════════════════
        // TIMEOUTS
        // ═══════════════════════════════════════════════════════════════
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;

    Ok(client)
}
