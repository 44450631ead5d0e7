//! Pod exec over the WebSocket channel protocol.
//!
//! The cluster's exec subresource multiplexes streams over a WebSocket
//! using the `v4.channel.k8s.io` subprotocol: the first byte of each
//! binary frame selects the channel (1 = stdout, 2 = stderr, 3 = an
//! error Status document). Arguments are passed as repeated `command`
//! query parameters; nothing ever goes through a shell.

use crate::cluster::ClusterConnection;
use crate::error::{GatewayError, GatewayResult};
use futures::StreamExt;
use reqwest::Url;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{Connector, connect_async_tls_with_config};

const CHANNEL_STDOUT: u8 = 1;
const CHANNEL_STDERR: u8 = 2;
const CHANNEL_ERROR: u8 = 3;

const SUBPROTOCOL: &str = "v4.channel.k8s.io";

/// Run `argv` in `pod` and collect stdout. Fails when the command's
/// Status reports failure or `timeout` elapses.
pub async fn exec_in_pod(
    conn: &ClusterConnection,
    namespace: &str,
    pod: &str,
    argv: &[String],
    timeout: Duration,
) -> GatewayResult<String> {
    if argv.is_empty() {
        return Err(GatewayError::Exec("empty argv".to_string()));
    }
    let url = exec_url(conn, namespace, pod, argv)?;

    match tokio::time::timeout(timeout, run_exec(conn, url)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Exec(format!(
            "command timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

fn exec_url(
    conn: &ClusterConnection,
    namespace: &str,
    pod: &str,
    argv: &[String],
) -> GatewayResult<Url> {
    let mut url = Url::parse(&conn.server)
        .map_err(|e| GatewayError::Config(format!("invalid API server URL: {e}")))?;
    url.set_path(&format!("/api/v1/namespaces/{namespace}/pods/{pod}/exec"));
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("stdout", "true")
            .append_pair("stderr", "true")
            .append_pair("stdin", "false")
            .append_pair("tty", "false");
        for arg in argv {
            pairs.append_pair("command", arg);
        }
    }
    let ws_scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(ws_scheme)
        .map_err(|_| GatewayError::Config("cannot derive WebSocket scheme".to_string()))?;
    Ok(url)
}

async fn run_exec(conn: &ClusterConnection, url: Url) -> GatewayResult<String> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| GatewayError::Exec(format!("invalid exec request: {e}")))?;
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static(SUBPROTOCOL),
    );
    if let Some(token) = &conn.token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| GatewayError::Exec(format!("invalid bearer token: {e}")))?;
        request.headers_mut().insert("Authorization", value);
    }

    let connector = tls_connector(conn)?;
    let (mut stream, _response) = connect_async_tls_with_config(request, None, false, connector)
        .await
        .map_err(|e| GatewayError::Exec(format!("exec channel handshake failed: {e}")))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut status_failure: Option<String> = None;

    while let Some(frame) = stream.next().await {
        let message =
            frame.map_err(|e| GatewayError::Exec(format!("exec channel error: {e}")))?;
        match message {
            Message::Binary(data) => {
                let Some((&channel, payload)) = data.split_first() else {
                    continue;
                };
                match channel {
                    CHANNEL_STDOUT => stdout.extend_from_slice(payload),
                    CHANNEL_STDERR => stderr.extend_from_slice(payload),
                    CHANNEL_ERROR => {
                        if let Some(failure) = parse_error_status(payload) {
                            status_failure = Some(failure);
                        }
                    }
                    _ => {}
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(failure) = status_failure {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(GatewayError::Exec(if stderr.is_empty() {
            failure
        } else {
            format!("{failure}: {}", stderr.trim())
        }));
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Parse the error channel's Status document; None means success.
fn parse_error_status(payload: &[u8]) -> Option<String> {
    let status: serde_json::Value = serde_json::from_slice(payload).ok()?;
    if status["status"].as_str() == Some("Success") {
        return None;
    }
    Some(
        status["message"]
            .as_str()
            .unwrap_or("command failed")
            .to_string(),
    )
}

fn tls_connector(conn: &ClusterConnection) -> GatewayResult<Option<Connector>> {
    if !conn.server.starts_with("https") {
        return Ok(None);
    }
    let mut builder = native_tls::TlsConnector::builder();
    if let Some(ca_pem) = &conn.ca_pem {
        let certificate = native_tls::Certificate::from_pem(ca_pem)
            .map_err(|e| GatewayError::Config(format!("invalid cluster CA: {e}")))?;
        builder.add_root_certificate(certificate);
    }
    if conn.insecure {
        builder.danger_accept_invalid_certs(true);
    }
    if let (Some(cert), Some(key)) = (&conn.client_cert_pem, &conn.client_key_pem) {
        let identity = native_tls::Identity::from_pkcs8(cert, key)
            .map_err(|e| GatewayError::Config(format!("invalid client identity: {e}")))?;
        builder.identity(identity);
    }
    let connector = builder
        .build()
        .map_err(|e| GatewayError::Config(format!("TLS setup failed: {e}")))?;
    Ok(Some(Connector::NativeTls(connector)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ClusterConnection {
        ClusterConnection {
            server: "https://cluster.example.com:6443".to_string(),
            ..ClusterConnection::default()
        }
    }

    #[test]
    fn exec_url_encodes_argv_verbatim() {
        let argv = vec![
            "wp".to_string(),
            "option".to_string(),
            "update".to_string(),
            "blogname".to_string(),
            "My Shop".to_string(),
        ];
        let url = exec_url(&conn(), "store-x", "storefront-abc", &argv).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/v1/namespaces/store-x/pods/storefront-abc/exec");
        let commands: Vec<String> = url
            .query_pairs()
            .filter(|(key, _)| key == "command")
            .map(|(_, value)| value.into_owned())
            .collect();
        assert_eq!(commands, argv);
    }

    #[test]
    fn exec_url_downgrades_plain_http_to_ws() {
        let conn = ClusterConnection {
            server: "http://127.0.0.1:8001".to_string(),
            ..ClusterConnection::default()
        };
        let url = exec_url(&conn, "ns", "pod", &["ls".to_string()]).unwrap();
        assert_eq!(url.scheme(), "ws");
    }

    #[test]
    fn empty_argv_is_rejected() {
        let err = futures::executor::block_on(exec_in_pod(
            &conn(),
            "ns",
            "pod",
            &[],
            Duration::from_secs(1),
        ))
        .unwrap_err();
        assert!(matches!(err, GatewayError::Exec(_)));
    }

    #[test]
    fn error_status_parsing() {
        assert!(parse_error_status(br#"{"status":"Success"}"#).is_none());
        assert_eq!(
            parse_error_status(br#"{"status":"Failure","message":"exit 1"}"#).as_deref(),
            Some("exit 1")
        );
    }
}
