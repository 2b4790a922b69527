//! Startup port checks
//!
//! Checking a port before binding it is racy: another process can take it in
//! between. These checks only give early feedback at startup; the bind itself
//! is the source of truth.

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Check that the HTTP port and every `extra` listener port are free and
/// distinct
///
/// `extra` names additional listeners, e.g. `("metrics", 9100)`. Port 0 is
/// never treated as a conflict since each bind gets its own ephemeral port.
pub async fn validate_ports_available(
    config: &ServerConfig,
    extra: &[(&str, u16)],
) -> Result<()> {
    let mut claimed: Vec<(&str, u16)> = vec![("http", config.port)];
    for &(listener, port) in extra {
        if let Some(&(first, _)) = claimed.iter().find(|(_, p)| port != 0 && *p == port) {
            return Err(ServerError::PortConflict {
                port,
                first: first.to_string(),
                second: listener.to_string(),
            });
        }
        claimed.push((listener, port));
    }

    for (listener, port) in claimed {
        check_port(&config.with_port(port), listener).await?;
    }

    info!(host = %config.host, "Listener ports are available");
    Ok(())
}

async fn check_port(target: &ServerConfig, listener: &str) -> Result<()> {
    match TcpListener::bind((target.host.as_str(), target.port)).await {
        Ok(_) => {
            debug!(listener, port = target.port, "Port is free");
            Ok(())
        }
        Err(source) => {
            warn!(listener, port = target.port, error = %source, "Port is not available");
            Err(ServerError::PortInUse {
                listener: listener.to_string(),
                port: target.port,
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_taken_port_names_its_listener() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = ServerConfig::new("127.0.0.1", 0);
        let err = validate_ports_available(&config, &[("metrics", port)]).await;
        assert_matches!(err, Err(ServerError::PortInUse { listener, .. }) if listener == "metrics");

        drop(taken);
        tokio_test::assert_ok!(validate_ports_available(&config, &[("metrics", port)]).await);
    }

    #[tokio::test]
    async fn test_shared_port_is_rejected_before_binding() {
        let config = ServerConfig::new("127.0.0.1", 9100);
        let err = validate_ports_available(&config, &[("metrics", 9100)]).await;
        assert_matches!(
            err,
            Err(ServerError::PortConflict { port: 9100, first, second })
                if first == "http" && second == "metrics"
        );
    }

    #[tokio::test]
    async fn test_ephemeral_ports_never_conflict() {
        let config = ServerConfig::new("127.0.0.1", 0);
        tokio_test::assert_ok!(validate_ports_available(&config, &[("metrics", 0)]).await);
    }
}
