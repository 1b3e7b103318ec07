use crate::config::NetworkConfig;
use std::time::Duration;
use tokio::net::TcpStream;

/// Polls until a TCP connection to the configured host succeeds.
/// `Ok(n)` is the attempt that succeeded, `Err(n)` the number of attempts made.
pub async fn wait_for_network(cfg: &NetworkConfig) -> Result<u32, u32> {
    let attempts = cfg.attempts.max(1);
    let connect_timeout = Duration::from_secs(cfg.connect_timeout_secs.max(1));
    for attempt in 1..=attempts {
        match tokio::time::timeout(
            connect_timeout,
            TcpStream::connect((cfg.host.as_str(), cfg.port)),
        )
        .await
        {
            Ok(Ok(_stream)) => {
                tracing::info!(host = %cfg.host, port = cfg.port, attempt, "network reachable");
                return Ok(attempt);
            }
            Ok(Err(e)) => {
                tracing::warn!(host = %cfg.host, port = cfg.port, attempt, attempts, error = %e, "network not reachable yet");
            }
            Err(_) => {
                tracing::warn!(host = %cfg.host, port = cfg.port, attempt, attempts, "network probe timed out");
            }
        }
        if attempt < attempts {
            tokio::time::sleep(Duration::from_secs(cfg.interval_secs)).await;
        }
    }
    Err(attempts)
}
