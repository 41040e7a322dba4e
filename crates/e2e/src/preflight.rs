//! Reachability check for the board under test

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Poll `url` until it answers with a success status or `timeout_duration`
/// passes
pub async fn wait_for_reachable(url: &str, timeout_duration: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("{} is reachable", url);
                return Ok(());
            }
            Ok(resp) => {
                warn!("Preflight returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} ...", url);
                }
                if !e.is_connect() {
                    warn!("Preflight error: {}", e);
                }
            }
        }

        if start.elapsed() >= timeout_duration {
            return Err(E2eError::Unreachable(attempts));
        }
        sleep(Duration::from_millis(250)).await;
    }
}
