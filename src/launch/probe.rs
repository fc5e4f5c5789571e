//! HTTP liveness probe

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// 2xx or 3xx
    Healthy { status: u16 },
    Unhealthy { status: u16 },
    /// No HTTP response within the timeout
    Unreachable { error: String },
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Healthy { status } => write!(f, "healthy (HTTP {})", status),
            ProbeOutcome::Unhealthy { status } => write!(f, "unhealthy (HTTP {})", status),
            ProbeOutcome::Unreachable { error } => write!(f, "unreachable ({})", error),
        }
    }
}

/// Single GET against `url`; redirects are not followed
pub async fn probe(url: &str, timeout: Duration) -> ProbeOutcome {
    let client = match reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            return ProbeOutcome::Unreachable {
                error: e.to_string(),
            }
        }
    };

    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            debug!(url, status = status.as_u16(), "Probe response");
            if status.is_success() || status.is_redirection() {
                ProbeOutcome::Healthy {
                    status: status.as_u16(),
                }
            } else {
                ProbeOutcome::Unhealthy {
                    status: status.as_u16(),
                }
            }
        }
        Err(e) => ProbeOutcome::Unreachable {
            error: e.to_string(),
        },
    }
}
