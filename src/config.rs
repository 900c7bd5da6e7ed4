use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Args;

use crate::core::DEFAULT_ANNUAL_RATE_PERCENT;

#[derive(Args, Debug, Clone)]
pub struct ServiceConfig {
    #[arg(long, env = "FINAGENT_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,
    #[arg(long, env = "FINAGENT_PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(
        long,
        env = "FINAGENT_ANNUAL_RATE",
        default_value_t = DEFAULT_ANNUAL_RATE_PERCENT,
        help = "Assumed annual return in percent for goal projections"
    )]
    pub annual_rate_percent: f64,
    #[arg(
        long,
        env = "FINAGENT_CANDIDATE_TIMEOUT_MS",
        default_value_t = 10_000,
        help = "Per-candidate time limit for what-if sweeps"
    )]
    pub candidate_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            annual_rate_percent: DEFAULT_ANNUAL_RATE_PERCENT,
            candidate_timeout_ms: 10_000,
        }
    }
}

impl ServiceConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.annual_rate_percent.is_finite() || self.annual_rate_percent <= -100.0 {
            return Err("--annual-rate-percent must be > -100".to_string());
        }
        if self.candidate_timeout_ms == 0 {
            return Err("--candidate-timeout-ms must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct RemoteConfig {
    #[arg(
        long,
        env = "FINAGENT_SIMULATOR_URL",
        help = "Base URL of a remote simulation service; evaluates locally when omitted"
    )]
    pub simulator_url: Option<String>,
    #[arg(long, env = "FINAGENT_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_ms == 0 {
            return Err("--request-timeout-ms must be > 0".to_string());
        }
        if let Some(url) = &self.simulator_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err("--simulator-url must start with http:// or https://".to_string());
            }
        }
        Ok(())
    }
}
