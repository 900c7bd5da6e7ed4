use std::time::Duration;

use reqwest::Client;

use crate::core::{
    RemoteCallError, Scenario, ScenarioEvaluator, ScenarioOutcome, SimulationEnvelope,
    SimulationRequest, SimulationResult,
};

/// Client for a simulation service exposing `POST /api/simulator/run`.
#[derive(Debug, Clone)]
pub struct RemoteSimulator {
    client: Client,
    run_url: String,
    timeout: Duration,
}

impl RemoteSimulator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteCallError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteCallError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            run_url: format!("{}/api/simulator/run", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub async fn run(&self, request: &SimulationRequest) -> Result<SimulationResult, RemoteCallError> {
        tracing::debug!(url = %self.run_url, mode = ?request.simulation_mode, "calling simulation endpoint");

        let response = self
            .client
            .post(&self.run_url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let envelope = serde_json::from_slice::<SimulationEnvelope>(&body);

        if !status.is_success() {
            return Err(match envelope {
                Ok(SimulationEnvelope {
                    error: Some(message),
                    ..
                }) => RemoteCallError::Rejected(message),
                _ => RemoteCallError::Status {
                    status: status.as_u16(),
                },
            });
        }

        let envelope = envelope.map_err(|e| RemoteCallError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(RemoteCallError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "simulation failed".to_string()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| RemoteCallError::Decode("response is missing `result`".to_string()))
    }

    fn classify(&self, err: reqwest::Error) -> RemoteCallError {
        if err.is_timeout() {
            RemoteCallError::Timeout {
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if err.is_decode() {
            RemoteCallError::Decode(err.to_string())
        } else {
            RemoteCallError::Transport(err.to_string())
        }
    }
}

impl ScenarioEvaluator for RemoteSimulator {
    async fn evaluate(&self, scenario: Scenario) -> Result<ScenarioOutcome, RemoteCallError> {
        let result = self.run(&scenario.request).await?;
        Ok(ScenarioOutcome::from(&result))
    }
}
