// Endpoint discovery
//
// Polls for the rendezvous file the engine writes once its socket is bound.

use crate::application::constants::DISCOVERY_ATTEMPTS;
use crate::application::retry::RetryPolicy;
use crate::domain::{Endpoint, ExecutionEnvironment};
use crate::error::{AppError, Result};
use crate::port::{EngineHost, EngineLog};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Where to look and how to read the answer
#[derive(Debug, Clone, Copy)]
pub struct RendezvousTarget<'a> {
    pub path: &'a str,
    pub container_id: Option<&'a str>,
    /// Replaces an unspecified address in the announced endpoint
    pub reachable_address: &'a str,
}

pub struct EndpointDiscovery {
    host: Arc<dyn EngineHost>,
    policy: RetryPolicy,
}

impl EndpointDiscovery {
    pub fn new(host: Arc<dyn EngineHost>, timeout: Duration) -> Self {
        Self {
            host,
            policy: RetryPolicy::from_timeout(timeout, DISCOVERY_ATTEMPTS),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Wait for the engine to announce its endpoint
    ///
    /// # Errors
    /// `AppError::Launch` with the engine log once the attempt budget is spent.
    pub async fn discover(
        &self,
        environment: &ExecutionEnvironment,
        target: RendezvousTarget<'_>,
        log: &dyn EngineLog,
    ) -> Result<Endpoint> {
        let host = self.host.as_ref();

        let endpoint = self
            .policy
            .poll(move || async move {
                let content = host
                    .read_rendezvous(environment, target.path, target.container_id)
                    .await?;
                let endpoint = content
                    .as_deref()
                    .and_then(|c| Endpoint::from_rendezvous(c, target.reachable_address));
                if endpoint.is_none() {
                    debug!(path = %target.path, "Rendezvous file not ready");
                }
                Ok(endpoint)
            })
            .await?;

        match endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Engine endpoint discovered");
                Ok(endpoint)
            }
            None => Err(AppError::launch(
                format!(
                    "engine did not write {} within {:?} ({} attempts)",
                    target.path,
                    self.policy.interval() * self.policy.max_attempts(),
                    self.policy.max_attempts()
                ),
                log.contents(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::engine_host::mocks::MockEngineHost;
    use crate::port::engine_log::mocks::MockEngineLog;
    use std::time::Instant;

    fn target<'a>(reachable: &'a str) -> RendezvousTarget<'a> {
        RendezvousTarget {
            path: "/tmp/openmodelica.tester.port.t",
            container_id: None,
            reachable_address: reachable,
        }
    }

    #[tokio::test]
    async fn test_discovers_after_a_few_polls() {
        let host = Arc::new(MockEngineHost::new(Some("tcp://127.0.0.1:5555")).rendezvous_after(3));
        let state = host.state();
        let discovery = EndpointDiscovery::new(host, Duration::from_millis(80));
        let log = MockEngineLog::new("");

        let endpoint = discovery
            .discover(&ExecutionEnvironment::Local, target("127.0.0.1"), &log)
            .await
            .unwrap();

        assert_eq!(endpoint.as_str(), "tcp://127.0.0.1:5555");
        assert_eq!(state.lock().unwrap().rendezvous_reads, 4);
    }

    #[tokio::test]
    async fn test_rewrites_unspecified_address() {
        let host = Arc::new(MockEngineHost::new(Some("tcp://0.0.0.0:5555\n")));
        let discovery = EndpointDiscovery::new(host, Duration::from_millis(80));
        let log = MockEngineLog::new("");

        let endpoint = discovery
            .discover(&ExecutionEnvironment::Local, target("172.17.0.3"), &log)
            .await
            .unwrap();

        assert_eq!(endpoint.as_str(), "tcp://172.17.0.3:5555");
    }

    #[tokio::test]
    async fn test_missing_rendezvous_fails_in_bounded_time() {
        let host = Arc::new(MockEngineHost::new(None));
        let state = host.state();
        let timeout = Duration::from_millis(200);
        let discovery = EndpointDiscovery::new(host, timeout);
        let log = MockEngineLog::new("omc: license error");
        let started = Instant::now();

        let err = discovery
            .discover(&ExecutionEnvironment::Local, target("127.0.0.1"), &log)
            .await
            .unwrap_err();

        assert!(started.elapsed() < timeout + Duration::from_millis(500));
        assert_eq!(state.lock().unwrap().rendezvous_reads, DISCOVERY_ATTEMPTS as usize);
        match err {
            AppError::Launch { log, .. } => assert_eq!(log, "omc: license error"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
