// Engine session
//
// Launch -> discovery -> connect, then request/reply through the transport,
// with the read-only response cache in front of `ask`.

use crate::application::cache::ResponseCache;
use crate::application::config::SessionConfig;
use crate::application::constants::{ERROR_STRING_QUESTION, SESSION_LOG_KIND};
use crate::application::discovery::{EndpointDiscovery, RendezvousTarget};
use crate::application::transport::Transport;
use crate::domain::{
    identity::posix_string, Endpoint, ExecutionTarget, HostIdentity, LaunchContext, Response,
    SessionFiles, SessionToken,
};
use crate::error::{AppError, Result};
use crate::port::{EngineChannel, EngineHost, IdProvider, LaunchRequest};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct OmcSession {
    token: SessionToken,
    config: SessionConfig,
    identity: HostIdentity,
    container_id: Option<String>,
    transport: Transport,
    cache: ResponseCache,
}

impl OmcSession {
    /// Start an engine in the configured environment and connect to it
    ///
    /// Everything acquired along the way (process, log) is released again if
    /// a later step fails.
    ///
    /// # Errors
    /// - `AppError::Config` if the environment cannot be launched from this host
    /// - `AppError::Launch` if the engine does not start or never announces its endpoint
    /// - `AppError::Transport` if connecting fails
    pub async fn start(
        config: SessionConfig,
        host: Arc<dyn EngineHost>,
        channel: Box<dyn EngineChannel>,
        ids: &dyn IdProvider,
    ) -> Result<Self> {
        let token = SessionToken::new(ids.generate_id());
        let identity = host.identity().clone();
        let environment = &config.environment;
        let files = SessionFiles::resolve(
            &token,
            &identity,
            environment.rendezvous_dir(),
            SESSION_LOG_KIND,
        );

        let local_engine = if environment.is_local() {
            host.local_engine()?
        } else {
            String::new()
        };
        let command = environment.launch_command(&LaunchContext {
            token: &token,
            host: &identity,
            local_engine: &local_engine,
            container_id_file: &files.container_id,
            interactive_port: config.interactive_port,
        })?;

        info!(
            token = %token,
            environment = %environment,
            command = ?command,
            log = %files.log.display(),
            "Starting engine"
        );

        let launched = host
            .start(
                environment,
                LaunchRequest {
                    token: token.clone(),
                    command,
                    files: files.clone(),
                    timeout: config.timeout,
                },
            )
            .await?;

        let container_id = launched.container_id.clone();
        let reachable_address = launched.reachable_address.clone();
        let log = launched.log.clone();
        let mut transport = Transport::new(
            channel,
            Some(launched.process),
            Some(launched.log),
            config.timeout,
        );

        let discovery = EndpointDiscovery::new(host, config.timeout);
        let target = RendezvousTarget {
            path: &files.rendezvous,
            container_id: container_id.as_deref(),
            reachable_address: &reachable_address,
        };
        let connected = match discovery.discover(environment, target, log.as_ref()).await {
            Ok(endpoint) => transport.connect(&endpoint).await,
            Err(e) => Err(e),
        };
        if let Err(e) = connected {
            error!(token = %token, error = %e, "Engine session failed to start");
            transport.shutdown().await;
            return Err(e);
        }

        let cache = ResponseCache::new(config.readonly);
        Ok(Self {
            token,
            config,
            identity,
            container_id,
            transport,
            cache,
        })
    }

    /// Connect to an engine that is already running at `endpoint`
    ///
    /// The session owns neither the engine process nor its log; liveness is
    /// not checked before sends. [`close`](Self::close) only disconnects unless
    /// [`quit_on_close`](Self::quit_on_close) asks it to stop the engine.
    pub async fn attach(
        config: SessionConfig,
        host: Arc<dyn EngineHost>,
        channel: Box<dyn EngineChannel>,
        endpoint: Endpoint,
    ) -> Result<Self> {
        let mut transport = Transport::new(channel, None, None, config.timeout);
        transport.set_quit_on_shutdown(false);
        transport.connect(&endpoint).await?;
        info!(endpoint = %endpoint, "Attached to running engine");

        let cache = ResponseCache::new(config.readonly);
        Ok(Self {
            token: SessionToken::new(format!("attached-{}", endpoint)),
            identity: host.identity().clone(),
            container_id: None,
            config,
            transport,
            cache,
        })
    }

    /// Send `quit()` to the engine on [`close`](Self::close)
    ///
    /// On by default for started engines, off for attached ones.
    pub fn quit_on_close(mut self, quit: bool) -> Self {
        self.transport.set_quit_on_shutdown(quit);
        self
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Evaluate an expression, bypassing the cache
    pub async fn send_expression(&mut self, expression: &str, parsed: bool) -> Result<Response> {
        debug!(token = %self.token, expression = %expression, "Sending expression");
        self.transport.send(expression, parsed).await
    }

    /// Call `question(opt)`, served from the cache in read-only sessions
    pub async fn ask(&mut self, question: &str, opt: Option<&str>, parsed: bool) -> Result<Response> {
        if let Some(hit) = self.cache.get(question, opt, parsed) {
            return Ok(hit.clone());
        }

        let expression = format!("{}({})", question, opt.unwrap_or_default());
        let response = self.send_expression(&expression, parsed).await?;
        self.cache.insert(question, opt, parsed, response.clone());
        Ok(response)
    }

    pub async fn get_version(&mut self) -> Result<String> {
        let response = self.ask("getVersion", None, true).await?;
        Ok(response.to_string())
    }

    pub async fn get_error_string(&mut self) -> Result<String> {
        let response = self.ask(ERROR_STRING_QUESTION, None, true).await?;
        Ok(response.to_string())
    }

    /// Load a Modelica file; `false` means the engine rejected it
    pub async fn load_file(&mut self, path: &Path) -> Result<bool> {
        let quoted = quote(&posix_string(path));
        let response = self.ask("loadFile", Some(&quoted), true).await?;
        expect_bool("loadFile", response)
    }

    /// Load a library model such as `Modelica`
    pub async fn load_model(&mut self, name: &str) -> Result<bool> {
        let response = self.ask("loadModel", Some(name), true).await?;
        expect_bool("loadModel", response)
    }

    /// Where compiled models of this session run
    pub fn execution_target(&self, cwd: &str) -> ExecutionTarget {
        let environment = &self.config.environment;
        ExecutionTarget {
            prefix: environment.execution_prefix(
                cwd,
                self.container_id.as_deref(),
                self.identity.uid,
            ),
            local: environment.is_local(),
            windows: environment.is_local() && self.identity.platform.is_windows(),
        }
    }

    /// Stop the engine (or just disconnect, see [`attach`](Self::attach)) and
    /// drop cached replies
    pub async fn close(&mut self) {
        info!(token = %self.token, "Closing engine session");
        self.transport.shutdown().await;
        self.cache.clear();
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn expect_bool(question: &str, response: Response) -> Result<bool> {
    match response {
        Response::Value(Value::Bool(b)) => Ok(b),
        other => Err(AppError::InvalidState(format!(
            "{} returned a non-boolean reply: {}",
            question, other
        ))),
    }
}
