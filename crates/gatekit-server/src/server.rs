//! Dual-protocol lifecycle: one gRPC listener, one HTTP gateway, one metrics
//! endpoint, started and stopped together.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::service::RoutesBuilder;
use tonic::transport::server::TcpIncoming;
use tonic::{Request, Status};

use crate::adapter::ServiceAdapter;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::{gateway_router, internal_channel};
use crate::interceptor::{InterceptorChain, MetricsLayer, TraceLayer, UnaryInterceptor};
use crate::metrics::MetricsRegistry;
use crate::reflection::{reflection_service, reflection_service_v1alpha};

#[cfg(feature = "health")]
use crate::health::{HealthReporter, ServingStatus};

/// Lifecycle of a [`Server`]. There is no way back from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Addresses the listeners actually bound, ephemeral ports resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub grpc: SocketAddr,
    pub gateway: SocketAddr,
    pub metrics: SocketAddr,
}

type ErrorSender = mpsc::Sender<ServerError>;

struct Launched {
    addrs: BoundAddrs,
    #[cfg(feature = "health")]
    health: HealthReporter,
}

/// A gRPC server with an HTTP/JSON gateway and a Prometheus endpoint.
///
/// # Example
///
/// ```ignore
/// use gatekit_server::{request_id_interceptor, signal_token, Server, ServerConfig};
///
/// let config: ServerConfig = ServerConfig::builder()
///     .with_dotenv()
///     .with_env_prefix("APP")
///     .build()?;
///
/// let server = Server::builder(config)
///     .adapter(UsersAdapter::new())
///     .interceptor(request_id_interceptor)
///     .build();
///
/// server.start(signal_token()).await?;
/// ```
pub struct Server {
    config: ServerConfig,
    adapters: Vec<Arc<dyn ServiceAdapter>>,
    interceptors: InterceptorChain,
    state: watch::Sender<ServerState>,
    shutdown: CancellationToken,
    addrs: OnceLock<BoundAddrs>,
}

/// Builder for [`Server`]. Adapters and interceptors are fixed once built.
pub struct ServerBuilder {
    config: ServerConfig,
    adapters: Vec<Arc<dyn ServiceAdapter>>,
    interceptors: Vec<UnaryInterceptor>,
}

impl ServerBuilder {
    pub fn adapter(mut self, adapter: impl ServiceAdapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    pub fn shared_adapter(mut self, adapter: Arc<dyn ServiceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Add an interceptor. Interceptors run in the order they are added.
    pub fn interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Server {
        let (state, _) = watch::channel(ServerState::Created);
        Server {
            config: self.config,
            adapters: self.adapters,
            interceptors: InterceptorChain::new(self.interceptors),
            state,
            shutdown: CancellationToken::new(),
            addrs: OnceLock::new(),
        }
    }
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder {
            config,
            adapters: Vec::new(),
            interceptors: Vec::new(),
        }
    }

    /// A server without adapters or interceptors.
    pub fn new(config: ServerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Bound addresses, once the server got as far as `Running`.
    pub fn local_addrs(&self) -> Option<BoundAddrs> {
        self.addrs.get().copied()
    }

    /// Resolves with the bound addresses once the server is running, or
    /// `None` if startup failed.
    pub async fn wait_until_running(&self) -> Option<BoundAddrs> {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|s| {
                matches!(
                    s,
                    ServerState::Running | ServerState::ShuttingDown | ServerState::Stopped
                )
            })
            .await;
        self.local_addrs()
    }

    /// Request a graceful stop. Idempotent; may be called before `start`.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Stop requested");
        }
        self.shutdown.cancel();
    }

    /// Start every listener and serve until `ctx` is cancelled, [`stop`](Self::stop)
    /// is called, or a serve loop fails.
    ///
    /// Cancellation and `stop` are clean exits and return `Ok(())` once both
    /// serve loops have finished. A serve loop failure stops the server and
    /// is returned. Startup failures are returned before anything serves.
    pub async fn start(&self, ctx: CancellationToken) -> Result<(), ServerError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ServerState::Created {
                *state = ServerState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ServerError::AlreadyStarted);
        }

        tracing::info!(
            service = %self.config.service_name,
            version = %self.config.version,
            environment = %self.config.environment,
            "Starting server"
        );

        // cancel whatever was started on every exit path
        let _shutdown_on_exit = self.shutdown.clone().drop_guard();
        let mut tasks = JoinSet::new();
        let (errors_tx, errors_rx) = mpsc::channel(2);

        let launched = match self.launch(&mut tasks, &errors_tx).await {
            Ok(launched) => launched,
            Err(err) => {
                tracing::error!(error = %err, "Server startup failed");
                self.shutdown.cancel();
                self.drain(&mut tasks).await;
                self.set_state(ServerState::Stopped);
                return Err(err);
            }
        };
        drop(errors_tx);

        self.supervise(ctx, errors_rx, &mut tasks, launched).await
    }

    /// Report running, wait for the first reason to stop, then drain the
    /// serve loops. Only the first serve loop error is returned.
    async fn supervise(
        &self,
        ctx: CancellationToken,
        mut errors: mpsc::Receiver<ServerError>,
        tasks: &mut JoinSet<()>,
        launched: Launched,
    ) -> Result<(), ServerError> {
        let addrs = launched.addrs;
        let _ = self.addrs.set(addrs);

        #[cfg(feature = "health")]
        let mut health = launched.health;
        #[cfg(feature = "health")]
        crate::health::report(&mut health, ServingStatus::Serving).await;

        self.set_state(ServerState::Running);
        tracing::info!(
            grpc = %addrs.grpc,
            gateway = %addrs.gateway,
            metrics = %addrs.metrics,
            "Server running"
        );

        let outcome = tokio::select! {
            _ = ctx.cancelled() => {
                tracing::info!("Context cancelled, initiating graceful shutdown");
                Ok(())
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("Initiating graceful shutdown");
                Ok(())
            }
            Some(err) = errors.recv() => {
                tracing::error!(error = %err, "Serve loop failed, shutting down");
                Err(err)
            }
        };

        self.set_state(ServerState::ShuttingDown);
        #[cfg(feature = "health")]
        crate::health::report(&mut health, ServingStatus::NotServing).await;

        self.shutdown.cancel();
        self.drain(tasks).await;
        self.set_state(ServerState::Stopped);
        tracing::info!("Server shut down");

        outcome
    }

    async fn launch(
        &self,
        tasks: &mut JoinSet<()>,
        errors: &ErrorSender,
    ) -> Result<Launched, ServerError> {
        let registry = MetricsRegistry::register()?;
        tracing::info!("Metrics registered");

        let metrics_path = self.config.metrics_route();
        let (metrics_listener, metrics_addr) =
            bind("metrics", self.config.metrics_addr().map_err(|e| self.invalid_address(e))?).await?;
        self.spawn_http(
            tasks,
            "metrics",
            metrics_listener,
            registry.router(&metrics_path),
            errors.clone(),
        );
        tracing::info!(addr = %metrics_addr, path = %metrics_path, "Metrics endpoint listening");

        let (grpc_listener, grpc_addr) =
            bind("gRPC", self.config.grpc_addr().map_err(|e| self.invalid_address(e))?).await?;

        let mut routes = RoutesBuilder::default();
        for adapter in &self.adapters {
            adapter.attach_to_server(&mut routes);
            tracing::info!(adapter = adapter.name(), "Adapter registered");
        }

        let descriptors: Vec<&[u8]> = self
            .adapters
            .iter()
            .filter_map(|adapter| adapter.file_descriptor_set())
            .collect();
        routes.add_service(reflection_service(&descriptors)?);
        routes.add_service(reflection_service_v1alpha(&descriptors)?);

        #[cfg(feature = "health")]
        let health = {
            let (reporter, service) = crate::health::health_service();
            routes.add_service(service);
            reporter
        };

        let channel = internal_channel(grpc_addr)?;
        let gateway = gateway_router(&self.adapters, channel)?;
        let (gateway_listener, gateway_addr) =
            bind("gateway", self.config.gateway_addr().map_err(|e| self.invalid_address(e))?).await?;

        let incoming = TcpIncoming::from_listener(grpc_listener, self.config.tcp_nodelay, None)
            .map_err(|source| ServerError::Bind {
                listener: "gRPC",
                addr: grpc_addr,
                source: io::Error::other(source),
            })?;

        let service = self.config.service_name.as_str();
        let router = tonic::transport::Server::builder()
            .layer(MetricsLayer::new(registry, service))
            .layer(TraceLayer::new(service))
            .layer(tonic::service::interceptor(self.interceptors.clone()))
            .add_routes(routes.routes());

        let shutdown = self.shutdown.clone();
        let grpc_errors = errors.clone();
        tasks.spawn(async move {
            tracing::info!(addr = %grpc_addr, "gRPC server listening");
            if let Err(err) = router
                .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
                .await
            {
                tracing::error!(error = %err, "gRPC serve loop failed");
                let _ = grpc_errors.try_send(ServerError::Transport(err));
            }
            tracing::info!("gRPC server stopped");
        });

        self.spawn_http(tasks, "gateway", gateway_listener, gateway, errors.clone());
        tracing::info!(addr = %gateway_addr, grpc = %grpc_addr, "HTTP gateway listening");

        Ok(Launched {
            addrs: BoundAddrs {
                grpc: grpc_addr,
                gateway: gateway_addr,
                metrics: metrics_addr,
            },
            #[cfg(feature = "health")]
            health,
        })
    }

    fn spawn_http(
        &self,
        tasks: &mut JoinSet<()>,
        name: &'static str,
        listener: TcpListener,
        router: Router,
        errors: ErrorSender,
    ) {
        let shutdown = self.shutdown.clone();
        tasks.spawn(async move {
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!(listener = name, error = %err, "HTTP serve loop failed");
                let _ = errors.try_send(ServerError::Http(err));
            }
            tracing::info!(listener = name, "HTTP server stopped");
        });
    }

    /// Wait for the serve loops, aborting them after the graceful timeout.
    async fn drain(&self, tasks: &mut JoinSet<()>) {
        let timeout = self.config.graceful_shutdown_timeout();
        let graceful = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    if err.is_panic() {
                        tracing::error!(error = %err, "Serve loop panicked");
                    }
                }
            }
        })
        .await;

        if graceful.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Graceful shutdown timed out, aborting serve loops"
            );
            tasks.shutdown().await;
        }
    }

    fn set_state(&self, state: ServerState) {
        self.state.send_replace(state);
        tracing::debug!(state = %state, "Server state changed");
    }

    fn invalid_address(&self, source: std::net::AddrParseError) -> ServerError {
        ServerError::InvalidAddress {
            host: self.config.host.clone(),
            source,
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("service", &self.config.service_name)
            .field("state", &self.state())
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("interceptors", &self.interceptors.len())
            .field("addrs", &self.local_addrs())
            .finish()
    }
}

async fn bind(
    listener: &'static str,
    addr: SocketAddr,
) -> Result<(TcpListener, SocketAddr), ServerError> {
    let bind_error = |source| ServerError::Bind {
        listener,
        addr,
        source,
    };
    let socket = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local = socket.local_addr().map_err(bind_error)?;
    Ok((socket, local))
}

/// Wait for shutdown signals (SIGINT, SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// A token cancelled on SIGINT or SIGTERM, for passing to [`Server::start`].
///
/// Must be called from within a tokio runtime.
pub fn signal_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });
    token
}
