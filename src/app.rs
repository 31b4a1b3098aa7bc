use crate::args::Args;
use color_eyre::Result;
use eyre::Context as _;
use std::sync::Arc;
use teeworlds_exporter_config::{
    Config,
    MasterEndpoint,
};
use teeworlds_exporter_http::{
    create_router,
    serve,
    AppState,
};
use teeworlds_exporter_sources::{
    directory::{
        HttpDirectory,
        UdpDirectory,
    },
    DirectoryRegistry,
    DirectorySource,
    EconConnection,
    EconId,
    LiveRegistry,
    LiveSource,
    SharedDiagnostics,
    TracingDiagnostics,
};
use tokio::net::TcpListener;

pub struct App {
    args: Args,
    config: Config,
    diagnostics: SharedDiagnostics,
    directories: DirectoryRegistry,
    econs: LiveRegistry,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let config = Config::from_file(&args.config_path)
            .wrap_err_with(|| format!("Failed to load the configuration from {:?}", args.config_path))?;
        info!(
            masters = config.servers.master.len(),
            econs = config.servers.econ.len(),
            "configuration loaded"
        );

        Ok(Self {
            args,
            config,
            diagnostics: TracingDiagnostics::shared(),
            directories: DirectoryRegistry::new(),
            econs: LiveRegistry::new(),
        })
    }

    /// Connects every configured source, serves scrapes until ctrl-c and stops
    /// all source loops afterwards.
    pub async fn run(self) -> Result<()> {
        self.register_masters().await?;
        self.register_econs().await?;

        let started = self.directories.start_all().await + self.econs.start_all().await;
        info!(started, "source loops running");

        let state = AppState::new(self.directories.clone(), self.econs.clone(), &self.args.endpoint);
        let address = self.args.listen_address();
        let listener = TcpListener::bind(address)
            .await
            .wrap_err_with(|| format!("Failed to listen on {address}"))?;
        let served = serve(listener, create_router(state), shutdown_signal()).await;

        self.directories.shutdown();
        self.econs.shutdown();
        info!("stopped");
        served.wrap_err("The HTTP server failed")
    }

    async fn register_masters(&self) -> Result<()> {
        let timeout = self.args.poll_timeout;
        let http_client = reqwest::Client::new();
        for master in &self.config.servers.master {
            let source = match &master.endpoint {
                MasterEndpoint::Http { url } => DirectorySource::new(
                    HttpDirectory::with_client(url.clone(), http_client.clone()).with_timeout(timeout),
                    timeout,
                    self.diagnostics.clone(),
                ),
                MasterEndpoint::Udp { host, port } => {
                    let directory = UdpDirectory::connect(host.clone(), *port)
                        .await
                        .wrap_err_with(|| format!("Failed to open a session with {}", master.endpoint))?;
                    DirectorySource::new(directory, timeout, self.diagnostics.clone())
                }
            };
            debug!(source = %source.metadata(), cooldown = ?master.refresh_cooldown(), "registering");
            self.directories
                .register(Arc::new(source), master.refresh_cooldown())?;
        }
        Ok(())
    }

    async fn register_econs(&self) -> Result<()> {
        let timeout = self.args.poll_timeout;
        for econ in &self.config.servers.econ {
            let connection = EconConnection::connect(&econ.host, econ.port, &econ.password, timeout)
                .await
                .wrap_err_with(|| format!("Failed to connect to the econ console at {}", econ.address()))?;
            let source = LiveSource::new(
                EconId::new(econ.host.clone(), econ.port),
                connection,
                self.diagnostics.clone(),
            )?;
            info!(source = %source.metadata(), "econ authenticated");
            self.econs.register(Arc::new(source), ())?;
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {err}");
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
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
