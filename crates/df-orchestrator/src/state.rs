//! Process-wide orchestrator state

use std::sync::Arc;

use df_core::config::FleetConfig;
use df_core::error::SessionError;
use df_core::{Credential, HostId};
use df_discovery::{DiscoveryEngine, HostRange, NetworkContext};
use df_remote::{
    ActionRegistry, ActionRunner, Dialer, KeyPurger, RemoteSession, SshDialer, SshKeygenPurger,
};
use df_tunnel::{SshTunnelLauncher, TunnelLauncher, TunnelOrchestrator, TunnelRegistry};

/// Everything request handlers share
pub struct FleetState {
    pub config: FleetConfig,
    pub actions: ActionRegistry,
    pub runner: ActionRunner,
    pub tunnels: TunnelOrchestrator,
    dialer: Arc<dyn Dialer>,
    purger: Arc<dyn KeyPurger>,
    discovery: Option<DiscoveryEngine>,
}

impl FleetState {
    /// Production state: russh sessions, ssh-keygen purges, sshpass tunnels
    pub fn new(config: FleetConfig) -> Self {
        let dialer = Arc::new(SshDialer::new(&config.ssh, config.network.admin_port));
        let purger = Arc::new(SshKeygenPurger::new(
            config.ssh.keygen_program.clone(),
            config.ssh.known_hosts_path.clone(),
        ));
        let launcher = Arc::new(SshTunnelLauncher::new(&config.tunnel));
        Self::with_parts(config, dialer, purger, launcher)
    }

    /// State with explicit transport and tunnel seams
    pub fn with_parts(
        config: FleetConfig,
        dialer: Arc<dyn Dialer>,
        purger: Arc<dyn KeyPurger>,
        launcher: Arc<dyn TunnelLauncher>,
    ) -> Self {
        let tunnels = TunnelOrchestrator::new(
            &config.tunnel,
            launcher,
            Arc::new(TunnelRegistry::new()),
        );
        Self {
            actions: ActionRegistry::with_templates(&config.actions),
            runner: ActionRunner::new(config.backup.clone()),
            tunnels,
            dialer,
            purger,
            discovery: None,
            config,
        }
    }

    /// Use a fixed discovery engine instead of one built per call
    pub fn with_discovery(mut self, engine: DiscoveryEngine) -> Self {
        self.discovery = Some(engine);
        self
    }

    /// Open a session for one request
    pub async fn open_session(
        &self,
        host: &HostId,
        credential: &Credential,
    ) -> Result<RemoteSession, SessionError> {
        RemoteSession::open(
            host.clone(),
            credential,
            self.dialer.as_ref(),
            self.purger.as_ref(),
            self.config.ssh.command_timeout,
        )
        .await
    }

    /// Run discovery over the configured range
    pub async fn discover(&self) -> Vec<df_core::Host> {
        match &self.discovery {
            Some(engine) => {
                let range = HostRange::from_config(&self.config.network, engine.context().own_address);
                engine.discover_report(&range).await
            }
            None => {
                let context = NetworkContext::detect().await;
                let range = HostRange::from_config(&self.config.network, context.own_address);
                let engine = DiscoveryEngine::from_config(&self.config.network, context);
                engine.discover_report(&range).await
            }
        }
    }
}
