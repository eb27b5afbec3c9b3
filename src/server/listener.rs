use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::server::manager::ConnectionManager;
use crate::server::tls;
use crate::server::transport::Transport;

pub async fn run(cfg: &Config, manager: ConnectionManager) -> anyhow::Result<()> {
    let acceptor = cfg
        .server
        .tls
        .as_ref()
        .map(tls::load_acceptor)
        .transpose()
        .context("Failed to load TLS material")?;

    let listener = TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.listen_addr))?;
    info!(
        addr = %cfg.server.listen_addr,
        tls = acceptor.is_some(),
        timeout_secs = cfg.server.timeout_secs,
        "Listening"
    );

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };

        if let Err(e) = socket.set_nodelay(true) {
            warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let transport = match &acceptor {
            Some(acceptor) => Transport::secure(socket, peer, acceptor.clone()),
            None => Transport::plain(socket, peer),
        };

        manager.accept(transport);
    }
}
