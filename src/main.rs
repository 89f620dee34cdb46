//! roostd - Roost XMPP Daemon
//!
//! Bootstrap: tracing, config, storage providers, runtime context, gateway.

use roost_proto::Entity;
use roostd::archive::{
    ArchivingBrokerDecorator, MESSAGE_ARCHIVES_KEY, MemoryMessageArchives,
    MessageArchives,
};
use roostd::config::Config;
use roostd::network::Gateway;
use roostd::protocol::broker::StanzaBrokerDecorator;
use roostd::server::runtime::ServerRuntimeContext;
use roostd::storage::accounts::{ACCOUNT_STORE_KEY, AccountStore, MemoryAccountStore};
use roostd::storage::StorageProviderRegistry;
use roostd::{handlers, http, metrics};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path).map_err(|err| {
        error!(path = %config_path, error = %err, "Failed to load config");
        err
    })?;

    info!(domain = %config.server.domain, "Starting roostd");

    if config.users.is_empty() {
        warn!("No users configured; nobody will be able to authenticate");
    }

    // Storage providers: accounts always, archives when enabled.
    let storage = Arc::new(StorageProviderRegistry::new());

    let accounts = Arc::new(MemoryAccountStore::new());
    for user in &config.users {
        accounts.add_user(&user.name, &user.password_hash);
    }
    info!(count = accounts.len(), "Loaded local accounts");
    let account_provider: Arc<dyn AccountStore> = accounts;
    storage.register(ACCOUNT_STORE_KEY, account_provider);

    let mut decorators: Vec<Arc<dyn StanzaBrokerDecorator>> = Vec::new();
    if config.archive.enabled {
        let archives = Arc::new(MemoryMessageArchives::new());
        for user in &config.users {
            archives.provision(&Entity::new(Some(&user.name), &config.server.domain, None));
        }
        info!(count = archives.len(), "Provisioned message archives");
        let archive_provider: Arc<dyn MessageArchives> = archives;
        storage.register(MESSAGE_ARCHIVES_KEY, archive_provider);
        decorators.push(Arc::new(ArchivingBrokerDecorator::new(Arc::clone(&storage))));
    } else {
        info!("Message archiving disabled");
    }

    let tls_available = config.tls.is_some();
    let registry = handlers::default_registry(tls_available);
    info!(handlers = registry.len(), starttls = tls_available, "Handler registry built");

    let server = ServerRuntimeContext::new(
        config.domain_entity(),
        registry,
        storage,
        decorators,
    );

    // Prometheus metrics are optional; port 0 disables the endpoint.
    match config.server.metrics_port {
        Some(port) if port > 0 => {
            metrics::init();
            tokio::spawn(async move {
                http::run_http_server(port).await;
            });
            info!(port, "Prometheus HTTP server started");
        }
        _ => info!("Metrics disabled"),
    }

    let gateway = Gateway::bind(config.listen.address, config.tls.as_ref(), server).await?;
    gateway.run().await
}
