//! Assembles the listener, the optional upstream stream and the payload
//! processor from one [`StationConfig`].

use crate::catalog::{InMemoryCatalog, ProductLookup};
use crate::processor::{DownstreamConfig, PayloadProcessor};
use anyhow::{Context, Result};
use network::{ActivityLog, ActivityObserver, ListenerConfig, ListenerServer, StreamClientConfig};
use station_config::{StationConfig, StreamSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Upstream stream client settings
pub fn stream_client_config(settings: &StreamSettings) -> StreamClientConfig {
    StreamClientConfig {
        host: settings.host.clone(),
        port: settings.port,
        connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
        base_backoff: Duration::from_millis(settings.base_backoff_ms),
        max_backoff: Duration::from_millis(settings.max_backoff_ms),
        ..StreamClientConfig::default()
    }
}

/// Listener settings, with the upstream stream attached when enabled
pub fn listener_config(config: &StationConfig) -> ListenerConfig {
    let listener = &config.listener;
    ListenerConfig {
        bind_address: listener.bind_address.clone(),
        port: listener.port,
        max_connections: listener.max_connections,
        read_buffer_size: listener.read_buffer_size,
        notify_peer: Some((listener.notify_host.clone(), listener.notify_port)),
        upstream: config
            .stream
            .enabled
            .then(|| stream_client_config(&config.stream)),
        ..ListenerConfig::default()
    }
}

/// Catalog from `catalog.path`, or an empty one
pub fn load_catalog(config: &StationConfig) -> Result<Arc<dyn ProductLookup>> {
    match config.catalog_path() {
        Some(path) => {
            let catalog = InMemoryCatalog::from_json_file(&path)
                .with_context(|| format!("Failed to load product catalog {}", path.display()))?;
            Ok(Arc::new(catalog))
        }
        None => {
            info!("No product catalog configured, every lookup will miss");
            Ok(Arc::new(InMemoryCatalog::new()))
        }
    }
}

/// Listener plus processor sharing one activity log
pub struct Station {
    listener: ListenerServer,
    processor: Arc<PayloadProcessor>,
    log: Arc<ActivityLog>,
}

impl Station {
    pub fn new(config: &StationConfig, lookup: Arc<dyn ProductLookup>) -> Self {
        let log = Arc::new(ActivityLog::default());
        let processor = Arc::new(PayloadProcessor::new(
            lookup,
            DownstreamConfig::from_settings(&config.downstream),
            log.clone(),
        ));
        let listener = ListenerServer::with_activity_log(listener_config(config), log.clone());
        Self {
            listener,
            processor,
            log,
        }
    }

    /// Bind and start; failing to bind is the one fatal startup error
    pub fn start(&self, observer: Option<Arc<dyn ActivityObserver>>) -> Result<SocketAddr> {
        let addr = self
            .listener
            .start(self.processor.clone(), observer)
            .context("Failed to start listener")?;
        info!(addr = %addr, "Station listening");
        Ok(addr)
    }

    pub async fn stop(&self) {
        self.listener.stop().await;
    }

    pub fn listener(&self) -> &ListenerServer {
        &self.listener
    }

    pub fn processor(&self) -> &Arc<PayloadProcessor> {
        &self.processor
    }

    pub fn activity_log(&self) -> &Arc<ActivityLog> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_listener_config_mapping() {
        let mut config = StationConfig::default();
        config.listener.port = 35000;
        config.listener.notify_port = 4000;
        assert!(listener_config(&config).upstream.is_none());

        config.stream.enabled = true;
        config.stream.base_backoff_ms = 250;
        let mapped = listener_config(&config);
        assert_eq!(mapped.port, 35000);
        assert_eq!(mapped.notify_peer, Some(("127.0.0.1".to_string(), 4000)));
        let upstream = mapped.upstream.unwrap();
        assert_eq!(upstream.base_backoff, Duration::from_millis(250));
        assert_eq!(upstream.max_backoff, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_catalog_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, r#"[{"Laufende Nummer": 4, "Produktnummer": "WU44"}]"#).unwrap();

        let mut config = StationConfig::default();
        config.catalog.path = Some(path.display().to_string());
        let catalog = load_catalog(&config).unwrap();
        let record = catalog.find_by_identifier("wu-44").await.unwrap().unwrap();
        assert_eq!(record.laufende_nummer, 4);
    }

    #[test]
    fn test_missing_catalog_file_fails() {
        let mut config = StationConfig::default();
        config.catalog.path = Some("/nonexistent/catalog.json".into());
        let err = load_catalog(&config).err().unwrap();
        assert!(err.to_string().contains("Failed to load product catalog"));
    }
}
