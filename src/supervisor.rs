use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::acl::Acl;
use crate::agent::Agent;
use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::http_resolver::HttpResolver;
use crate::rules::{Defaults, RuleList};

/// Holds the shared cache and current rule list; spawns one Agent per
/// listen endpoint and applies reloads atomically across all of them.
pub struct Supervisor {
    cache: Arc<ResponseCache>,
    rules: Arc<RwLock<Arc<RuleList>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Supervisor {
    pub async fn start(config: &AppConfig, initial_rules: RuleList) -> std::io::Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let cache = Arc::new(ResponseCache::new());
        let rules = Arc::new(RwLock::new(Arc::new(initial_rules)));
        let acl = Arc::new(Acl::from_cidr_strings(config.network_whitelist.as_deref()));
        let http_resolver = Arc::new(HttpResolver::new());
        let defaults = Defaults {
            local_name_server: config.local_name_server.clone(),
            world_name_server: config.world_name_server.clone(),
            use_http_query: config.use_http_query,
            query_timeout_ms: config.query_timeout_ms,
            compression_mutation: config.compression_mutation,
        };

        for spec in config.listen_specs() {
            let addr = spec
                .parse()
                .unwrap_or_else(|_| format!("{spec}:53").parse().expect("invalid listenOn spec"));

            let agent = Arc::new(
                Agent::bind(
                    addr,
                    Arc::clone(&cache),
                    Arc::clone(&rules),
                    Arc::clone(&acl),
                    Arc::clone(&http_resolver),
                    defaults.clone(),
                    config.cache_response,
                    config.cache_age,
                    shutdown_tx.subscribe(),
                )
                .await?,
            );

            tokio::spawn(agent.run(shutdown_tx.subscribe()));
        }

        Ok(Self {
            cache,
            rules,
            shutdown_tx,
        })
    }

    /// Loads rules from `path` and replaces the live rule list on every
    /// Agent atomically, then clears the cache. A missing or invalid rules
    /// file leaves the previous rules in place (the loader already falls
    /// back to an empty list on its own I/O or parse error, but an empty
    /// reload result is deliberately *not* applied) — the cache is still
    /// cleared either way, matching the specified post-patch behavior.
    pub fn reload(&self, path: &std::path::Path) {
        let loaded = RuleList::load_or_empty(path);
        if loaded.is_empty() {
            warn!(path = %path.display(), "reload produced an empty rule list, keeping previous rules");
        } else {
            *self.rules.write() = Arc::new(loaded);
            info!(path = %path.display(), "rule list reloaded");
        }
        self.cache.clear();
    }

    pub fn shutdown(&self) {
        info!("supervisor initiating shutdown");
        let _ = self.shutdown_tx.send(());
    }
}
