//! C7 MX Resolver: `resolve(domain) -> list[hostname]`, sorted by
//! ascending preference, raising `TemporaryFailure` on any error (§4.7).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use lru::LruCache;
use mailgun_common::Domain;

use crate::error::TemporaryFailure;

#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Resolve the mail servers for `domain`, most-preferred first.
    async fn resolve(&self, domain: &Domain) -> Result<Vec<String>, TemporaryFailure>;
}

/// An in-process stub backed by a static `domain -> [hostnames]` map,
/// required by §4.7 for tests. Unknown domains resolve to an empty list,
/// which the delivery agent treats as `TemporaryFailure` (§4.3 step 2).
#[derive(Debug, Clone, Default)]
pub struct StaticMxResolver {
    routes: HashMap<String, Vec<String>>,
}

impl StaticMxResolver {
    #[must_use]
    pub fn new(routes: HashMap<String, Vec<String>>) -> Self {
        Self { routes }
    }

    /// Parse the `STATIC_MX_CONFIG` wire format: `"dom1:mx1,mx2;dom2:mx3"`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut routes = HashMap::new();
        for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((domain, hosts)) = entry.split_once(':') else {
                continue;
            };
            let hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
            routes.insert(domain.trim().to_ascii_lowercase(), hosts);
        }
        Self { routes }
    }

    pub fn insert(&mut self, domain: impl Into<String>, hosts: Vec<String>) {
        self.routes.insert(domain.into(), hosts);
    }
}

#[async_trait]
impl MxResolver for StaticMxResolver {
    async fn resolve(&self, domain: &Domain) -> Result<Vec<String>, TemporaryFailure> {
        Ok(self
            .routes
            .get(domain.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// The production resolver: real MX lookups via `hickory-resolver`, with
/// an LRU cache and A/AAAA fallback per RFC 5321 §5.1 when a domain
/// publishes no MX records.
pub struct HickoryMxResolver {
    resolver: TokioAsyncResolver,
    cache: Mutex<LruCache<String, Vec<String>>>,
}

impl HickoryMxResolver {
    #[must_use]
    pub fn new(cache_size: usize) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(cache_size.max(1)).unwrap(),
            )),
        }
    }
}

#[async_trait]
impl MxResolver for HickoryMxResolver {
    async fn resolve(&self, domain: &Domain) -> Result<Vec<String>, TemporaryFailure> {
        if let Some(cached) = self.cache.lock().unwrap().get(domain.as_str()) {
            return Ok(cached.clone());
        }

        let mut hosts: Vec<(u16, String)> = match self.resolver.mx_lookup(domain.as_str()).await {
            Ok(lookup) => lookup
                .iter()
                .map(|mx| (mx.preference(), mx.exchange().to_ascii().trim_end_matches('.').to_string()))
                .collect(),
            Err(err) if err.is_no_records_found() => Vec::new(),
            Err(err) => return Err(TemporaryFailure(format!("MX lookup failed: {err}"))),
        };

        if hosts.is_empty() {
            // RFC 5321 §5.1: fall back to the domain's own address record.
            match self.resolver.lookup_ip(domain.as_str()).await {
                Ok(_) => hosts.push((0, domain.as_str().to_string())),
                Err(err) if err.is_no_records_found() => {
                    return Err(TemporaryFailure(format!(
                        "domain {domain} has neither MX nor address records"
                    )))
                }
                Err(err) => return Err(TemporaryFailure(format!("A/AAAA lookup failed: {err}"))),
            }
        }

        hosts.sort_by_key(|(preference, _)| *preference);
        let hosts: Vec<String> = hosts.into_iter().map(|(_, host)| host).collect();
        self.cache
            .lock()
            .unwrap()
            .put(domain.as_str().to_string(), hosts.clone());
        Ok(hosts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_configured_hosts_in_order() {
        let resolver = StaticMxResolver::parse("a.com:mx1.a.com,mx2.a.com;b.com:mx1.b.com");
        assert_eq!(
            resolver.resolve(&Domain::new("a.com")).await.unwrap(),
            vec!["mx1.a.com".to_string(), "mx2.a.com".to_string()]
        );
        assert_eq!(
            resolver.resolve(&Domain::new("b.com")).await.unwrap(),
            vec!["mx1.b.com".to_string()]
        );
    }

    #[tokio::test]
    async fn static_resolver_unknown_domain_is_empty() {
        let resolver = StaticMxResolver::default();
        assert!(resolver
            .resolve(&Domain::new("unresolvable.com"))
            .await
            .unwrap()
            .is_empty());
    }
}
