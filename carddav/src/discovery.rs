// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Address book discovery (RFC 6764).
//!
//! A user supplied domain or URL is turned into an ordered list of server
//! candidates (DNS SRV records, a table of known providers, and finally the
//! input itself). Each candidate is probed at a list of context paths for the
//! chain current-user-principal, addressbook-home-set, address books. The
//! first combination yielding at least one address book wins.

use std::fmt;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use url::Url;

use crate::client::CardDavClient;
use crate::config::CardDavConfig;
use crate::error::CardDavError;
use crate::types::AddressbookInfo;

/// Context paths probed on every candidate, after any DNS TXT paths.
pub const DEFAULT_CONTEXT_PATHS: [&str; 3] = ["/.well-known/carddav", "/", "/co"];

/// Domains whose address books are served from another host.
pub const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("gmail.com", "www.googleapis.com"),
    ("googlemail.com", "www.googleapis.com"),
];

/// URL scheme of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// The scheme name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// The default port.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parsed discovery input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Scheme to use for the raw host.
    pub scheme: Scheme,
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Path given in the input, `/` if none.
    pub path: String,
    /// Whether only TLS candidates may be used.
    pub force_ssl: bool,
}

/// Parses a domain or URL. Plain HTTP is only used when the input starts
/// with `http://`; everything else defaults to HTTPS on port 443.
///
/// # Errors
///
/// Returns [`CardDavError::Config`] if the input is not a usable URL.
pub fn parse_target(input: &str) -> Result<Target, CardDavError> {
    let input = input.trim();
    let has_scheme = input.contains("://");
    let url = if has_scheme {
        Url::parse(input)
    } else {
        Url::parse(&format!("https://{input}"))
    }
    .map_err(|e| CardDavError::Config(format!("Invalid discovery URI '{input}': {e}")))?;

    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => {
            return Err(CardDavError::Config(format!(
                "Unsupported scheme '{other}' in '{input}'"
            )));
        }
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CardDavError::Config(format!("No host in '{input}'")))?
        .to_string();

    Ok(Target {
        scheme,
        port: url.port().unwrap_or_else(|| scheme.default_port()),
        host,
        path: url.path().to_string(),
        force_ssl: scheme == Scheme::Https,
    })
}

/// A server to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCandidate {
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Scheme.
    pub scheme: Scheme,
    /// The SRV record name this candidate came from.
    pub srv_name: Option<String>,
}

impl ServerCandidate {
    /// The root URL of the candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot appear in a URL.
    pub fn base_url(&self) -> Result<Url, CardDavError> {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        Ok(Url::parse(&format!("{}://{host}:{}/", self.scheme, self.port))?)
    }
}

/// A DNS SRV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    /// Lower is preferred.
    pub priority: u16,
    /// Tie breaker among equal priorities, lower first.
    pub weight: u16,
    /// Target port.
    pub port: u16,
    /// Target host, without the trailing dot.
    pub target: String,
}

/// DNS lookups used by discovery.
#[async_trait]
pub trait DnsResolver: fmt::Debug + Send + Sync {
    /// SRV records at `name`.
    async fn srv_records(&self, name: &str) -> Result<Vec<SrvRecord>, CardDavError>;

    /// TXT records at `name`, each as one string.
    async fn txt_records(&self, name: &str) -> Result<Vec<String>, CardDavError>;
}

/// Resolver using the system DNS configuration.
#[derive(Clone)]
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl fmt::Debug for SystemResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemResolver").finish_non_exhaustive()
    }
}

impl SystemResolver {
    /// Creates a resolver from `/etc/resolv.conf` or the platform
    /// equivalent.
    ///
    /// # Errors
    ///
    /// Returns an error if the system configuration cannot be read.
    pub fn new() -> Result<Self, CardDavError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| CardDavError::Config(format!("DNS resolver: {e}")))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn srv_records(&self, name: &str) -> Result<Vec<SrvRecord>, CardDavError> {
        let lookup = self
            .resolver
            .srv_lookup(name)
            .await
            .map_err(|e| CardDavError::Network(e.to_string()))?;
        Ok(lookup
            .iter()
            .map(|srv| SrvRecord {
                priority: srv.priority(),
                weight: srv.weight(),
                port: srv.port(),
                target: srv.target().to_utf8().trim_end_matches('.').to_string(),
            })
            .collect())
    }

    async fn txt_records(&self, name: &str) -> Result<Vec<String>, CardDavError> {
        let lookup = self
            .resolver
            .txt_lookup(name)
            .await
            .map_err(|e| CardDavError::Network(e.to_string()))?;
        Ok(lookup
            .iter()
            .flat_map(|txt| txt_strings(txt.txt_data()))
            .collect())
    }
}

/// Decodes the character-strings of one TXT record, each as its own entry.
fn txt_strings(data: &[Box<[u8]>]) -> Vec<String> {
    data.iter()
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Orders SRV records by ascending priority, then ascending weight.
///
/// RFC 2782 asks for a weighted random choice among equal priorities; a
/// plain ascending order is used instead.
pub fn sort_srv_records(records: &mut [SrvRecord]) {
    records.sort_by_key(|r| (r.priority, r.weight));
}

/// Extracts the `path=` values of TXT character-strings, in record order.
#[must_use]
pub fn txt_paths(records: &[String]) -> Vec<String> {
    records
        .iter()
        .filter_map(|entry| entry.trim().strip_prefix("path="))
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

/// Discovers address books from a domain or URL.
#[derive(Debug)]
pub struct Discovery {
    client: CardDavClient,
    resolver: Box<dyn DnsResolver>,
}

impl Discovery {
    /// Creates a discovery using the system DNS resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the resolver cannot be created.
    pub fn new(config: CardDavConfig) -> Result<Self, CardDavError> {
        Ok(Self::with_resolver(
            CardDavClient::new(config)?,
            Box::new(SystemResolver::new()?),
        ))
    }

    /// Creates a discovery with a custom resolver.
    #[must_use]
    pub fn with_resolver(client: CardDavClient, resolver: Box<dyn DnsResolver>) -> Self {
        Self { client, resolver }
    }

    /// Finds the address books reachable from the configured base URL.
    ///
    /// Never fails: every error is logged and the next candidate tried. An
    /// empty list means nothing was found.
    #[tracing::instrument(skip_all, fields(uri = %self.client.config().base_url))]
    pub async fn discover_addressbooks(&self) -> Vec<AddressbookInfo> {
        let target = match parse_target(&self.client.config().base_url) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(err = %e, "cannot discover");
                return Vec::new();
            }
        };

        for candidate in self.resolve_server_candidates(&target).await {
            let base = match candidate.base_url() {
                Ok(base) => base,
                Err(e) => {
                    tracing::warn!(host = %candidate.host, err = %e, "skipping candidate");
                    continue;
                }
            };

            let mut paths = self.resolve_context_paths(&candidate).await;
            if is_raw_input(&candidate, &target) && target.path != "/" {
                paths.insert(0, target.path.clone());
            }

            for path in paths {
                let context = match base.join(&path) {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::debug!(%path, err = %e, "skipping context path");
                        continue;
                    }
                };
                match self.probe(&context).await {
                    Ok(books) if !books.is_empty() => {
                        tracing::info!(%context, count = books.len(), "found address books");
                        return books;
                    }
                    Ok(_) => tracing::debug!(%context, "no address books"),
                    Err(e) => tracing::debug!(%context, err = %e, "probe failed"),
                }
            }
        }

        tracing::warn!("no address books found");
        Vec::new()
    }

    /// Builds the ordered candidate list for `target`.
    pub async fn resolve_server_candidates(&self, target: &Target) -> Vec<ServerCandidate> {
        let mut candidates = Vec::new();

        let mut services = vec![("_carddavs._tcp", Scheme::Https)];
        if !target.force_ssl {
            services.push(("_carddav._tcp", Scheme::Http));
        }
        for (service, scheme) in services {
            let name = format!("{service}.{}", target.host);
            let mut records: Vec<_> = match self.resolver.srv_records(&name).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::debug!(%name, err = %e, "SRV lookup failed");
                    Vec::new()
                }
            }
            .into_iter()
            // "." as target means the service is explicitly not available.
            .filter(|r| !r.target.is_empty() && r.target != ".")
            .collect();
            if records.is_empty() {
                continue;
            }

            sort_srv_records(&mut records);
            candidates.extend(records.into_iter().map(|r| ServerCandidate {
                host: r.target,
                port: r.port,
                scheme,
                srv_name: Some(name.clone()),
            }));
            break;
        }

        if let Some((_, host)) = KNOWN_PROVIDERS
            .iter()
            .find(|(domain, _)| target.host.eq_ignore_ascii_case(domain))
        {
            candidates.push(ServerCandidate {
                host: (*host).to_string(),
                port: Scheme::Https.default_port(),
                scheme: Scheme::Https,
                srv_name: None,
            });
        }

        candidates.push(ServerCandidate {
            host: target.host.clone(),
            port: target.port,
            scheme: target.scheme,
            srv_name: None,
        });

        tracing::debug!(count = candidates.len(), "resolved server candidates");
        candidates
    }

    /// Context paths to probe on `candidate`: TXT `path=` entries of its SRV
    /// name, then [`DEFAULT_CONTEXT_PATHS`].
    pub async fn resolve_context_paths(&self, candidate: &ServerCandidate) -> Vec<String> {
        let mut paths = Vec::new();
        if let Some(name) = &candidate.srv_name {
            match self.resolver.txt_records(name).await {
                Ok(records) => paths.extend(txt_paths(&records)),
                Err(e) => tracing::debug!(%name, err = %e, "TXT lookup failed"),
            }
        }
        paths.extend(DEFAULT_CONTEXT_PATHS.iter().map(|p| (*p).to_string()));
        paths
    }

    async fn probe(&self, context: &Url) -> Result<Vec<AddressbookInfo>, CardDavError> {
        let principal = self.client.current_user_principal(context).await?;
        tracing::debug!(%principal, "found principal");

        let mut books = Vec::new();
        for home in self.client.addressbook_home_set(&principal).await? {
            tracing::debug!(%home, "found addressbook home");
            match self.client.list_addressbooks(&home).await {
                Ok(found) => books.extend(found),
                Err(e) => tracing::debug!(%home, err = %e, "listing address books failed"),
            }
        }
        Ok(books)
    }
}

fn is_raw_input(candidate: &ServerCandidate, target: &Target) -> bool {
    candidate.srv_name.is_none()
        && candidate.host == target.host
        && candidate.port == target.port
        && candidate.scheme == target.scheme
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srv(priority: u16, weight: u16, target: &str) -> SrvRecord {
        SrvRecord {
            priority,
            weight,
            port: 443,
            target: target.to_string(),
        }
    }

    #[test]
    fn parse_target_defaults_to_https() {
        let target = parse_target("example.com").unwrap();
        assert_eq!(target.scheme, Scheme::Https);
        assert_eq!(target.port, 443);
        assert_eq!(target.host, "example.com");
        assert_eq!(target.path, "/");
        assert!(target.force_ssl);
    }

    #[test]
    fn parse_target_allows_explicit_http() {
        let target = parse_target("http://example.com:8080/dav/").unwrap();
        assert_eq!(target.scheme, Scheme::Http);
        assert_eq!(target.port, 8080);
        assert_eq!(target.path, "/dav/");
        assert!(!target.force_ssl);

        let target = parse_target("http://example.com").unwrap();
        assert_eq!(target.port, 80);
    }

    #[test]
    fn parse_target_rejects_other_schemes() {
        assert!(matches!(
            parse_target("ftp://example.com"),
            Err(CardDavError::Config(_))
        ));
    }

    #[test]
    fn srv_records_sort_by_priority_then_weight() {
        let mut records = vec![
            srv(20, 0, "d"),
            srv(10, 50, "b"),
            srv(10, 5, "a"),
            srv(15, 0, "c"),
        ];
        sort_srv_records(&mut records);
        let order: Vec<_> = records.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn txt_paths_keeps_record_order() {
        let records = vec![
            "path=/dav/".to_string(),
            "other=1".to_string(),
            "path=/second/".to_string(),
        ];
        assert_eq!(txt_paths(&records), vec!["/dav/", "/second/"]);
    }

    #[test]
    fn txt_character_strings_are_separate_entries() {
        let data: Vec<Box<[u8]>> = vec![
            b"txtvers=1".to_vec().into_boxed_slice(),
            b"path=/dav/".to_vec().into_boxed_slice(),
        ];
        let records = txt_strings(&data);
        assert_eq!(records, vec!["txtvers=1", "path=/dav/"]);
        assert_eq!(txt_paths(&records), vec!["/dav/"]);
    }

    #[test]
    fn candidate_base_url() {
        let candidate = ServerCandidate {
            host: "contacts.example.com".to_string(),
            port: 8443,
            scheme: Scheme::Https,
            srv_name: None,
        };
        assert_eq!(
            candidate.base_url().unwrap().as_str(),
            "https://contacts.example.com:8443/"
        );
    }
}
