//! Connection resolution.
//!
//! A server in the account directory advertises several candidate addresses:
//! LAN, WAN, relay, IPv4 and IPv6. Which of them works depends on where this
//! client is, so the resolver finds out by asking each of them to list its
//! libraries.
//!
//! 1. The address that worked last time, if remembered, is probed alone. If
//!    it answers, resolution is done. If not, it is forgotten.
//! 2. Otherwise all `https` candidates are probed at the same time. The first
//!    one to answer wins and is remembered for next time; the others are
//!    abandoned.
//!
//! Plain `http` candidates are never tried. Every probe is bounded by
//! [`Config::probe_timeout`](crate::config::Config::probe_timeout).

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::task::JoinSet;
use url::Url;

use crate::{
    error::{Error, Result},
    protocol::{account::Resource, library::Section},
    server::Library,
    store::Store,
    token::AuthToken,
};

/// A working address of a media server and the credential to use with it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    pub base: Url,
    pub token: AuthToken,
    /// Display name of the server.
    pub name: String,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.name, self.base)
    }
}

/// Outcome of a successful resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub connection: Connection,
    /// Library sections as listed by the probe that succeeded.
    pub sections: Vec<Section>,
}

/// Why a candidate address did not work out.
#[derive(Debug)]
pub struct ProbeFailure {
    pub uri: Url,
    pub error: Error,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.uri, self.error)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{server} offers no secure connection")]
    NoSecureCandidate { server: String },

    #[error("{server} is unreachable ({})", join(failures))]
    AllCandidatesFailed {
        server: String,
        failures: Vec<ProbeFailure>,
    },
}

fn join(failures: &[ProbeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        Self::unavailable(e)
    }
}

/// Key under which the last working address of `server_id` is remembered.
#[must_use]
pub fn cache_key(server_id: &str) -> String {
    format!("last_uri_{server_id}")
}

pub struct Resolver<L> {
    library: Arc<L>,
    store: Arc<dyn Store>,
    probe_timeout: Duration,
}

impl<L: Library> Resolver<L> {
    #[must_use]
    pub fn new(library: Arc<L>, store: Arc<dyn Store>, probe_timeout: Duration) -> Self {
        Self {
            library,
            store,
            probe_timeout,
        }
    }

    /// Finds a working address for `resource`.
    ///
    /// The server's own access token is used when the directory lists one,
    /// `account_token` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an `Unavailable` error wrapping a [`ResolveError`] if the
    /// server has no secure candidates or none of them answered.
    pub async fn resolve(&self, resource: &Resource, account_token: &AuthToken) -> Result<Resolved> {
        let key = cache_key(&resource.client_identifier);
        let token = resource
            .access_token
            .clone()
            .unwrap_or_else(|| account_token.clone());

        if let Some(resolved) = self.try_cached(&key, resource, &token).await {
            info!("connected to {}", resolved.connection);
            return Ok(resolved);
        }

        let candidates: Vec<Url> = resource
            .connections
            .iter()
            .filter(|candidate| candidate.is_secure())
            .map(|candidate| candidate.uri.clone())
            .collect();
        if candidates.is_empty() {
            return Err(ResolveError::NoSecureCandidate {
                server: resource.name.clone(),
            }
            .into());
        }

        debug!(
            "probing {} candidates of {}",
            candidates.len(),
            resource.name
        );

        let mut probes = JoinSet::new();
        for base in candidates {
            let connection = Connection {
                base,
                token: token.clone(),
                name: resource.name.clone(),
            };
            probes.spawn(Self::probe(
                Arc::clone(&self.library),
                connection,
                self.probe_timeout,
            ));
        }

        let mut failures = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((connection, Ok(sections))) => {
                    probes.abort_all();

                    if let Err(e) = self.store.set(&key, connection.base.as_str()) {
                        warn!("failed to remember address of {}: {e}", connection.name);
                    }

                    info!("connected to {connection}");
                    return Ok(Resolved {
                        connection,
                        sections,
                    });
                }
                Ok((connection, Err(error))) => {
                    debug!("{} failed: {error}", connection.base);
                    failures.push(ProbeFailure {
                        uri: connection.base,
                        error,
                    });
                }
                Err(e) => error!("probe of {} did not complete: {e}", resource.name),
            }
        }

        Err(ResolveError::AllCandidatesFailed {
            server: resource.name.clone(),
            failures,
        }
        .into())
    }

    /// Probes the remembered address of `resource`, forgetting it if it
    /// does not work.
    async fn try_cached(
        &self,
        key: &str,
        resource: &Resource,
        token: &AuthToken,
    ) -> Option<Resolved> {
        let cached = match self.store.get(key) {
            Ok(cached) => cached?,
            Err(e) => {
                warn!("failed to look up remembered address: {e}");
                return None;
            }
        };

        let result = match Url::parse(&cached) {
            Ok(base) if base.scheme() == "https" => {
                let connection = Connection {
                    base,
                    token: token.clone(),
                    name: resource.name.clone(),
                };
                let (connection, result) =
                    Self::probe(Arc::clone(&self.library), connection, self.probe_timeout).await;
                result.map(|sections| Resolved {
                    connection,
                    sections,
                })
            }
            Ok(base) => Err(Error::invalid_argument(format!("{base} is not secure"))),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                debug!("remembered address {cached} failed: {e}");
                if let Err(e) = self.store.remove(key) {
                    warn!("failed to forget address {cached}: {e}");
                }
                None
            }
        }
    }

    async fn probe(
        library: Arc<L>,
        connection: Connection,
        timeout: Duration,
    ) -> (Connection, Result<Vec<Section>>) {
        trace!("probing {}", connection.base);
        let result = tokio::time::timeout(timeout, library.libraries(&connection))
            .await
            .map_err(Error::from)
            .and_then(|result| result);
        (connection, result)
    }
}
