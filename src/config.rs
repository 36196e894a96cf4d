//! Client configuration.
//!
//! Holds the identity this client presents to Plex (product, version,
//! client identifier, platform) and tunables for connection resolution.
//! Every request to plex.tv or a media server carries these values as
//! `X-Plex-*` headers, see [`http::Client`](crate::http::Client).

use std::time::Duration;

use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Sent as `X-Plex-Product`.
    pub app_name: String,
    /// Sent as `X-Plex-Version`.
    pub app_version: String,

    /// Name shown for this player in the Plex account's device list.
    pub device_name: String,

    /// Sent as `X-Plex-Client-Identifier`. Plex ties the issued access token
    /// to this value, so it must be stable across runs.
    pub client_id: Uuid,

    pub os_name: String,
    pub os_version: String,

    pub user_agent: String,

    /// Upper bound for a single reachability probe during connection
    /// resolution.
    pub probe_timeout: Duration,
}

impl Config {
    /// Default upper bound for a reachability probe.
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration from the build environment and the host.
    #[must_use]
    pub fn new() -> Self {
        let name = env!("CARGO_PKG_NAME");
        let version = env!("CARGO_PKG_VERSION");

        let os_name = if cfg!(target_os = "macos") {
            String::from("macOS")
        } else {
            std::env::consts::OS.to_owned()
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_owned());
        let user_agent = format!("{name}/{version} ({os_name} {os_version})");
        debug!("identifying as {user_agent}");

        Self {
            app_name: name.to_owned(),
            app_version: version.to_owned(),
            device_name: name.to_owned(),
            client_id: client_id(),
            os_name,
            os_version,
            user_agent,
            probe_timeout: Self::PROBE_TIMEOUT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the client identifier from the machine id, so that the same host
/// keeps its identity. Without a machine id the identifier is random, and
/// the user will have to pair again next run.
fn client_id() -> Uuid {
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"plex.tv");
    match machine_uid::get() {
        Ok(machine_id) => Uuid::new_v5(&namespace, machine_id.as_bytes()),
        Err(e) => {
            warn!("no machine id, pairing will not survive a restart: {e}");
            Uuid::new_v4()
        }
    }
}
