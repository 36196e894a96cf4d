//! plex.tv account service types.
//!
//! # Wire Format
//!
//! PIN, as returned by `POST /api/v2/pins` and `GET /api/v2/pins/{id}`:
//! ```json
//! {
//!     "id": 1234567890,
//!     "code": "ABCD",
//!     "expiresIn": 900,
//!     "authToken": null
//! }
//! ```
//!
//! Resource, as returned by `GET /api/v2/resources`:
//! ```json
//! {
//!     "name": "Living Room",
//!     "product": "Plex Media Server",
//!     "clientIdentifier": "7d8f...",
//!     "provides": "server",
//!     "accessToken": "secret",
//!     "owned": true,
//!     "connections": [
//!         {
//!             "protocol": "https",
//!             "address": "192.168.1.2",
//!             "port": 32400,
//!             "uri": "https://192-168-1-2.7d8f.plex.direct:32400",
//!             "local": true,
//!             "relay": false,
//!             "IPv6": false
//!         }
//!     ]
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;
use veil::Redact;

use crate::token::AuthToken;

/// A device-pairing PIN.
///
/// The user enters `code` at <https://plex.tv/link>; once they do, polling
/// the PIN yields an `auth_token`.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Redact)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub id: u64,

    pub code: String,

    /// Time left before the code stops being accepted.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub expires_in: Duration,

    #[redact]
    #[serde(default)]
    pub auth_token: Option<AuthToken>,
}

/// A device registered to the account, as listed by the directory service.
#[derive(Clone, PartialEq, Deserialize, Redact)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,

    #[serde(default)]
    pub product: String,

    /// Stable identifier of the server, used to key cached addresses.
    pub client_identifier: String,

    /// Comma-separated capabilities, e.g. `server,player`.
    #[serde(default)]
    pub provides: String,

    /// Token for talking to this server. Absent for some shared devices.
    #[redact]
    #[serde(default)]
    pub access_token: Option<AuthToken>,

    #[serde(default)]
    pub owned: bool,

    #[serde(default)]
    pub presence: bool,

    #[serde(default)]
    pub connections: Vec<Candidate>,
}

impl Resource {
    /// Whether this resource is a media server.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.provides.split(',').any(|capability| capability.trim() == "server")
    }
}

/// One network path through which a server might be reachable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Candidate {
    /// Transport scheme, `http` or `https`.
    pub protocol: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub port: u16,

    pub uri: Url,

    /// On the same network as this client, as seen by plex.tv.
    #[serde(default)]
    pub local: bool,

    /// Through the Plex relay service.
    #[serde(default)]
    pub relay: bool,

    #[serde(default, rename = "IPv6")]
    pub ipv6: bool,
}

impl Candidate {
    /// Whether this candidate uses a transport-secure scheme.
    ///
    /// Both the advertised protocol and the actual URI scheme must agree.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("https") && self.uri.scheme() == "https"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOURCES: &str = r#"[
        {
            "name": "Living Room",
            "product": "Plex Media Server",
            "clientIdentifier": "abc123",
            "provides": "server",
            "accessToken": "secret-token",
            "owned": true,
            "connections": [
                {"protocol": "https", "address": "10.0.0.2", "port": 32400,
                 "uri": "https://10-0-0-2.abc123.plex.direct:32400", "local": true,
                 "relay": false, "IPv6": false},
                {"protocol": "http", "address": "10.0.0.2", "port": 32400,
                 "uri": "http://10.0.0.2:32400", "local": true, "relay": false, "IPv6": false}
            ]
        },
        {
            "name": "Phone",
            "clientIdentifier": "phone1",
            "provides": "client,player",
            "connections": []
        }
    ]"#;

    #[test]
    fn parses_resources() {
        let resources: Vec<Resource> = serde_json::from_str(RESOURCES).unwrap();
        assert_eq!(resources.len(), 2);

        let server = &resources[0];
        assert!(server.is_server());
        assert_eq!(server.client_identifier, "abc123");
        assert_eq!(server.connections.len(), 2);
        assert!(server.connections[0].is_secure());
        assert!(!server.connections[1].is_secure());

        assert!(!resources[1].is_server());
        assert!(resources[1].access_token.is_none());
    }

    #[test]
    fn parses_unclaimed_and_claimed_pins() {
        let pin: Pin =
            serde_json::from_str(r#"{"id":7,"code":"WXYZ","expiresIn":900,"authToken":null}"#)
                .unwrap();
        assert_eq!(pin.code, "WXYZ");
        assert_eq!(pin.expires_in, Duration::from_secs(900));
        assert!(pin.auth_token.is_none());

        let pin: Pin =
            serde_json::from_str(r#"{"id":7,"code":"WXYZ","expiresIn":12,"authToken":"tok"}"#)
                .unwrap();
        assert_eq!(pin.auth_token.unwrap().as_str(), "tok");
    }

    #[test]
    fn debug_output_hides_tokens() {
        let resources: Vec<Resource> = serde_json::from_str(RESOURCES).unwrap();
        let debug = format!("{:?}", resources[0]);
        assert!(!debug.contains("secret-token"));
    }
}
