use std::net::SocketAddr;

use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind; defaults to 0.0.0.0:12345 when absent
    pub listen_address: Option<SocketAddr>,
    /// Shared bearer token; when set, every endpoint except `/health`
    /// requires `Authorization: Bearer <token>`
    #[serde(default)]
    pub token: Option<SecretString>,
}
