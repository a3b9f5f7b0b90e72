//! Environment-driven configuration. Bad values warn and fall back to
//! defaults rather than aborting startup.

use std::net::SocketAddr;

use crate::avatar::AvatarProvider;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address; `CHAT_ADDR`.
    pub addr: SocketAddr,
    /// Which avatar provider serves `/avatar`; `AVATAR_PROVIDER`.
    pub avatar: AvatarProvider,
}

impl Config {
    pub fn from_env() -> Self {
        let addr = match std::env::var("CHAT_ADDR") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("CHAT_ADDR {:?} is not a socket address, using {}", raw, DEFAULT_ADDR);
                default_addr()
            }),
            Err(_) => default_addr(),
        };

        let avatar = match std::env::var("AVATAR_PROVIDER").as_deref() {
            Ok("auth") => AvatarProvider::AuthProvided,
            Ok("gravatar") | Err(_) => AvatarProvider::Gravatar,
            Ok(other) => {
                tracing::warn!("unknown AVATAR_PROVIDER {:?}, using gravatar", other);
                AvatarProvider::Gravatar
            }
        };

        Self { addr, avatar }
    }
}

fn default_addr() -> SocketAddr {
    DEFAULT_ADDR.parse().expect("default address is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("CHAT_ADDR");
        std::env::remove_var("AVATAR_PROVIDER");
    }

    #[test]
    #[serial]
    fn defaults_when_env_is_empty() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.avatar, AvatarProvider::Gravatar);
    }

    #[test]
    #[serial]
    fn reads_addr_and_provider() {
        clear_env();
        std::env::set_var("CHAT_ADDR", "127.0.0.1:9000");
        std::env::set_var("AVATAR_PROVIDER", "auth");
        let config = Config::from_env();
        assert_eq!(config.addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.avatar, AvatarProvider::AuthProvided);
        clear_env();
    }

    #[test]
    #[serial]
    fn bad_values_fall_back() {
        clear_env();
        std::env::set_var("CHAT_ADDR", "not-an-address");
        std::env::set_var("AVATAR_PROVIDER", "carrier-pigeon");
        let config = Config::from_env();
        assert_eq!(config.addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.avatar, AvatarProvider::Gravatar);
        clear_env();
    }
}
