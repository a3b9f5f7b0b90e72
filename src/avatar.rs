//! Avatar URL resolution: a pure lookup over a participant's profile data.

use md5::{Digest, Md5};
use thiserror::Error;

use crate::session::UserData;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AvatarError {
    /// The profile carries nothing this provider can turn into a URL.
    #[error("no avatar URL available")]
    NoAvatarUrl,
}

/// The closed set of avatar providers. Selected once at startup; see
/// [`crate::config::Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarProvider {
    /// Use the `avatar_url` the identity provider put in the profile.
    AuthProvided,
    /// Derive a Gravatar URL from the profile's email address.
    Gravatar,
}

impl AvatarProvider {
    pub fn resolve(&self, profile: &UserData) -> Result<String, AvatarError> {
        match self {
            Self::AuthProvided => profile
                .str_field("avatar_url")
                .map(str::to_owned)
                .ok_or(AvatarError::NoAvatarUrl),
            Self::Gravatar => {
                let email = profile
                    .str_field("email")
                    .ok_or(AvatarError::NoAvatarUrl)?;
                // Gravatar hashes the normalized address: trimmed, lower-cased.
                let digest = Md5::digest(email.trim().to_lowercase().as_bytes());
                Ok(format!("//www.gravatar.com/avatar/{}", hex::encode(digest)))
            }
        }
    }
}
