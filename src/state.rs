use crate::avatar::AvatarProvider;
use crate::hub::Hub;

/// Shared application state handed to every axum handler.
pub struct AppState {
    pub hub: Hub,
    pub avatar: AvatarProvider,
}

impl AppState {
    pub fn new(hub: Hub, avatar: AvatarProvider) -> Self {
        Self { hub, avatar }
    }
}
