//! Start-up wiring shared by the CLI and the desktop: config, session store, and API client.

use crate::api::{ApiClient, Backend};
use crate::config::{self, Config};
use crate::controller::ChatController;
use crate::personas::AvatarResolver;
use crate::session::SessionStore;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct ClientContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub session: SessionStore,
    pub client: ApiClient,
}

impl ClientContext {
    /// Load config and open the persisted session. Honors `session.clearOnStartup`.
    pub fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let (config, config_path) = config::load_config(config_path)?;
        let session_path = config::resolve_session_path(&config, &config_path);
        let session = SessionStore::open(&session_path);
        if config.session.clear_on_startup && session.is_signed_in() {
            log::info!("clearing stored session on startup");
            session.clear()?;
        }
        let client = ApiClient::from_config(&config, session.clone());
        log::debug!(
            "using backend {} (session file {})",
            client.base_url(),
            session_path.display()
        );
        Ok(Self {
            config,
            config_path,
            session,
            client,
        })
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::new(self.client.clone())
    }

    /// Chat controller over this context's client and session.
    pub fn controller(&self) -> ChatController {
        ChatController::new(self.backend(), self.session.clone())
            .with_seed_message(config::resolve_seed_message(&self.config))
    }

    pub fn avatars(&self) -> AvatarResolver {
        AvatarResolver::new(config::resolve_avatar_dir(&self.config, &self.config_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn clear_on_startup_forgets_session() {
        let dir = std::env::temp_dir().join(format!("twin-context-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config.json");
        std::fs::write(&config_path, "{}").unwrap();

        let ctx = ClientContext::open(Some(config_path.clone())).unwrap();
        ctx.session
            .set(Session {
                token: "t".to_string(),
                user_id: 1,
                username: "ana".to_string(),
            })
            .unwrap();
        assert!(ClientContext::open(Some(config_path.clone())).unwrap().session.is_signed_in());

        std::fs::write(&config_path, r#"{"session":{"clearOnStartup":true}}"#).unwrap();
        let ctx = ClientContext::open(Some(config_path)).unwrap();
        assert!(!ctx.session.is_signed_in());
        assert!(!dir.join("session.json").exists());
        assert_eq!(ctx.avatars().dir(), dir.join("avatars"));
    }
}
