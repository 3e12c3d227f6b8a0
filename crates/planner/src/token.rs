//! Cluster join token management

use crate::error::TokenError;
use crate::layout::RuntimeLayout;
use crate::runtime::Runtime;
use node_config::Config;
use rand::Rng;
use rand::rngs::OsRng;
use serde_yaml::Value;
use std::io::ErrorKind;
use tracing::info;

/// Length of generated tokens.
pub const TOKEN_LENGTH: usize = 54;

const TOKEN_CHARSET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Ensures a config carries a join token.
///
/// A token written by an earlier attempt is recovered from the runtime
/// config file so that a retried cluster-init keeps its first secret.
#[derive(Debug, Clone, Default)]
pub struct TokenManager {
    layout: RuntimeLayout,
}

impl TokenManager {
    /// Looks for persisted tokens under `layout`.
    pub fn new(layout: RuntimeLayout) -> Self {
        Self { layout }
    }

    /// Sets `cfg.token` if it is empty, reusing a persisted token when present.
    pub fn ensure_token(&self, cfg: &mut Config, runtime: Runtime) -> Result<(), TokenError> {
        if !cfg.token.is_empty() {
            return Ok(());
        }

        cfg.token = match self.existing_token(runtime)? {
            Some(token) => {
                info!("Reusing token from existing {} config", runtime);
                token
            }
            None => generate_token(),
        };
        Ok(())
    }

    /// Token stored in the runtime config file, if any.
    pub fn existing_token(&self, runtime: Runtime) -> Result<Option<String>, TokenError> {
        let path = self.layout.runtime_config_path(runtime);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(TokenError::Read { path, source }),
        };

        let value: Value =
            serde_yaml::from_slice(&data).map_err(|source| TokenError::Parse { path, source })?;
        let token = match value.get("token") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Ok(Some(token).filter(|t| !t.is_empty()))
    }
}

/// Random token drawn from the OS random source.
pub fn generate_token() -> String {
    let mut rng = OsRng;
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}
