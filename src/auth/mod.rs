//! Remote badge authorization
//!
//! Authorization decisions are delegated entirely to a remote authority.
//! Three actions are sent over the lifetime of a session:
//!
//! - `initial`: gates powering the machine, awaited by the orchestrator
//! - `extend`: periodic informational renewal while the session is open
//! - `return`: informational end of session, used for usage accounting

mod client;
mod template;

pub use client::HttpAuthorizer;
pub use template::UrlTemplate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Authorization action sent to the remote authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthAction {
    /// Open a session
    Initial,
    /// Renew an open session
    Extend,
    /// Close a session
    Return,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Extend => "extend",
            Self::Return => "return",
        }
    }
}

impl std::fmt::Display for AuthAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote authorization seam
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Ask the remote authority about `badge_id`; `Ok` means granted
    async fn authorize(&self, badge_id: &str, action: AuthAction) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings() {
        assert_eq!(AuthAction::Initial.as_str(), "initial");
        assert_eq!(AuthAction::Extend.to_string(), "extend");
        assert_eq!(
            serde_json::to_string(&AuthAction::Return).unwrap(),
            "\"return\""
        );
    }
}
