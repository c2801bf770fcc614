//! Authorization decisions.

use crate::{Error, Principal, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use storage::User;
use tracing::{info, warn};

/// Admin secret used when none is configured. Refused unless explicitly allowed.
pub const DEFAULT_ADMIN_SECRET: &str = "admin123";

/// Derive the root token from an admin secret.
///
/// The encoding is reversible (standard base64); the token only obscures the
/// secret, it does not protect it.
pub fn root_token(secret: &str) -> String {
    STANDARD.encode(secret.as_bytes())
}

/// The credential-bearing part of an incoming request.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Presented key, if any.
    pub key: Option<&'a str>,
    /// Network origin, for the audit log.
    pub origin: &'a str,
}

/// Result of an authorization check.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow(Principal),
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Validates presented keys against stored users and the root token.
#[derive(Debug, Clone)]
pub struct AuthGate {
    root_token: String,
}

impl AuthGate {
    /// Build a gate from the configured admin secret.
    ///
    /// An unset or empty secret falls back to [`DEFAULT_ADMIN_SECRET`], which
    /// is only accepted when `allow_insecure_default` is set.
    pub fn new(secret: Option<&str>, allow_insecure_default: bool) -> Result<Self> {
        let secret = secret.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_ADMIN_SECRET);
        if secret == DEFAULT_ADMIN_SECRET {
            if !allow_insecure_default {
                return Err(Error::InsecureSecret);
            }
            warn!("using the insecure default admin secret");
        }
        Ok(Self {
            root_token: root_token(secret),
        })
    }

    /// Whether `key` is the root token.
    pub fn is_root_token(&self, key: &str) -> bool {
        self.root_token == key
    }

    /// Decide whether `request` may proceed, given the stored users.
    pub fn check(&self, users: &[User], request: &AccessRequest<'_>) -> Decision {
        let Some(key) = request.key.filter(|k| !k.is_empty()) else {
            return Decision::Deny {
                reason: "missing key".into(),
            };
        };

        if let Some(user) = users.iter().find(|u| u.key == key) {
            return Decision::Allow(Principal::User {
                name: user.name.clone(),
            });
        }
        if self.is_root_token(key) {
            return Decision::Allow(Principal::Root);
        }

        Decision::Deny {
            reason: "unknown key".into(),
        }
    }

    /// Check `request` and write the audit record, returning the principal on success.
    pub fn authorize(&self, users: &[User], request: &AccessRequest<'_>) -> Result<Principal> {
        let key = request.key.unwrap_or("none");
        match self.check(users, request) {
            Decision::Allow(principal) => {
                info!(
                    target: "audit",
                    origin = request.origin,
                    key,
                    principal = principal.display_name(),
                    "authorized request"
                );
                Ok(principal)
            }
            Decision::Deny { reason } => {
                warn!(
                    target: "audit",
                    origin = request.origin,
                    key,
                    %reason,
                    "blocked unauthorized request"
                );
                Err(Error::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthGate {
        AuthGate::new(Some("hunter2"), false).unwrap()
    }

    fn request(key: Option<&str>) -> AccessRequest<'_> {
        AccessRequest {
            key,
            origin: "127.0.0.1",
        }
    }

    #[test]
    fn root_token_is_base64_of_secret() {
        assert_eq!(root_token("admin123"), "YWRtaW4xMjM=");
    }

    #[test]
    fn root_token_always_authorizes() {
        let gate = gate();
        let token = root_token("hunter2");
        let principal = gate.authorize(&[], &request(Some(&token))).unwrap();
        assert!(principal.is_root());
        assert_eq!(principal.display_name(), "Root Admin");
    }

    #[test]
    fn root_is_distinct_from_stored_users() {
        let gate = gate();
        let users = vec![User::new("Dad", "k-dad")];

        let dad = gate.authorize(&users, &request(Some("k-dad"))).unwrap();
        assert_eq!(dad, Principal::User { name: "Dad".into() });

        let token = root_token("hunter2");
        assert!(gate.authorize(&users, &request(Some(&token))).unwrap().is_root());
    }

    #[test]
    fn missing_or_unknown_key_is_unauthorized() {
        let gate = gate();
        let users = vec![User::new("Dad", "k-dad")];

        for key in [None, Some(""), Some("k-mum"), Some("aHVudGVyMw==")] {
            let err = gate.authorize(&users, &request(key)).unwrap_err();
            assert!(matches!(err, Error::Unauthorized), "key {key:?}");
        }
    }

    #[test]
    fn insecure_default_needs_opt_in() {
        assert!(matches!(
            AuthGate::new(None, false),
            Err(Error::InsecureSecret)
        ));
        assert!(matches!(
            AuthGate::new(Some("admin123"), false),
            Err(Error::InsecureSecret)
        ));

        let gate = AuthGate::new(Some(""), true).unwrap();
        assert!(gate.is_root_token("YWRtaW4xMjM="));
    }

    #[test]
    fn empty_user_name_displays_as_unknown() {
        let principal = Principal::User { name: String::new() };
        assert_eq!(principal.display_name(), "Unknown");
    }
}
