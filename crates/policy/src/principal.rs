/// Display name of the root principal.
pub const ROOT_NAME: &str = "Root Admin";

/// Name used when a principal carries no display name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Who an authorized request is acting as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// The implicit operator identity derived from the admin secret.
    Root,
    /// A stored user.
    User { name: String },
}

impl Principal {
    pub fn is_root(&self) -> bool {
        matches!(self, Principal::Root)
    }

    /// Name attributed to actions taken by this principal.
    pub fn display_name(&self) -> &str {
        match self {
            Principal::Root => ROOT_NAME,
            Principal::User { name } if name.is_empty() => UNKNOWN_NAME,
            Principal::User { name } => name,
        }
    }
}
