//! Magic links: one-click onboarding URLs carrying a key and a display name.

use crate::{Error, Result};
use reqwest::Url;

/// What the client was launched with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    /// Key to install; replaces any stored key.
    pub token: Option<String>,
    /// Display identity to install.
    pub user: Option<String>,
    /// Car to start parking immediately.
    pub car: Option<String>,
}

impl LaunchContext {
    /// Read the `key`, `user` and `car` parameters from a link.
    pub fn from_link(link: &str) -> Result<Self> {
        let url = Url::parse(link).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let mut ctx = Self::default();
        for (name, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                "key" => ctx.token = Some(value.into_owned()),
                "user" => ctx.user = Some(value.into_owned()),
                "car" => ctx.car = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(ctx)
    }
}

/// Build the onboarding link for a user: `<app url>/?key=..&user=..`.
///
/// `app_url` is where the client is served, including any base path.
pub fn magic_link(app_url: &str, key: &str, user: &str) -> Result<Url> {
    let mut url = Url::parse(app_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("key", key)
        .append_pair("user", user);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_link_under_base_path() {
        let url = magic_link("https://park.example/family", "abc123", "Grand Ma").unwrap();
        assert_eq!(
            url.as_str(),
            "https://park.example/family/?key=abc123&user=Grand+Ma"
        );
    }

    #[test]
    fn link_round_trips_into_launch_context() {
        let url = magic_link("http://localhost:3000", "k&1", "Dad").unwrap();
        let ctx = LaunchContext::from_link(url.as_str()).unwrap();
        assert_eq!(ctx.token.as_deref(), Some("k&1"));
        assert_eq!(ctx.user.as_deref(), Some("Dad"));
        assert_eq!(ctx.car, None);
    }

    #[test]
    fn empty_parameters_are_ignored() {
        let ctx = LaunchContext::from_link("http://h/?key=&user=Mum&car=c1").unwrap();
        assert_eq!(ctx.token, None);
        assert_eq!(ctx.user.as_deref(), Some("Mum"));
        assert_eq!(ctx.car.as_deref(), Some("c1"));
    }

    #[test]
    fn invalid_link_is_an_error() {
        assert!(matches!(
            LaunchContext::from_link("::nope"),
            Err(Error::InvalidUrl(_))
        ));
    }
}
