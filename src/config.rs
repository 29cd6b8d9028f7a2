//! Session configuration.

use crate::error::{SessionError, SessionResult};

/// A security check applied while validating a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityCheck {
    /// Bind the session to the first-seen client address and reject
    /// requests presenting a different one.
    FixAddress,
    /// Record the first-seen user agent string. Mismatches are never
    /// rejected, the value is informational only.
    FixBrowser,
}

impl SecurityCheck {
    /// Parse a comma-separated security list such as
    /// `"fix_address,fix_browser"`.
    pub fn parse_list(list: &str) -> SessionResult<Vec<SecurityCheck>> {
        let mut checks = Vec::new();

        for token in list.split(',') {
            let token = token.trim();

            if token.is_empty() {
                continue;
            }

            match token {
                "fix_address" => checks.push(SecurityCheck::FixAddress),
                "fix_browser" => checks.push(SecurityCheck::FixBrowser),
                other => {
                    return Err(SessionError::Config(format!(
                        "Unknown security check: {other}"
                    )));
                }
            }
        }

        Ok(checks)
    }
}

/// Session configuration.
///
/// # Examples
///
/// ```
/// use tessera_session::SessionOptions;
///
/// let options = SessionOptions::new()
///     .with_name("my_session")
///     .with_expire(15)
///     .with_security("fix_address")
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Session name (cookie/store key label)
    pub name: Option<String>,
    /// Explicit session ID to resume
    pub id: Option<String>,
    /// Maximum age of an unused session in minutes; 0 means no expiry
    pub expire: u64,
    /// Enabled security checks
    pub security: Vec<SecurityCheck>,
    /// Force the session cookie to be SSL only
    pub force_ssl: bool,
    /// Domain to use when setting the session cookie
    pub cookie_domain: Option<String>,
    /// Path to use when setting the session cookie
    pub cookie_path: Option<String>,
    /// Namespace prefix, salting application namespaces to avoid
    /// collisions with other consumers of a shared store
    pub prefix: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: None,
            id: None,
            expire: 15,
            security: vec![SecurityCheck::FixBrowser],
            force_ssl: false,
            cookie_domain: None,
            cookie_path: None,
            prefix: "__".to_string(),
        }
    }
}

impl SessionOptions {
    /// Create the default option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the session ID to resume.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the session expiry in minutes. Zero disables the expiry
    /// check. The value is converted to seconds once at session
    /// construction; all internal timer math is in seconds.
    pub fn with_expire(mut self, minutes: u64) -> Self {
        self.expire = minutes;
        self
    }

    /// Set the security checks from a comma-separated list
    /// (`"fix_address,fix_browser"`).
    pub fn with_security(mut self, list: &str) -> SessionResult<Self> {
        self.security = SecurityCheck::parse_list(list)?;
        Ok(self)
    }

    /// Set the security checks directly.
    pub fn with_security_checks(mut self, checks: Vec<SecurityCheck>) -> Self {
        self.security = checks;
        self
    }

    /// Force the session cookie to be sent over SSL only.
    pub fn with_force_ssl(mut self, force_ssl: bool) -> Self {
        self.force_ssl = force_ssl;
        self
    }

    /// Set the cookie domain.
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set the cookie path.
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    /// Set the namespace prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Parameters for the cookie carrying the session identity.
///
/// This layer only computes the parameters; emitting the `Set-Cookie`
/// header belongs to the embedding HTTP front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieParams {
    /// Cookie name (the session name)
    pub name: String,
    /// Cookie value (the session ID)
    pub value: String,
    /// Cookie domain
    pub domain: Option<String>,
    /// Cookie path
    pub path: Option<String>,
    /// Secure flag; forced true when the session forces SSL
    pub secure: bool,
    /// HttpOnly flag; always true
    pub http_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_security_list() {
        let checks = SecurityCheck::parse_list("fix_address,fix_browser").unwrap();
        assert_eq!(
            checks,
            vec![SecurityCheck::FixAddress, SecurityCheck::FixBrowser]
        );
    }

    #[test]
    fn parse_security_list_trims_and_skips_empty() {
        let checks = SecurityCheck::parse_list(" fix_address , ").unwrap();
        assert_eq!(checks, vec![SecurityCheck::FixAddress]);
    }

    #[test]
    fn parse_security_list_rejects_unknown_token() {
        assert!(SecurityCheck::parse_list("fix_address,bogus").is_err());
    }

    #[test]
    fn default_options() {
        let options = SessionOptions::default();
        assert_eq!(options.expire, 15);
        assert_eq!(options.prefix, "__");
        assert_eq!(options.security, vec![SecurityCheck::FixBrowser]);
        assert!(!options.force_ssl);
    }
}
