//! Client request facts consumed by session validation.

/// Facts about the requesting client, injected explicitly per
/// request instead of being read from ambient request state.
///
/// The forwarded-for value is recorded in the session for later
/// inspection but is never used as a security check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInput {
    /// Remote address of the client connection
    pub remote_addr: Option<String>,
    /// `X-Forwarded-For` header value, if any
    pub forwarded_for: Option<String>,
    /// `User-Agent` header value, if any
    pub user_agent: Option<String>,
}

impl ClientInput {
    /// Create an empty input; validation checks that depend on a
    /// missing fact are skipped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the remote address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Set the forwarded-for header value.
    pub fn with_forwarded_for(mut self, forwarded: impl Into<String>) -> Self {
        self.forwarded_for = Some(forwarded.into());
        self
    }

    /// Set the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
