use std::fmt;

/// Opaque caller identifier used as the rate limiting key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Combine the network origin with a truncated client agent.
    ///
    /// `origin` may be a forwarded-for list; the first (client) entry is used.
    pub fn from_request_parts(
        origin: Option<&str>,
        user_agent: Option<&str>,
        max_agent_len: usize,
    ) -> Self {
        let origin = origin
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("unknown");
        let agent: String = user_agent
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("unknown")
            .chars()
            .take(max_agent_len)
            .collect();

        Self(format!("{}-{}", origin, agent))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
