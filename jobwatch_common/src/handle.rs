//! The opaque, host-recoverable job handle.
//!
//! A handle is a path-like locator returned by the SSH dispatcher on
//! submission and later used to route `kill`/`status` calls back to the
//! host that owns the job. The format is `ssh://<host>/<local_id>`; only
//! [`JobHandle::parse`] and [`JobHandle`]'s `Display` impl need to agree
//! on the shape — callers never construct or inspect the interior
//! directly.

use std::fmt;

/// An opaque job handle with a recoverable host fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle {
    pub host: String,
    pub local_id: String,
}

impl JobHandle {
    pub fn new(host: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            local_id: local_id.into(),
        }
    }

    /// Parse a handle string produced by [`JobHandle::to_string`].
    ///
    /// Returns `None` if the string does not have the `ssh://host/id`
    /// shape — callers that need every input to appear in a result
    /// (status) default such handles to `Unknown`; callers building a
    /// `failed` list (kill) surface them there instead of dropping them.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("ssh://")?;
        let (host, local_id) = rest.split_once('/')?;
        if host.is_empty() || local_id.is_empty() {
            return None;
        }
        Some(Self::new(host, local_id))
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ssh://{}/{}", self.host, self.local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let handle = JobHandle::new("host-a", "12345");
        let text = handle.to_string();
        assert_eq!(text, "ssh://host-a/12345");
        assert_eq!(JobHandle::parse(&text), Some(handle));
    }

    #[test]
    fn rejects_strings_without_the_scheme() {
        assert_eq!(JobHandle::parse("host-a/12345"), None);
    }

    #[test]
    fn rejects_strings_without_a_local_id() {
        assert_eq!(JobHandle::parse("ssh://host-a/"), None);
        assert_eq!(JobHandle::parse("ssh://host-a"), None);
    }

    proptest::proptest! {
        #[test]
        fn any_host_and_id_without_slashes_round_trips(
            host in "[a-zA-Z0-9_.-]{1,30}",
            local_id in "[a-zA-Z0-9_.-]{1,30}",
        ) {
            let handle = JobHandle::new(host, local_id);
            let text = handle.to_string();
            prop_assert_eq!(JobHandle::parse(&text), Some(handle));
        }
    }
}
