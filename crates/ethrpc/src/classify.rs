//! Pure classification of RPC call failures.
//!
//! The pool decides whether to trip an endpoint's circuit breaker based on
//! the rendered error alone. Patterns are injectable so deployments can
//! extend them without code changes.

use regex::Regex;

/// How a failed call should be treated by the endpoint circuit breaker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    /// The endpoint is likely to recover; trip the breaker and retry
    /// elsewhere. Rate-limited failures use a longer cooldown.
    Transient { rate_limited: bool },
    /// A real error (bad request, revert, decode failure). Propagates to the
    /// caller without touching breaker state.
    NonTransient,
}

impl Classification {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

pub struct Classifier {
    transient: Regex,
    rate_limited: Regex,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_PATTERN, DEFAULT_RATE_LIMIT_PATTERN)
            .expect("default patterns are valid")
    }
}

/// Error codes surfaced by common JSON-RPC client stacks plus the message
/// fragments typical of connection-level failures.
const DEFAULT_TRANSIENT_PATTERN: &str = "(?i)SERVER_ERROR|NETWORK_ERROR|OFFLINE|TIMEOUT|\
     FETCH_ERROR|BAD_DATA|timeout|network|ECONN|EAI_AGAIN|ENOTFOUND|temporarily unavailable";

const DEFAULT_RATE_LIMIT_PATTERN: &str = "(?i)\\b429\\b|rate limit";

impl Classifier {
    pub fn new(transient: &str, rate_limited: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            transient: Regex::new(transient)?,
            rate_limited: Regex::new(rate_limited)?,
        })
    }

    /// Classifies a rendered call error. Rate-limited errors are always also
    /// transient.
    pub fn classify(&self, message: &str) -> Classification {
        if self.rate_limited.is_match(message) {
            return Classification::Transient { rate_limited: true };
        }
        if self.transient.is_match(message) {
            return Classification::Transient {
                rate_limited: false,
            };
        }
        Classification::NonTransient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_error_codes() {
        let classifier = Classifier::default();
        for message in [
            "SERVER_ERROR: missing response",
            "NETWORK_ERROR while fetching",
            "client is OFFLINE",
            "TIMEOUT exceeded",
            "FETCH_ERROR: socket closed",
            "BAD_DATA in response envelope",
        ] {
            assert_eq!(
                classifier.classify(message),
                Classification::Transient {
                    rate_limited: false
                },
                "{message}",
            );
        }
    }

    #[test]
    fn transient_message_fragments() {
        let classifier = Classifier::default();
        for message in [
            "request timeout after 1200ms",
            "network is unreachable",
            "connect ECONNREFUSED 127.0.0.1:8545",
            "getaddrinfo EAI_AGAIN rpc.example",
            "getaddrinfo ENOTFOUND rpc.example",
            "service temporarily unavailable",
        ] {
            assert!(classifier.classify(message).is_transient(), "{message}");
        }
    }

    #[test]
    fn rate_limited_is_transient() {
        let classifier = Classifier::default();
        for message in ["HTTP status 429", "rate limit exceeded, slow down"] {
            assert_eq!(
                classifier.classify(message),
                Classification::Transient { rate_limited: true },
                "{message}",
            );
        }
    }

    #[test]
    fn everything_else_is_fatal() {
        let classifier = Classifier::default();
        for message in [
            "execution reverted",
            "invalid argument 0: hex string without 0x prefix",
            "abi decoding failed",
        ] {
            assert_eq!(classifier.classify(message), Classification::NonTransient);
        }
    }

    #[test]
    fn custom_patterns() {
        let classifier = Classifier::new("(?i)flaky", "(?i)too many requests").unwrap();
        assert!(classifier.classify("upstream flaky again").is_transient());
        assert_eq!(
            classifier.classify("too many requests"),
            Classification::Transient { rate_limited: true },
        );
        assert_eq!(classifier.classify("timeout"), Classification::NonTransient);
    }
}
