//! Pure reconnect decision logic shared by the connection owners.
//!
//! Sockets classify close codes on their own to know whether they are
//! allowed to re-establish the transport; the functions here decide what
//! the *session* owner does with the new transport: reattach, start over
//! or give up.

use heliograph_types::{CloseCode, ClosePolicy, VoiceCloseCode};
use std::time::Duration;

/// Which side initiated a socket closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    /// The client closed the socket on purpose.
    Local,

    /// The gateway (or the transport underneath it) closed the socket.
    Remote,
}

/// One socket closure.
///
/// Produced once per closed connection and consumed exactly once by
/// [`decide`] or [`decide_voice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: Option<u16>,
    pub reason: String,
    pub initiator: Initiator,
}

impl CloseEvent {
    #[must_use]
    pub fn new(code: Option<u16>, reason: impl Into<String>, initiator: Initiator) -> Self {
        Self {
            code,
            reason: reason.into(),
            initiator,
        }
    }

    /// A deliberate local shutdown with a code the gateway treats as
    /// final. Everything else is eligible for reconnection.
    #[must_use]
    const fn is_clean_local(&self) -> bool {
        matches!(self.initiator, Initiator::Local) && matches!(self.code, None | Some(1000 | 1001))
    }
}

/// What the owner of a closed gateway connection has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Reattach to the retained session with a resume handshake.
    Resume,

    /// Discard the session and run a fresh identify handshake.
    Reidentify,

    /// Give up and surface the closure to the caller; no retry follows.
    Fatal,
}

/// Decides what to do after a gateway closure.
///
/// Returns `None` when the closure was a deliberate local shutdown and no
/// reconnection must happen at all.
#[must_use]
pub fn decide(close: &CloseEvent, session_valid: bool) -> Option<Decision> {
    if close.is_clean_local() {
        return None;
    }

    let policy = close
        .code
        .and_then(|code| CloseCode::try_from(code).ok())
        .map(CloseCode::policy);

    Some(match policy {
        Some(ClosePolicy::Fatal) => Decision::Fatal,
        Some(ClosePolicy::Reidentify) => Decision::Reidentify,
        // Unknown and abnormal closures behave like generic ones: resume
        // when there is still a session to resume.
        Some(ClosePolicy::Resume) | None => {
            if session_valid {
                Decision::Resume
            } else {
                Decision::Reidentify
            }
        }
    })
}

/// Decides what to do after a voice gateway closure.
///
/// A [`Decision::Reidentify`] here means the voice session itself is gone:
/// the connection tears down and its owner decides whether to establish a
/// fresh one with new credentials.
#[must_use]
pub fn decide_voice(close: &CloseEvent) -> Option<Decision> {
    if close.is_clean_local() {
        return None;
    }

    let policy = close
        .code
        .and_then(|code| VoiceCloseCode::try_from(code).ok())
        .map(VoiceCloseCode::policy);

    Some(match policy {
        Some(ClosePolicy::Fatal) => Decision::Fatal,
        Some(ClosePolicy::Reidentify) => Decision::Reidentify,
        Some(ClosePolicy::Resume) | None => Decision::Resume,
    })
}

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(64);

// Fraction of the exponential delay that may be added as jitter.
const JITTER: f64 = 0.25;

/// Delay to wait before the given reconnect attempt.
///
/// Doubles per attempt from one second up to [`MAX_DELAY`], with up to 25%
/// additive jitter so that simultaneously dropped connections spread their
/// retries. Attempt counters reset once a connection round succeeds, which
/// brings the next failure back to the base delay.
#[must_use]
pub fn backoff(attempt: u32) -> Duration {
    let capped = BASE_DELAY.saturating_mul(1 << attempt.min(6)).min(MAX_DELAY);
    capped + capped.mul_f64(fastrand::f64() * JITTER)
}

#[cfg(test)]
mod tests {
    use super::{BASE_DELAY, CloseEvent, Decision, Initiator, JITTER, MAX_DELAY, backoff, decide, decide_voice};

    fn remote(code: u16) -> CloseEvent {
        CloseEvent::new(Some(code), "test", Initiator::Remote)
    }

    #[test]
    fn clean_local_closures_never_reconnect() {
        let close = CloseEvent::new(Some(1000), "done", Initiator::Local);
        assert_eq!(decide(&close, true), None);
        assert_eq!(decide_voice(&close), None);

        let close = CloseEvent::new(None, "", Initiator::Local);
        assert_eq!(decide(&close, true), None);
    }

    #[test]
    fn remote_normal_closure_still_reconnects() {
        assert_eq!(decide(&remote(1000), true), Some(Decision::Resume));
        assert_eq!(decide(&remote(1000), false), Some(Decision::Reidentify));
    }

    #[test]
    fn authentication_failures_are_fatal() {
        assert_eq!(decide(&remote(4004), true), Some(Decision::Fatal));
        assert_eq!(decide(&remote(4014), true), Some(Decision::Fatal));
        assert_eq!(decide_voice(&remote(4004)), Some(Decision::Fatal));
        assert_eq!(decide_voice(&remote(4011)), Some(Decision::Fatal));
    }

    #[test]
    fn invalidated_sessions_reidentify() {
        assert_eq!(decide(&remote(4007), true), Some(Decision::Reidentify));
        assert_eq!(decide(&remote(4008), true), Some(Decision::Reidentify));
        assert_eq!(decide(&remote(4009), true), Some(Decision::Reidentify));
    }

    #[test]
    fn generic_closures_resume_only_with_a_session() {
        assert_eq!(decide(&remote(4000), true), Some(Decision::Resume));
        assert_eq!(decide(&remote(4000), false), Some(Decision::Reidentify));

        // Abnormal closure without a close code.
        let abnormal = CloseEvent::new(None, "", Initiator::Remote);
        assert_eq!(decide(&abnormal, true), Some(Decision::Resume));
        assert_eq!(decide(&abnormal, false), Some(Decision::Reidentify));
    }

    #[test]
    fn voice_closures_follow_their_own_table() {
        assert_eq!(decide_voice(&remote(4015)), Some(Decision::Resume));
        assert_eq!(decide_voice(&remote(4016)), Some(Decision::Resume));
        assert_eq!(decide_voice(&remote(4014)), Some(Decision::Reidentify));
        assert_eq!(decide_voice(&remote(4006)), Some(Decision::Reidentify));
    }

    #[test]
    fn backoff_grows_to_a_cap() {
        let mut previous = std::time::Duration::ZERO;
        for attempt in 0..12 {
            let capped = BASE_DELAY.saturating_mul(1 << attempt.min(6)).min(MAX_DELAY);
            let delay = backoff(attempt);

            assert!(delay >= capped);
            assert!(delay <= capped + capped.mul_f64(JITTER));
            assert!(capped >= previous);
            previous = capped;
        }

        assert!(backoff(30) <= MAX_DELAY + MAX_DELAY.mul_f64(JITTER));
    }
}
