//! Local biometric confirmation gate.
//!
//! The platform prompt runs entirely on-device; no biometric template
//! or sample ever reaches the network. The gate's only job is to
//! produce a yes/no/unavailable answer immediately before a device
//! login attempt — a `Confirmed` outcome is a precondition for sending
//! the device secret, never a credential itself.

use async_trait::async_trait;

/// Result of one biometric prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricOutcome {
    /// The user passed the platform prompt.
    Confirmed,
    /// The user dismissed or failed the prompt.
    Cancelled,
    /// No usable biometric hardware, or nothing enrolled.
    Unavailable,
}

/// Platform biometric prompt.
///
/// Implementations must check hardware presence and enrollment before
/// prompting and report `Unavailable` when either is missing, so
/// callers can fall back to password login instead of showing a prompt
/// that cannot succeed.
#[async_trait]
pub trait BiometricGate: Send + Sync {
    async fn authenticate(&self) -> BiometricOutcome;
}

/// Gate for platforms without biometric hardware.
pub struct NoBiometrics;

#[async_trait]
impl BiometricGate for NoBiometrics {
    async fn authenticate(&self) -> BiometricOutcome {
        BiometricOutcome::Unavailable
    }
}

/// Scripted gate for tests: returns the queued outcomes in order and
/// counts invocations.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct ScriptedGate {
        outcomes: Mutex<Vec<BiometricOutcome>>,
        pub(crate) prompts: AtomicUsize,
    }

    impl ScriptedGate {
        pub(crate) fn new(outcomes: Vec<BiometricOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                prompts: AtomicUsize::new(0),
            }
        }

        pub(crate) fn prompt_count(&self) -> usize {
            self.prompts.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl BiometricGate for ScriptedGate {
        async fn authenticate(&self) -> BiometricOutcome {
            self.prompts.fetch_add(1, Ordering::Relaxed);
            let mut outcomes = self.outcomes.lock();
            if outcomes.is_empty() {
                BiometricOutcome::Cancelled
            } else {
                outcomes.remove(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_biometrics_is_always_unavailable() {
        let gate = NoBiometrics;
        assert_eq!(gate.authenticate().await, BiometricOutcome::Unavailable);
        assert_eq!(gate.authenticate().await, BiometricOutcome::Unavailable);
    }

    #[tokio::test]
    async fn scripted_gate_replays_in_order() {
        let gate = testing::ScriptedGate::new(vec![
            BiometricOutcome::Cancelled,
            BiometricOutcome::Confirmed,
        ]);
        assert_eq!(gate.authenticate().await, BiometricOutcome::Cancelled);
        assert_eq!(gate.authenticate().await, BiometricOutcome::Confirmed);
        assert_eq!(gate.prompt_count(), 2);
    }
}
