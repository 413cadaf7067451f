/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! What happens to an actor after it stops or panics.
//!
//! Object actors consult their [`RestartPolicy`] when a business handler
//! panics; supervisors consult theirs when a message handler panics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Restart policy, in the Erlang/OTP sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Always rebuild the actor's state and keep going.
    ///
    /// Never applies during a shutdown initiated by the parent.
    #[default]
    Permanent,

    /// Never restart; a panic terminates the actor.
    Temporary,

    /// Restart only after abnormal termination.
    Transient,
}

/// Why an actor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Asked to stop.
    Normal,

    /// A handler panicked; carries the panic message when there is one.
    Panic(String),

    /// Every sender to the actor was dropped.
    InboxClosed,

    /// The parent is shutting down.
    ParentShutdown,
}

impl RestartPolicy {
    /// Whether an actor that stopped for `reason` should be restarted.
    #[must_use]
    pub const fn should_restart(&self, reason: &TerminationReason) -> bool {
        if matches!(reason, TerminationReason::ParentShutdown) {
            return false;
        }

        match self {
            Self::Permanent => true,
            Self::Temporary => false,
            Self::Transient => !matches!(reason, TerminationReason::Normal),
        }
    }
}

impl TerminationReason {
    /// Renders a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panic(message)
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent => write!(f, "permanent"),
            Self::Temporary => write!(f, "temporary"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal shutdown"),
            Self::Panic(msg) => write!(f, "panic: {msg}"),
            Self::InboxClosed => write!(f, "inbox closed"),
            Self::ParentShutdown => write!(f, "parent shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_shutdown_never_restarts() {
        for policy in [RestartPolicy::Permanent, RestartPolicy::Temporary, RestartPolicy::Transient] {
            assert!(!policy.should_restart(&TerminationReason::ParentShutdown));
        }
    }

    #[test]
    fn panics_restart_unless_temporary() {
        let panic = TerminationReason::Panic("boom".to_string());
        assert!(RestartPolicy::Permanent.should_restart(&panic));
        assert!(RestartPolicy::Transient.should_restart(&panic));
        assert!(!RestartPolicy::Temporary.should_restart(&panic));
    }

    #[test]
    fn transient_ignores_normal_stop() {
        assert!(!RestartPolicy::Transient.should_restart(&TerminationReason::Normal));
        assert!(RestartPolicy::Transient.should_restart(&TerminationReason::InboxClosed));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let owned: Box<dyn std::any::Any + Send> = Box::new("lost".to_string());
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("gone");
        let opaque: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(TerminationReason::from_panic(owned.as_ref()), TerminationReason::Panic("lost".into()));
        assert_eq!(TerminationReason::from_panic(borrowed.as_ref()), TerminationReason::Panic("gone".into()));
        assert_eq!(
            TerminationReason::from_panic(opaque.as_ref()),
            TerminationReason::Panic("unknown panic payload".into())
        );
    }
}
