//! Numeric end-reason codes attached to closed connections.
//!
//! Codes are grouped into ranges of one thousand so that the range alone
//! tells who ended the session:
//!
//! | Range       | Meaning                                   |
//! |-------------|-------------------------------------------|
//! | 0           | unspecified                               |
//! | 1000–1999   | application closed normally               |
//! | 2000–2999   | application closed on an exceptional path |
//! | 3000–3999   | problem detected on the local side        |
//! | 4000–4999   | problem reported by / caused by the remote|
//! | 5000–5999   | miscellaneous transport failures          |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndReason(pub u32);

impl EndReason {
    pub const INVALID: EndReason = EndReason(0);
    pub const APP_GENERIC: EndReason = EndReason(1000);
    pub const APP_EXCEPTION_GENERIC: EndReason = EndReason(2000);
    pub const LOCAL_GENERIC: EndReason = EndReason(3000);
    pub const REMOTE_GENERIC: EndReason = EndReason(4000);
    pub const MISC_GENERIC: EndReason = EndReason(5000);
    pub const MISC_INTERNAL_ERROR: EndReason = EndReason(5001);

    /// Raw numeric code.
    pub fn code(self) -> u32 {
        self.0
    }

    /// `true` when the application ended the connection, normally or not.
    pub fn is_application(self) -> bool {
        (1000..3000).contains(&self.0)
    }

    pub fn is_local_problem(self) -> bool {
        (3000..4000).contains(&self.0)
    }

    pub fn is_remote_problem(self) -> bool {
        (4000..5000).contains(&self.0)
    }
}

impl Default for EndReason {
    fn default() -> Self {
        EndReason::INVALID
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_range_covers_normal_and_exceptional_codes() {
        assert!(EndReason::APP_GENERIC.is_application());
        assert!(EndReason::APP_EXCEPTION_GENERIC.is_application());
        assert!(!EndReason::LOCAL_GENERIC.is_application());
    }

    #[test]
    fn test_local_and_remote_ranges_do_not_overlap() {
        assert!(EndReason::LOCAL_GENERIC.is_local_problem());
        assert!(!EndReason::LOCAL_GENERIC.is_remote_problem());
        assert!(EndReason::REMOTE_GENERIC.is_remote_problem());
        assert!(!EndReason::REMOTE_GENERIC.is_local_problem());
    }

    #[test]
    fn test_default_is_invalid() {
        assert_eq!(EndReason::default(), EndReason::INVALID);
        assert_eq!(EndReason::default().code(), 0);
    }
}
