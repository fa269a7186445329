// Provisional uid allocation for entities not yet committed to the graph

use crate::models::Uid;
use crate::{ModellingError, Result};

/// Highest uid treated as provisional
pub const PROVISIONAL_UID_MAX: Uid = 99;

/// Issues short-lived uids for entities that exist only in an editing session
///
/// One allocator belongs to one `WorkflowSession`; every instance of the
/// session draws from it, so placeholders never collide inside a session.
/// Only reset between independent sessions.
#[derive(Debug, Clone, Default)]
pub struct TempIdAllocator {
    counter: Uid,
}

impl TempIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next provisional uid; the first call after construction or reset yields 1
    ///
    /// Fails once the range is used up. A uid past `PROVISIONAL_UID_MAX` would
    /// be indistinguishable from a committed graph uid.
    pub fn next(&mut self) -> Result<Uid> {
        if self.counter >= PROVISIONAL_UID_MAX {
            tracing::warn!(issued = self.counter, "provisional uid range exhausted");
            return Err(ModellingError::ProvisionalUidsExhausted {
                max: PROVISIONAL_UID_MAX,
            });
        }
        self.counter += 1;
        Ok(self.counter)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Last uid handed out (0 if none)
    pub fn current(&self) -> Uid {
        self.counter
    }

    /// Whether `uid` lies in the reserved provisional range `0..=99`
    pub fn is_provisional(uid: Uid) -> bool {
        uid <= PROVISIONAL_UID_MAX
    }
}
