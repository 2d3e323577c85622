//! # Leadership
//!
//! Leadership is arbitrated outside the reconciler (see
//! [`crate::runtime::leader_election`]); the reconciler only asks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait Leadership: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Leadership flag shared between the elector and its readers
#[derive(Debug, Clone, Default)]
pub struct SharedLeadership {
    flag: Arc<AtomicBool>,
}

impl SharedLeadership {
    #[must_use]
    pub fn new(is_leader: bool) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(is_leader)),
        }
    }

    /// Record a leadership change, returning the previous value
    pub fn set(&self, is_leader: bool) -> bool {
        self.flag.swap(is_leader, Ordering::SeqCst)
    }
}

impl Leadership for SharedLeadership {
    fn is_leader(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
