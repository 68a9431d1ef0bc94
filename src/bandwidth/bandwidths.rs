//! Composite of bandwidths evaluated together.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::Bandwidth;
use crate::rate::Operator;

/// One bandwidth per configured rate, combined with an operator.
///
/// Every member is attempted on each request, in definition order, so state
/// is consumed even when the outcomes are mixed. Consumption is not rolled
/// back: if an `AND` composite is rejected because one member failed, the
/// members that granted keep their reduced capacity.
///
/// The composite is plain data: it clones and serializes, so an external
/// cache can hold copies and have updated state written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bandwidths {
    operator: Operator,
    members: Vec<Bandwidth>,
}

impl Bandwidths {
    pub fn new(operator: Operator, members: Vec<Bandwidth>) -> Self {
        Self { operator, members }
    }

    /// A composite that never limits.
    pub fn unlimited() -> Self {
        Self::new(Operator::None, Vec::new())
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn members(&self) -> &[Bandwidth] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Attempt every member and combine the outcomes.
    ///
    /// On success, returns the longest wait owed to any member that granted.
    pub fn try_reserve(&mut self, permits: u64, timeout: Duration, now_micros: u64) -> Option<Duration> {
        let mut failures = 0;
        let mut wait = Duration::ZERO;

        for (index, member) in self.members.iter_mut().enumerate() {
            match member.try_reserve(permits, timeout, now_micros) {
                Some(member_wait) => wait = wait.max(member_wait),
                None => {
                    trace!(member = index, kind = member.kind(), permits, "Bandwidth member rejected");
                    failures += 1;
                }
            }
        }

        if self.is_exceeded(failures) {
            None
        } else {
            Some(wait)
        }
    }

    pub fn try_acquire(&mut self, permits: u64, timeout: Duration, now_micros: u64) -> bool {
        self.try_reserve(permits, timeout, now_micros).is_some()
    }

    /// Whether a reservation could start right now.
    pub fn is_available(&self, now_micros: u64) -> bool {
        match self.operator {
            _ if self.members.is_empty() => true,
            Operator::And => self.members.iter().all(|m| m.is_available(now_micros)),
            Operator::Or => self.members.iter().any(|m| m.is_available(now_micros)),
            Operator::None => true,
        }
    }

    fn is_exceeded(&self, failures: usize) -> bool {
        if self.members.is_empty() {
            return false;
        }
        match self.operator {
            Operator::And => failures > 0,
            Operator::Or => failures == self.members.len(),
            Operator::None => false,
        }
    }
}
