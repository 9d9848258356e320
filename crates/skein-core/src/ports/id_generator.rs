//! IdGenerator port - id allocation.
//!
//! Ids are generated before anything is persisted, so a whole workflow can be
//! laid out (parents, triggers) in memory and inserted afterwards.

use ulid::Ulid;

use crate::domain::ids::{ChainId, GroupId, TaskId};
use crate::ports::Clock;

/// # Thread Safety
/// - `Send + Sync`: the engine shares one generator between tasks.
pub trait IdGenerator: Send + Sync {
    fn task_id(&self) -> TaskId;

    fn chain_id(&self) -> ChainId;

    fn group_id(&self) -> GroupId;
}

/// ULID generator.
///
/// The timestamp half comes from the clock, so a `FixedClock` gives ids
/// that share a timestamp and differ only in their random part.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn task_id(&self) -> TaskId {
        TaskId::from_ulid(self.next())
    }

    fn chain_id(&self) -> ChainId {
        ChainId::from_ulid(self.next())
    }

    fn group_id(&self) -> GroupId {
        GroupId::from_ulid(self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.task_id();
        let id2 = id_gen.task_id();
        let id3 = id_gen.task_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.chain_id();
        let id2 = id_gen.chain_id();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), id2.as_ulid().timestamp_ms());
        assert_eq!(
            id1.as_ulid().timestamp_ms(),
            fixed_time.timestamp_millis() as u64
        );
    }

    #[test]
    fn prefixes_follow_the_kind() {
        let id_gen = UlidGenerator::new(SystemClock);

        assert!(id_gen.task_id().to_string().starts_with("task-"));
        assert!(id_gen.chain_id().to_string().starts_with("chain-"));
        assert!(id_gen.group_id().to_string().starts_with("group-"));
    }
}
