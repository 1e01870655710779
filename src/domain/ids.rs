//! Time-sortable 63-bit identifiers.
//!
//! Layout, most significant first: 41 bits of milliseconds since a configurable
//! epoch, 10 bits of machine id, 12 bits of per-millisecond sequence.

use std::sync::{Arc, Mutex};

use time::OffsetDateTime;

use crate::cache::lock::mutex_lock;
use crate::domain::error::DomainError;
use crate::domain::types::PostId;
use crate::util::clock::Clock;

const SOURCE: &str = "domain::ids";

const MACHINE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_BITS: u32 = 41;

pub const MAX_MACHINE_ID: u16 = (1 << MACHINE_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;
const MAX_TIMESTAMP: i64 = (1 << TIMESTAMP_BITS) - 1;

#[derive(Debug, Default)]
struct State {
    last_ms: i64,
    sequence: u16,
}

pub struct IdGenerator {
    epoch: OffsetDateTime,
    machine_id: u16,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl IdGenerator {
    pub fn new(
        epoch: OffsetDateTime,
        machine_id: u16,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DomainError> {
        if machine_id > MAX_MACHINE_ID {
            return Err(DomainError::validation(format!(
                "machine id {machine_id} exceeds {MAX_MACHINE_ID}"
            )));
        }
        if clock.now() < epoch {
            return Err(DomainError::validation("id epoch lies in the future"));
        }
        Ok(Self {
            epoch,
            machine_id,
            clock,
            state: Mutex::new(State::default()),
        })
    }

    /// Produce the next id. Ids from one generator are strictly increasing even
    /// if the wall clock steps backwards or a millisecond's sequence is exhausted.
    pub fn next_id(&self) -> Result<PostId, DomainError> {
        let elapsed = self.clock.now() - self.epoch;
        let now_ms = i64::try_from(elapsed.whole_milliseconds()).unwrap_or(i64::MAX);

        let mut state = mutex_lock(&self.state, SOURCE, "next_id");
        if now_ms > state.last_ms {
            state.last_ms = now_ms;
            state.sequence = 0;
        } else if state.sequence == MAX_SEQUENCE {
            state.last_ms += 1;
            state.sequence = 0;
        } else {
            state.sequence += 1;
        }

        if state.last_ms > MAX_TIMESTAMP {
            return Err(DomainError::invariant("id timestamp space exhausted"));
        }

        let id = (state.last_ms << (MACHINE_BITS + SEQUENCE_BITS))
            | (i64::from(self.machine_id) << SEQUENCE_BITS)
            | i64::from(state.sequence);
        Ok(PostId(id))
    }

    /// Milliseconds since the epoch encoded in `id`.
    pub fn timestamp_ms(id: PostId) -> i64 {
        id.get() >> (MACHINE_BITS + SEQUENCE_BITS)
    }

    pub fn machine_of(id: PostId) -> u16 {
        ((id.get() >> SEQUENCE_BITS) & i64::from(MAX_MACHINE_ID)) as u16
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::util::clock::ManualClock;

    fn generator(clock: Arc<ManualClock>) -> IdGenerator {
        IdGenerator::new(datetime!(2024-01-01 00:00 UTC), 7, clock).expect("generator")
    }

    #[test]
    fn ids_are_strictly_increasing_within_a_millisecond() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 00:00 UTC)));
        let ids = generator(clock.clone());

        let mut previous = ids.next_id().expect("id");
        for _ in 0..5000 {
            let next = ids.next_id().expect("id");
            assert!(next > previous);
            previous = next;
        }
        assert_eq!(IdGenerator::machine_of(previous), 7);
    }

    #[test]
    fn clock_regression_does_not_reuse_ids() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 00:00 UTC)));
        let ids = generator(clock.clone());

        clock.advance(Duration::from_secs(10));
        let later = ids.next_id().expect("id");
        clock.set(datetime!(2024-06-01 00:00 UTC));
        let after_regression = ids.next_id().expect("id");

        assert!(after_regression > later);
    }

    #[test]
    fn embeds_elapsed_milliseconds() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-01-01 00:00:01 UTC)));
        let ids = generator(clock);
        let id = ids.next_id().expect("id");
        assert_eq!(IdGenerator::timestamp_ms(id), 1000);
    }

    #[test]
    fn rejects_machine_id_out_of_range() {
        let clock = Arc::new(ManualClock::default());
        let result = IdGenerator::new(datetime!(2024-01-01 00:00 UTC), 1024, clock);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }
}
