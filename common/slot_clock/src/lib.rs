//! Provides the `SlotClock` trait: monotone slot/epoch derivation from the
//! genesis time, plus the tolerance arithmetic used by gossip validation.

mod manual_slot_clock;
mod system_time_slot_clock;

use std::time::Duration;
use types::Slot;

pub use crate::manual_slot_clock::ManualSlotClock;
pub use crate::system_time_slot_clock::SystemTimeSlotClock;

/// A clock that reports the current slot.
///
/// The clock is not required to be monotonically increasing and may go
/// backwards if the underlying time source does. Consumers that require
/// monotonicity (e.g. the fork-choice store) must enforce it themselves.
pub trait SlotClock: Send + Sync + Sized + Clone {
    /// Creates a new slot clock where the first slot is `genesis_slot`, genesis occurred
    /// `genesis_duration` after the `UNIX_EPOCH` and each slot is `slot_duration` apart.
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self;

    /// Returns the slot at this present time.
    fn now(&self) -> Option<Slot>;

    /// Returns the slot at this present time if genesis has happened. Otherwise, returns the
    /// genesis slot. Returns `None` if there is an error reading the clock.
    fn now_or_genesis(&self) -> Option<Slot> {
        if self.is_prior_to_genesis()? {
            Some(self.genesis_slot())
        } else {
            self.now()
        }
    }

    /// Indicates if the current time is prior to genesis time.
    ///
    /// Returns `None` if the system clock cannot be read.
    fn is_prior_to_genesis(&self) -> Option<bool>;

    /// Returns the present time as a duration since the `UNIX_EPOCH`.
    ///
    /// Returns `None` if the present time is before the `UNIX_EPOCH`.
    fn now_duration(&self) -> Option<Duration>;

    /// Returns the slot of the given duration since the `UNIX_EPOCH`.
    fn slot_of(&self, now: Duration) -> Option<Slot>;

    /// Returns the duration between slots
    fn slot_duration(&self) -> Duration;

    /// Returns the duration from now until `slot`.
    fn duration_to_slot(&self, slot: Slot) -> Option<Duration>;

    /// Returns the duration until the next slot.
    fn duration_to_next_slot(&self) -> Option<Duration>;

    /// Returns the duration until the first slot of the next epoch.
    fn duration_to_next_epoch(&self, slots_per_epoch: u64) -> Option<Duration>;

    /// Returns the start time of the slot, as a duration since `UNIX_EPOCH`.
    fn start_of(&self, slot: Slot) -> Option<Duration>;

    /// Returns the first slot to be returned at the genesis time.
    fn genesis_slot(&self) -> Slot;

    /// Returns the duration between `UNIX_EPOCH` and the start of the genesis slot.
    fn genesis_duration(&self) -> Duration;

    /// Returns the current slot if it were `tolerance` later than now.
    fn now_with_future_tolerance(&self, tolerance: Duration) -> Option<Slot> {
        self.slot_of(self.now_duration()?.checked_add(tolerance)?)
    }

    /// Returns the current slot if it were `tolerance` earlier than now.
    fn now_with_past_tolerance(&self, tolerance: Duration) -> Option<Slot> {
        self.slot_of(self.now_duration()?.checked_sub(tolerance)?)
            .or_else(|| Some(self.genesis_slot()))
    }

    /// Returns the delay between the start of the slot and when it was received.
    ///
    /// Returns `None` if the slot is in the future w.r.t. `seen_timestamp`.
    fn seconds_from_slot_start(&self, slot: Slot, seen_timestamp: Duration) -> Option<Duration> {
        seen_timestamp.checked_sub(self.start_of(slot)?)
    }

    /// Returns the duration since the start of the current slot.
    fn seconds_from_current_slot_start(&self) -> Option<Duration> {
        self.seconds_from_slot_start(self.now()?, self.now_duration()?)
    }
}
