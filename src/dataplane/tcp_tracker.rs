//! TCP termination tracking
//!
//! Decides from TCP flags when a public port may be reclaimed before its
//! idle timeout. Flags are examined FIN first, then RST, then ACK, so a
//! FIN+ACK segment only ever counts as a FIN.

use super::connection_table::{Direction, PortState};
use crate::protocol::tcp::TcpFlags;
use std::time::{Duration, Instant};

/// What the owner of the port state must do after a segment was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationAction {
    None,
    /// Drop the connection now; the port is free at once
    Reset,
    /// Both sides sent FIN and the last one was acknowledged
    Closed,
}

/// Update `state` for a segment travelling in `direction`.
pub fn observe(state: &mut PortState, flags: TcpFlags, direction: Direction) -> TerminationAction {
    if flags.fin {
        match (state.fin_count, state.termination_direction) {
            (0, _) => {
                state.fin_count = 1;
                state.termination_direction = Some(direction);
            }
            (1, Some(first)) if first == direction.opposite() => state.fin_count = 2,
            _ => {}
        }
        TerminationAction::None
    } else if flags.rst {
        TerminationAction::Reset
    } else if flags.ack && state.fin_count == 2 {
        TerminationAction::Closed
    } else {
        TerminationAction::None
    }
}

/// `last_used` value that makes a closed port allocatable exactly
/// `port_reuse_timeout` after `now`, given the allocator's idle rule.
pub fn reuse_instant(
    now: Instant,
    connection_timeout: Duration,
    port_reuse_timeout: Duration,
) -> Instant {
    if port_reuse_timeout >= connection_timeout {
        // Saturate: shrink the hold until it is representable
        let mut hold = port_reuse_timeout - connection_timeout;
        loop {
            if let Some(instant) = now.checked_add(hold) {
                return instant;
            }
            hold /= 2;
        }
    } else {
        now.checked_sub(connection_timeout - port_reuse_timeout)
            .unwrap_or(now)
    }
}
