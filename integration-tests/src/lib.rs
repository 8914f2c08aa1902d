//! End-to-end tests for the ringlet ring overlay.
//!
//! Every scenario runs real nodes over localhost TCP and observes them
//! only through the public surface: the bootstrap functions, the swarm
//! handle, and (for the abuse cases) raw frames on plain sockets.
//!
//! # Scenarios
//!
//! 1. **Two-node formation** — create + join, bidirectional messaging,
//!    origin-stop on both sides
//! 2. **Three-node ring** — a splice through a running member, single
//!    delivery at every non-origin node
//! 3. **Nickname change** — renames show up in subsequent deliveries
//! 4. **Concurrent joiners** — the admission slot serializes them; a
//!    broadcast still reaches everyone exactly once
//! 5. **Mismatched confirm** — a rogue joiner whose confirmation
//!    disagrees with the announcement is rejected without disturbing the
//!    ring
//! 6. **Unknown frame** — garbage tears down only the offending
//!    connection, and the admission slot is released for later joiners

pub mod harness;

#[cfg(test)]
mod ring_tests;
