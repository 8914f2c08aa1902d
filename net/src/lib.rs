//! ringlet networking layer.
//!
//! Participants form a directed logical ring: every node has exactly one
//! predecessor (the node whose frames it receives) and one successor (the
//! node it forwards frames to).  A new node splices itself between two
//! members through a three-message handshake coordinated by the member it
//! contacts; chat frames then travel one lap around the ring and are
//! dropped when they return to their sender.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────────────────────────────────────────┐
//!  │  SwarmHandle (send text, change nickname,        │
//!  │  set receiver)                                   │
//!  └──────────────────────┬───────────────────────────┘
//!                         │
//!  ┌──────────────────────▼───────────────────────────┐
//!  │  RingClient (state machine)                      │
//!  │  • (frame, origin) dispatch                      │
//!  │  • predecessor/successor swap                    │
//!  │  • admission slot (one splice at a time)         │
//!  └──────┬───────────────────────────────┬───────────┘
//!         │                               │
//!  ┌──────▼──────┐                 ┌──────▼──────┐
//!  │  PeerPool   │                 │  Listener   │
//!  │  (role bits │                 │  (accept →  │
//!  │  + readers) │                 │  slot fill) │
//!  └──────┬──────┘                 └─────────────┘
//!         │
//!  ┌──────▼───────────────────────────────────────────┐
//!  │  Connection (framed TCP, serialized writes)      │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! Reader tasks publish `(origin, frame)` pairs onto one fan-in channel; a
//! single dispatcher task applies every state transition under one lock.
//! The origin is the role bitset of the producing connection *at read
//! time*: roles move between connections during a splice while reads stay
//! put, which is what lets a single connection serve as both predecessor
//! and successor in a two-node ring.
//!
//! Keep-alive is not enforced: `Ping` frames are discarded on receipt and
//! never emitted, so a dead peer is only discovered on the next write or
//! read failure.  There is no repair protocol when a member vanishes.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`]     | `RingNetConfig` defaults and dev overrides |
//! | [`connection`] | Framed TCP connection and `Peer` |
//! | [`pool`]       | Role bitsets, reader tasks, fan-in channel |
//! | [`admission`]  | Single-cell rendezvous for the admitting peer |
//! | [`nick_map`]   | Concurrent address → nickname store |
//! | [`client`]     | The per-node ring state machine |
//! | [`handle`]     | `SwarmHandle` façade and `ContentReceiver` |
//! | [`bootstrap`]  | `create_swarm` / `join_swarm` entry points |
//! | [`error`]      | Crate-wide error enum |

pub mod admission;
pub mod bootstrap;
mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod nick_map;
pub mod pool;
#[cfg(test)]
pub(crate) mod test_util;

pub use {
    bootstrap::{create_swarm, join_swarm},
    config::RingNetConfig,
    error::{Result, RingNetError},
    handle::{ContentReceiver, NilReceiver, SwarmHandle},
};
