//! # Audio Module
//!
//! Per-guild playback for Guild Player.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - Pending tracks plus the currently playing one, per guild
//! - Every mutation is persisted through the ordered [`crate::storage::QueueWriter`]
//!
//! ### [`player`] - Playback Driver
//! - The only component that advances a queue
//! - State machine `Idle → Loading → Playing ⇄ Paused → Stopping → Idle`
//! - Stream-open failures skip to the next track without reaching the user
//!
//! ### [`registry`] - Session Registry
//! - One live player per guild
//!
//! ### [`transport`] / [`voice`] - Voice Transport
//! - Traits the driver talks to, and their songbird implementation
//!
//! Guilds never share state: a slow load in one guild does not delay another.

pub mod player;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod voice;
