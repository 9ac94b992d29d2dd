//! # Audio Module
//!
//! Playback for Encore: the songbird-backed player and the fallback engine
//! that keeps a request alive when its first candidate cannot be streamed.
//!
//! ## Architecture
//!
//! ### [`engine`] - Playback Attempt Engine
//! - One episode per guild, bounded by the attempt cap
//! - Failure classification decides advance, rescue or stop
//! - Stale escalations are dropped by generation
//!
//! ### [`player`] - Audio Player
//! - Voice connections, per-guild queues and track lifecycle
//! - Emits [`events::PlayerEvent`] through a flume channel
//! - Leave-on-empty and leave-on-end timers
//!
//! ### [`session`] - Episode State
//! - Attempt ledger, candidate queue and the fallback flag per guild
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use encore::audio::engine::{PlaybackEngine, PlayRequest};
//! # async fn example(engine: Arc<PlaybackEngine>, request: PlayRequest) {
//! let resolution = engine.resolver().resolve("daft punk one more time", request.requested_by).await;
//! let outcome = engine.start_episode(request, resolution).await;
//! println!("{:?}", outcome);
//! # }
//! ```

pub mod candidates;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod player;
pub mod queue;
pub mod session;
pub mod stream;
