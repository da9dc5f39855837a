//! Per-guild playback sessions.
//!
//! Every [`GuildSession`] is a handle to one tokio task that owns the queue,
//! the playback cursor and the voice connection of a guild. Commands and
//! transport notifications are serialized through the same inbox.

mod context;
pub mod handle;
pub mod messages;
mod playback;
pub mod queue;
pub mod state;
pub mod track;
mod voice;

pub use context::SessionDeps;
pub use handle::GuildSession;
pub use messages::*;
pub use queue::TrackQueue;
pub use state::*;
pub use track::Track;
