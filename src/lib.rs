pub mod color;
pub mod command;
pub mod config;
pub mod server;
pub mod session;
pub mod snapshot;

pub use color::AccentColor;
pub use command::PlayerCommand;
pub use session::{MediaBridge, SessionBackend};
pub use snapshot::{MediaSnapshot, PlaybackStatus, RawSession, Snapshot};
