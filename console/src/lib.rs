//! Transcript reconciliation for the operator console.
//!
//! Turns polled, paginated and partially streamed records (chat messages,
//! tool-call steps, agent session logs) into stable, chronologically ordered
//! views without a server-push channel.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod follow;
pub mod grouping;
pub mod http;
pub mod interleave;
pub mod logs;
pub mod merge;
pub mod payload;
pub mod poll;
pub mod tailer;

pub use api::ConsoleApi;
pub use chat::{ChatSnapshot, ChatTranscript};
pub use config::ConsoleConfig;
pub use error::{ConsoleError, Result};
pub use follow::{FollowState, Viewport};
pub use grouping::{group_by_session, layout, SessionGroup, TranscriptItem};
pub use http::HttpApi;
pub use interleave::{final_text, flatten, interleave, Part};
pub use logs::LogFeed;
pub use merge::{merge, Direction, PagedList};
pub use poll::{PollExit, PollSlot, PollState, PollTarget, Poller};
pub use tailer::LogTailer;
