//! Core data model shared by the pipeline and its collaborators.

pub mod conversation;
pub mod memory;
pub mod notification;
pub mod segment;

pub use conversation::Conversation;
pub use memory::{Memory, MemoryCategory};
pub use notification::{Goal, SentNotification};
pub use segment::TranscriptSegment;
