//! Screen-context detection and prefix suggestion caching for the coreply
//! overlay. Everything here is synchronous; the async side lives in
//! `coreply-service`.

pub mod cache;
pub mod chat;
pub mod detector;
pub mod extract;
pub mod geometry;
pub mod registry;
pub mod session;
pub mod text;
pub mod tree;

pub use cache::SuggestionCache;
pub use chat::{ChatContents, ChatMessage, Sender, TypingInfo};
pub use detector::{detect, DetectionResult};
pub use registry::{AppDescriptor, AppRegistry, InputRule};
pub use session::{ApplyOutcome, ScreenContext, SuggestionTicket, TranscriptUpdate};
pub use tree::{NodeHandle, NodeInfo, Rect, ScreenArena, ScreenTree, TreeError};
