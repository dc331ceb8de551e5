pub mod error;
pub mod ops;
pub mod store;
pub mod sync;
pub mod types;

pub use error::ChannelError;
pub use ops::AdminOp;
pub use store::{ChannelStore, ChannelSummary, CreateChannelResult, JoinResult, PostReceipt};
pub use sync::SyncResult;
pub use types::{ChannelView, Message, MessageKind, Slot, SlotKind};
