//! Domain types for drops-miner.
//!
//! Campaigns and their drops, inventory progress, and live stream candidates.

pub mod campaign;
pub mod inventory;
pub mod stream;

pub use campaign::{Campaign, CampaignDetail, CampaignStatus, ChannelAllowList, RewardDrop};
pub use inventory::{CampaignProgress, DropProgress, DropTarget, Inventory};
pub use stream::{StreamCandidate, StreamFilter};
