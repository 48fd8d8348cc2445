//! Collaborator interfaces.
//!
//! The scheduler talks to two external collaborators through these traits:
//! - `DropsApi`: the remote API client (campaigns, inventory, claims, streams)
//! - `PageDriver`: the page automation layer that keeps a stream open
//!
//! `memory` holds scriptable in-memory implementations of both for tests.

mod api;
mod driver;
pub mod memory;

pub use api::DropsApi;
pub use driver::{
    BLANK_PAGE, DEFAULT_LIVE_EVENT_CAPACITY, LiveEvent, LiveEventPublisher, LiveEventSubscription,
    PageDriver,
};
pub use memory::{InMemoryDropsApi, InMemoryPageDriver};
