//! Navigation module
//!
//! - `state`: the per-session position state machine with debounced
//!   external address sync
//! - `store`: process-wide broadcast of the displayed position
//! - `address`: the deep-linkable external address the session writes

mod address;
mod state;
mod store;

pub use address::{ExternalAddress, FileAddress, MemoryAddress};
pub use state::{NavigationState, Phase};
pub use store::{NavigationStore, PositionSnapshot, Subscription};
