//! Audit orchestration engine.
//!
//! Owns the headless browser for the whole batch, isolates each site's
//! run inside a fresh browsing context, decides when a page has settled
//! via network-idle detection, and runs the enabled checks in a fixed
//! order, producing one partial-failure-tolerant result per site.

pub mod browser;
pub mod cdp;
pub mod filter;
pub mod idle;
pub mod pipeline;
pub mod scripts;

pub use browser::Browser;
pub use filter::is_ignored_resource;
pub use idle::{wait_for_idle, IdleOutcome, NetworkEvent};
