//! Domain operations over [`crate::graph_client::GraphClient`].
//!
//! Each service validates every caller-supplied value before a request is
//! built and hands back sanitized projections only.

pub mod calendar;
pub mod planner;
pub mod todo;

pub use calendar::CalendarService;
pub use planner::PlannerService;
pub use todo::TodoService;

pub const DEFAULT_TOP: u32 = 25;
pub const MAX_TOP: u32 = 100;

/// Page size sent as `$top`, always within 1..=100.
pub fn clamp_top(top: Option<u32>) -> u32 {
    top.unwrap_or(DEFAULT_TOP).clamp(1, MAX_TOP)
}
