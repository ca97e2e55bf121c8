mod activity_core;
mod registry;
mod spec;

pub use activity_core::{
    parse_instant, Activity, ActivityKind, VotingRule, VotingWindow, WindowStatus,
};
pub use registry::ActivityRegistry;
pub(crate) use registry::creation_order;
pub use spec::{ActivityDescription, ActivityPatch, ActivitySpec, ActivitySummary};
