// Network simulation, interception and recording

pub mod controller;
pub mod event;
pub mod pattern;
pub mod rule;

pub use controller::{
    DEFAULT_FLAKY_RATE, DEFAULT_SLOW_DELAY, Interception, NetworkController, RequestInfo,
    SubscriptionId,
};
pub use event::{CapturedResponse, EventKind, NetworkEvent, Recording};
pub use pattern::UrlPattern;
pub use rule::{MockResponse, NetworkRule, RuleAction};
