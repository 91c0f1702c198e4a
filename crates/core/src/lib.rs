#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod navigation;
pub mod remediation;
pub mod time;

pub use error::Error;
pub use navigation::{
    NavigationController, NavigationError, NavigationEvent, NavigationState, TransitionReason,
};
pub use remediation::{NextQuestion, select_next};
pub use time::Clock;
