pub mod data_service;
pub mod in_flight;
pub mod session;

pub use data_service::DataService;
pub use in_flight::{InFlightGuard, InFlightTracker};
pub use session::{Session, SessionEvent};
