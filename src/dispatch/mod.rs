//! Check dispatch and response correlation
//!
//! The publisher fans requests out to the fleet; the correlator drains
//! the shared response stream back into the check store.

pub mod correlator;
pub mod publisher;

pub use correlator::{record_response, ResponseCorrelator};
pub use publisher::CheckPublisher;
