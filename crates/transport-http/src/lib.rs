// HTTP transport for remote audio resources

pub mod client;
pub mod range_source;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{HttpClient, ProbeInfo};
pub use range_source::HttpRangeSource;
