pub mod models;
pub mod parser;
pub mod writer;
pub mod error;
pub mod openrtb;
pub mod selector;
pub mod enricher;
pub mod formatter;
pub mod config;
pub mod exchange;
pub mod metrics;
pub mod endpoint;

pub use endpoint::CtvEndpoint;
pub use error::{Result, VastError};
pub use models::Vast;
pub use parser::{parse_vast, parse_vast_bytes};
