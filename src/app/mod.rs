mod go_live;
mod outputs;
mod runtime;
mod service;
mod session;
mod types;


pub use runtime::{run_until_shutdown, wait_for_shutdown_signal};
pub use service::{StreamingService, StreamingServiceBuilder};
pub use types::ShutdownReason;
