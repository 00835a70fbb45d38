//! Context module - wiring of the process-lifetime services.

mod providers;
mod registry;

pub use providers::initialize_context;
pub use registry::ServiceContext;
