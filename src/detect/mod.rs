mod backend;
mod backends;
pub mod postprocess;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, TractOptions};
pub use registry::BackendRegistry;
pub use result::Detection;
