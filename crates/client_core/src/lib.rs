pub mod banner;
pub mod binding;
pub mod controller;
pub mod error;
pub mod projection;
pub mod screens;
pub mod transport;

pub use banner::{Banner, ERROR_BANNER_TTL, SUCCESS_BANNER_TTL};
pub use binding::ViewBinding;
pub use controller::{Lifecycle, ListViewController, ViewEvent, ViewSnapshot};
pub use error::{ControllerError, FetchError};
pub use transport::{HttpTransport, ListTransport};

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod transport_tests;
