mod backend;
mod detector;
mod error;
mod session;
#[cfg(test)]
mod test_server;

pub use backend::{BackendClient, Registration};
pub use detector::RemoteDetector;
pub use error::ClientError;
pub use session::{Session, SessionContext};
