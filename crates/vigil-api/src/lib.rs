// vigil-api: Async health-probe client for the monitoring backend

pub mod error;
pub mod health;
pub mod transport;

pub use error::Error;
pub use health::{HealthBody, HealthClient, HealthReport};
pub use transport::{TlsMode, TransportConfig};
