pub mod orderedheaders;
pub mod request;
pub mod requestbody;
pub mod responsebody;
pub mod retry;
pub mod streamfactory;
pub mod transaction;
pub mod transport;

// Re-exports for convenience
pub use request::{Request, RequestParams};
pub use requestbody::RequestBody;
pub use transaction::HttpTransport;
pub use transport::{BodyReader, PreparedRequest, Transport, TransportResponse};
