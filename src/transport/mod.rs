/// Local line-file reads and writes used by pipeline artifacts.
pub mod fs;
/// Blocking HTTP transport for archive requests.
pub mod http;

pub use http::UreqTransport;
