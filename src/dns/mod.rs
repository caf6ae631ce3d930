pub mod header;
pub mod message;
pub mod question;
pub mod resource;
pub mod wire;

pub use header::{DnsHeader, ResponseCode};
pub use message::{DnsMessage, TsigOpaque};
pub use question::{Question, RecordClass, RecordType};
pub use resource::{RData, ResourceRecord};
pub use wire::ParseError;
