//! Payload transport: normalises inbound bodies into a [`FilePayload`] or a
//! JSON passthrough and encodes outbound multipart bodies.

mod error;
mod fetch;
mod file;
mod inbound;
mod multipart;

pub use error::TransportError;
pub use fetch::RemoteFetcher;
pub use file::{sanitize_file_name, FilePayload, DEFAULT_CONTENT_TYPE, DEFAULT_FILE_NAME};
pub use inbound::{parse_inbound, InboundPayload, IMAGE_FIELD, URL_FIELD};
pub use multipart::{encode_multipart, parse_multipart_form, EncodedBody, MultipartPart};

pub const BOUNDARY_PREFIX: &str = "----RequestDirectoryBoundary";
