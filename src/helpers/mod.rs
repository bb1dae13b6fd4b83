pub mod ids;
pub(crate) mod json;
pub mod sse;
pub mod upload;

pub use json::*;
pub use upload::{IncomingFile, StoredUpload, UploadError, UploadHandler};
