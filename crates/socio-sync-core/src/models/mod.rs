//! Data models shared by the reader, the CRM client and the engine.

mod api_response;
mod socio;

pub use api_response::*;
pub use socio::*;
