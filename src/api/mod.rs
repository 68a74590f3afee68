//! Operation surface for the UI layer
//!
//! Typed requests in, `{ ok, data | error }` responses out.

pub mod handler;
pub mod request;

pub use handler::Api;
pub use request::{image_input, Request, Response};
