//! Wire types for the `planes` subprotocol.

pub mod request;
pub mod response;
