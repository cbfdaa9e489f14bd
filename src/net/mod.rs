//! Network boundary: request/response types and the HTTP client.

mod client;
#[cfg(test)]
pub mod fake;
mod types;

pub use client::{HttpClient, Network};
pub use types::{Destination, Request, Response, ResponseSource};
