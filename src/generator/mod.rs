mod client;
mod progress;
mod transport;

pub use client::{GenerationClient, Pacing, DEFAULT_API_URL};
pub use transport::{Transport, TransportError, TransportResponse};
