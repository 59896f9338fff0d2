//! sockprobe - SockJS protocol conformance harness
//!
//! Drives a live SockJS server over HTTP, raw TCP, and WebSocket, and checks
//! every observable response against the protocol's normative rules.

pub mod catalog;
pub mod config;
pub mod cookie;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod protocol;
pub mod raw;
pub mod response;
pub mod scenario;
pub mod verify;
pub mod ws;

pub use config::Config;
pub use endpoint::{Endpoint, Endpoints};
pub use error::{AssertionFailure, HandshakeError, TransportError};
pub use response::NormalizedResponse;
pub use scenario::{RunSummary, Runner, Scenario, ScenarioState};
