//! Integration Test Harness
//!
//! - `StubServer` - in-process SockJS target on a random port, enough of the
//!   protocol for the runner, the probes, and a handful of catalog scenarios
//!
//! # Example
//!
//! ```rust,ignore
//! use harness::StubServer;
//!
//! #[tokio::test]
//! async fn test_greeting() {
//!     let stub = StubServer::start().await.unwrap();
//!     let summary = stub.run_catalog(&["base/greeting"]).await;
//!     assert!(summary.is_success(), "{}", summary);
//! }
//! ```

mod stub;

pub use stub::{SingleFlight, StubServer, CHUNKED_FRAMES};
