//! Headscale gRPC client for hsconverge.
//!
//! This crate provides everything needed to talk to the coordination
//! service:
//!
//! - The `HeadscaleClient` capability trait the reconcilers are written against
//! - Hand-declared `prost` wire messages for `headscale.v1.HeadscaleService`
//! - A `tonic` implementation over one shared, lazily connected channel
//! - Endpoint, bearer token and TLS resolution from settings, environment
//!   variables and files
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Reconcilers    │────▶│ HeadscaleClient  │
//! │                  │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                   ┌───────────────┴───────────────┐
//!          ┌────────▼─────────┐            ┌────────▼─────────┐
//!          │ GrpcHeadscale    │            │  FakeHeadscale   │
//!          │ Client (tonic)   │            │  (test-utils)    │
//!          └────────┬─────────┘            └──────────────────┘
//!                   │ gRPC (TLS)
//!          ┌────────▼─────────┐
//!          │    Headscale     │
//!          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hsconverge_rpc::TransportSettings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = TransportSettings {
//!     endpoint: Some("headscale.example.com:443".to_string()),
//!     ..TransportSettings::default()
//! };
//!
//! // HEADSCALE_API_KEY and HEADSCALE_TLS_* fill in anything not set inline.
//! let client = settings.resolve_from_env()?.connect()?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod grpc;
pub mod pem;
pub mod proto;
mod tls;
pub mod transport;

pub use client::{method, HeadscaleClient};
pub use error::{Result, TransportError};
pub use grpc::{BearerAuth, GrpcHeadscaleClient};
pub use transport::{EnvSource, ProcessEnv, ResolvedTransport, TlsSettings, TransportSettings};

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeHeadscale;

pub use tonic::{Code, Status};
