//! The Rust SDK for Optable Sandboxes, an identity and audience targeting service for ad
//! personalization.
//!
//! # Overview
//!
//! The SDK revolves around [`OptableSdk`], a client of one sandbox addressed by a host and an
//! application ID (see [`Config`]). It lets an app:
//! - resolve the visitor to type-prefixed [`identifiers`] ([`OptableSdk::identify`],
//!   [`OptableSdk::identify_email`], [`OptableSdk::identify_from_uri`]),
//! - attach traits and behavioral events ([`OptableSdk::profile`], [`OptableSdk::witness`]),
//! - fetch key-value targeting data for ad requests ([`OptableSdk::targeting`]), which is cached
//!   locally and readable offline ([`OptableSdk::targeting_from_cache`]).
//!
//! ```no_run
//! # async fn run() -> optable::Result<()> {
//! use optable::SdkConfig;
//!
//! let sdk = SdkConfig::new("sandbox.customer.com", "my-app").to_sdk()?;
//!
//! if let Some(targeting) = sdk.targeting().await.success() {
//!     println!("{:?}", targeting);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Visitor passport
//!
//! The sandbox identifies returning visitors with an opaque passport sent in the
//! `X-Optable-Visitor` header. The SDK stores the latest passport received and attaches it to
//! every request. State is kept in a [`KeyValueStore`] supplied by the app, so it survives
//! restarts when the store does. The default [`InMemoryStore`] does not: pass a durable store,
//! such as a [`FileStore`], with [`SdkConfig::storage`] to keep visitors recognized across
//! restarts.
//!
//! # Error Handling
//!
//! Remote operations resolve to an [`EdgeResponse`], a closed enum of success, API error,
//! network error and unknown error. They never panic or fail synchronously. Other fallible
//! operations return [`Result`] with the [`Error`] enum.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, with
//! the `optable` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod identifiers;
pub mod storage;

mod advertising_id;
mod config;
mod edge;
mod error;
mod local_storage;
mod sandbox;
mod sdk;
mod sdk_metadata;

pub use advertising_id::{AdvertisingIdProvider, AdvertisingInfo};
pub use config::{Config, SdkConfig};
pub use edge::{ApiErrorBody, EdgeResponse, ResponseError, VISITOR_HEADER};
pub use error::{Error, Result};
pub use identifiers::Identifier;
pub use sandbox::{
    IdentifyResponse, InitResponse, ProfileResponse, ProfileTraits, TargetingResponse,
    WitnessProperties, WitnessResponse,
};
pub use sdk::{OptableSdk, PendingResponse};
pub use sdk_metadata::SdkMetadata;
pub use storage::{FileStore, InMemoryStore, KeyValueStore};
