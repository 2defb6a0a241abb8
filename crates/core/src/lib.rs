//! Threadline Core - domain types and pure commerce logic.
//!
//! This crate provides the types and state transitions shared by all Threadline
//! components:
//! - `storefront` - JSON API server for carts, orders and shipment tracking
//! - `cli` - Command-line tools for migrations, seeding and maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no clocks. Callers pass `now` explicitly, which keeps every
//! transition deterministic and testable.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices and statuses
//! - [`catalog`] - Product/variant data and option validation
//! - [`cart`] - Cart lines and the line-merging operations
//! - [`order`] - Order snapshots and the order lifecycle
//! - [`tracking`] - Mock carrier shipment simulation
//! - [`error`] - Domain error codes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod error;
pub mod order;
pub mod tracking;
pub mod types;

pub use error::CommerceError;
pub use types::*;
