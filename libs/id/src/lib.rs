//! # weft-id
//!
//! Typed identifiers shared by the weft server and client.
//!
//! ## Design Principles
//!
//! - Ids are system-generated and opaque to the browser; component *names*
//!   are the developer-controlled labels that survive process restarts
//! - Every id has one canonical string form with strict parsing
//! - Ids are typed so a handler id can never be passed where a component id
//!   is expected
//!
//! ## Id Format
//!
//! All ids use a prefixed format: `{prefix}_{ulid}`
//!
//! Examples:
//! - `cmp_01HV4Z2WQXKJNM8GPQY6VBKC3D` (component instance)
//! - `evh_01HV4Z3MXNKPQR9HSTZ7WCLD4E` (event handler)
//! - `conn_01HV4Z4NYPLTRS0JTUA8XDME5F` (connection)
//!
//! A ULID carries 80 bits of randomness, so an id is never reused while a
//! client can still reference it.

mod error;
#[doc(hidden)]
pub mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
