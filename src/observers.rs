//! Renderers for [`RunReport`](crate::report::RunReport)s.
//!
//! Each renderer is gated behind a feature flag to keep the default build
//! free of formatting dependencies:
//!
//! - `table` - Enables the [`table`] module
//! - `json` - Enables the [`json`] module
//! - `full` - Enables both
//!
//! # Example
//!
//! ```rust,ignore
//! use contese::config::RunConfig;
//! use contese::observers::table::TableObserver;
//! use contese::scenarios::compare_counting;
//!
//! let reports = compare_counting(&RunConfig::new())?;
//! println!("{}", TableObserver::new().render(&reports));
//! ```

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;
