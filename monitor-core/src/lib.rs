//! Monitor core library: build snapshot types, parsing, merge, settings.
//!
//! - [`types`]: newtypes, [`BuildSnapshot`], [`BuildUpdate`]
//! - [`snapshot`]: payload parsing and the right-biased [`merge`]
//! - [`settings`]: process-wide configuration (`~/.monitor/settings.yaml`)
//! - [`error`]: [`ParseError`], [`SettingsError`]

pub mod error;
pub mod settings;
pub mod snapshot;
pub mod types;

pub use error::{ParseError, SettingsError};
pub use settings::Settings;
pub use snapshot::merge;
pub use types::{BuildId, BuildSnapshot, BuildUpdate, ObjectId, StatusSet, UserRef, FAILED};
