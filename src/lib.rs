//! Delta packages for versioned application release archives.
//!
//! Given two full release archives, [`create::build_delta`] produces a
//! compact delta archive carrying only the differences between them;
//! [`apply::apply_delta`] reconstructs the full new archive bit-identically
//! from the base plus that delta. The loose semantic ordering in
//! [`version`] gates which direction a delta may be built in.

pub mod apply;
pub mod archive;
pub mod codec;
pub mod create;
pub mod error;
pub mod layout;
pub mod progress;
pub mod release_entry;
pub mod util;
pub mod version;

pub use apply::{apply_delta, ApplySummary};
pub use create::build_delta;
pub use error::{Error, Result};
pub use progress::{BuildStats, ProgressFn};
pub use release_entry::ReleaseEntry;
pub use version::Version;
