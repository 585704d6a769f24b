//! Parse unified diffs (plain, SVN, Git and Mercurial flavours), check whether they apply to a
//! tree, and apply or revert them with byte-accurate results.
//!
//! ```no_run
//! use unipatch::PatchSet;
//! use std::path::Path;
//!
//! let set = PatchSet::from_path("fix.diff")?;
//! if set.errors == 0 && set.apply(Some(Path::new("checkout")), 1) {
//!     println!("{}", set.diffstat());
//! }
//! # Ok::<(), unipatch::PatchError>(())
//! ```

mod apply;
mod check;
mod dialect;
mod diffstat;
mod error;
mod hunk_apply;
mod parser;
mod patch_format;
pub mod util;

pub use apply::ApplyOptions;
pub use check::CanPatch;
pub use error::{FileError, PatchError};
pub use hunk_apply::DEFAULT_SEARCH_WINDOW;
pub use patch_format::{
    ApplySummary, Dialect, FileOutcome, FileStatus, Hunk, HunkLine, LineEnding, LineKind,
    PatchSet, PatchedFile, Side,
};
