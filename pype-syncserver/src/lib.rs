//! Sync-server view of representation files across two sites.
//!
//! - [`status`]: status derived from per-site file facts
//! - [`aggregate`]: per-representation and per-file summaries
//! - [`model`]: [`SyncRepresentationModel`], the paged representation table

pub mod aggregate;
pub mod error;
pub mod model;
pub mod status;

pub use aggregate::{file_rows, summarize, FileSummary, RepresentationSummary, SideSummary, SitePair};
pub use error::SyncServerError;
pub use model::{RowFilter, SortColumn, SortOrder, SyncRepresentationModel};
pub use status::{derive, SideState, SyncStatus};
