//! # pype-anatomy
//!
//! Tera-based path templates ("anatomy") used to compute where published
//! files live on disk.
//!
//! ```rust,no_run
//! use pype_anatomy::{Anatomy, TemplateData};
//!
//! fn hero_dir(anatomy: &Anatomy) -> Option<String> {
//!     let data = TemplateData::new()
//!         .with("asset", "sh010")
//!         .with("subset", "animMain");
//!     anatomy.publish_folder("hero", &data).ok()
//! }
//! ```

pub mod anatomy;
pub mod data;
pub mod error;

pub use anatomy::{Anatomy, AnatomyConfig, AnatomyTemplate, FilledTemplate, FRAME_SPLITTER};
pub use data::TemplateData;
pub use error::AnatomyError;
