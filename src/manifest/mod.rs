//! Deployment manifest handling.
//!
//! The manifest is a compose file. [`ManifestStore`] owns the file on disk,
//! [`ManifestDocument`] is its order-preserving in-memory form, and
//! [`patch_image_reference`] is the only mutation ever applied to it.

mod document;
mod error;
mod patch;
mod store;

pub use document::{IMAGE_KEY, ManifestDocument, SERVICES_KEY, ServiceEntry};
pub use error::{ManifestError, ManifestResult};
pub use patch::{PatchOutcome, ServiceUpdate, matching_services, patch_image_reference};
pub use store::ManifestStore;
