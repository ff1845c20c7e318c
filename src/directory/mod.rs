//! Account and volume directories backed by controller calls.
//!
//! The controller is the only source of truth: every lookup is a fresh call
//! and no record outlives the operation that fetched it.

mod account;
mod error;
mod request;
mod volume;

pub use account::AccountDirectory;
pub use error::DirectoryError;
pub use request::{
    BYTES_PER_GIB, CreateVolumeRequest, CreateVolumeRequestBuilder, VolumeType, VolumeTypes,
};
pub use volume::{DEFAULT_PAGE_SIZE, Deletion, VolumeDirectory};
