//! Types shared by the drive browser and the unattended downloader

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
