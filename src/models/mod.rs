//! Data models shared by the cache tiers

mod bitmap;
mod context;
mod identity;

pub use bitmap::{Bitmap, EncodeFormat, EncodeOptions};
pub use context::{CallContext, CancelFlag};
pub use identity::{ArtIdentity, ArtRequest, ImageType, Variant};
