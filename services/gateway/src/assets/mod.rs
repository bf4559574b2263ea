mod error;
mod local;
mod signer;
mod store;

pub use error::AssetError;
pub use local::LocalAssetStore;
pub use signer::UrlSigner;
pub use store::{AssetKey, AssetStore, StoredAsset};

pub const ASSETS_DIR: &str = "assets";
