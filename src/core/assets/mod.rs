mod asset_index;

pub use asset_index::{index_path, objects_dir, AssetIndex, AssetManager, AssetObject};
