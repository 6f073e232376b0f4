pub mod augment;
pub mod batch_cursor;
pub mod builder;
pub mod corpus;
pub mod error;
pub mod image_loader;
pub mod split;

pub use augment::{AugmentOptions, Augmenter, CropBound, Sample, SAMPLES_PER_IMAGE};
pub use batch_cursor::{Batch, BatchCursor};
pub use builder::{resolve_seed, BuildOptions, DatasetBuilder};
pub use corpus::Corpus;
pub use error::DatasetError;
pub use image_loader::{list_image_files, load_image, FilenameDigitLabel, LabelExtractor};
pub use split::{shuffle_and_split, Split, Subset};
