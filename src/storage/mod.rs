pub mod corpus_cache;
pub mod corpus_metadata;
pub mod corpus_storage;

pub use corpus_cache::{fingerprint_directory, CorpusCache};
pub use corpus_metadata::{CorpusMetadata, Dtype, FieldShape};
pub use corpus_storage::{load_corpus, load_metadata, print_corpus_info, save_corpus_with_metadata};
