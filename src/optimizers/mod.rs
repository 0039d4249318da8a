pub mod frame_skip;
pub mod priority_queue;
pub mod text_merger;
pub mod text_validator;
pub mod translation_cache;
pub mod translation_chain;

pub use frame_skip::{CaptureInput, FrameSkip, FrameSkipOnSkip, SimilarityMode};
pub use priority_queue::PriorityQueue;
pub use text_merger::TextBlockMerger;
pub use text_validator::TextValidator;
pub use translation_cache::{TranslateInput, TranslationCache};
pub use translation_chain::{TranslationChain, Translator};
