pub mod frame;
pub mod language;
pub mod region;
pub mod text_block;

pub use frame::{Fingerprint, Frame, FrameIdAllocator, PixelFormat};
pub use language::LanguagePair;
pub use region::{Rect, Region, RegionId};
pub use text_block::{SourceOfTranslation, TextBlock, TranslatedBlock};
