pub mod canonical;
pub mod entry;
pub mod persistence;
pub mod smart_dictionary;

pub use canonical::canonicalize;
pub use entry::DictionaryEntry;
pub use smart_dictionary::{ImportMode, MaxEntries, SmartDictionary};
