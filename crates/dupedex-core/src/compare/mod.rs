mod checksum_map;
mod duplicates;
mod name;

pub use checksum_map::ChecksumMap;
pub use duplicates::{CompareReport, Comparator, DuplicateMatch};
pub use name::{search_names, MatchMode, NameMatch, NameQuery};
