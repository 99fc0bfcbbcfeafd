//! Dictionary storage: the catalog, the on-disk formats and the shared
//! record cache.

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod frequency;
pub mod grammar;
pub mod header;
pub mod permanent;
pub mod temporary;
pub mod word_record;

pub use backend::{Backend, SearchHit, SearchResult};
pub use cache::{MemberId, RecordCache, RecordHandle, RecordKey};
pub use catalog::{Catalog, DicDirectory, DicMember, MemberClass, MemberKind, MemberRef, Permission};
pub use frequency::FrequencyStore;
pub use grammar::GrammarTable;
pub use permanent::{PermanentBuilder, PermanentDic};
pub use temporary::TemporaryDic;
pub use word_record::{Candidate, WordRecord};
