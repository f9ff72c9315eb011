// ── Live-state storage ──
//
// The resource table merged from poll results, plus the watch-backed
// collection that publishes derived state to readers.

mod collection;
pub mod table;

pub(crate) use collection::EntityCollection;
pub use table::{MergeOutcome, ResourceTable, SequencedSnapshot, merge};
