// Adapters layer: concrete implementations of the domain ports
// (remote stores, the scratch directory, child plugin execution).

pub mod invoke;
pub mod scratch;
pub mod store;

pub use invoke::ExecDelegator;
pub use scratch::DirScratchStore;
pub use store::StoreRegistry;
