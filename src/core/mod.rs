pub mod engine;

pub use crate::domain::model::{ContainerContext, DelegationResult, NetworkConfigList};
pub use crate::domain::ports::{Delegator, KvStore, ScratchStore, StoreFactory};
pub use crate::utils::error::Result;
pub use engine::DelegationEngine;
