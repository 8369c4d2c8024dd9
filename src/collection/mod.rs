mod core;
mod hooks;
mod index_admin;
mod ops;

pub use self::core::Collection;
pub use hooks::{Captured, HookSubject, MutationEvent, MutationHook};
pub use index_admin::UniqueIndex;
pub use ops::UpdateOptions;
