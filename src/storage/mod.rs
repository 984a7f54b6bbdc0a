pub mod collection;
pub mod cursor;
pub mod deployment;
pub mod memory;

pub use collection::{CollectionData, IndexSpec};
pub use cursor::{Cursor, FindOptions};
pub use deployment::{Deployment, DeploymentBuilder};
pub use memory::{CollectionHandle, DocumentStorage, namespace};
