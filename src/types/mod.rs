pub mod errors;
pub mod options;
pub mod report;
pub mod site;
pub mod snapshot;
pub mod target;
pub mod transaction;

pub use errors::*;
pub use options::*;
pub use report::*;
pub use site::*;
pub use snapshot::*;
pub use target::*;
pub use transaction::*;
