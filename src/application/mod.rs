// Application layer - orchestration on top of the domain and storage.
// The service is split by concern: posting flows in service, credit
// standing in credit, retroactive corrections in adjustment, processor
// reconciliation in reserve.

pub mod adjustment;
pub mod credit;
pub mod error;
pub mod reserve;
pub mod service;

pub use adjustment::*;
pub use credit::*;
pub use error::*;
pub use reserve::*;
pub use service::*;
