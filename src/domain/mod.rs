mod adjustment;
mod credit;
mod journal;
mod ledger;
mod money;
mod reserve;
mod wallet;

pub use adjustment::*;
pub use credit::*;
pub use journal::*;
pub use ledger::*;
pub use money::*;
pub use reserve::*;
pub use wallet::*;
