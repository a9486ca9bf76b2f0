//! Funds Ledger Service
//!
//! Maintains one funds record per user and mutates it atomically in
//! response to order lifecycle actions:
//! - place / cancel (BUY orders commit and release cash)
//! - edit-revert / edit-apply (swap the committed amount on edit)
//! - execute (release margin; SELLs realise P&L against the cost basis)
//!
//! Invariant after every action:
//! `available_margin == available_cash + collateral_liquid + collateral_equity`

pub mod margin;
pub mod locks;
pub mod ledger;

pub use ledger::{Fill, FundsLedger, LedgerAction, LedgerEntry, LedgerError, LedgerStats};
pub use locks::{UserGuard, UserLocks};
