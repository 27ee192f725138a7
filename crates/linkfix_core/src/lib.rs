pub mod api;
pub mod archive;
pub mod config;
pub mod fixer;
pub mod ledger;
pub mod probe;
pub mod store;
