pub mod branch;
pub mod client;
pub mod document;
pub mod money;
pub mod principal;
pub mod tenant;
