pub mod action;
pub mod menu;
pub mod outbound;
pub mod session;
