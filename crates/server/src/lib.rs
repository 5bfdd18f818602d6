pub mod bootstrap;
pub mod dispatch;
pub mod engine;
pub mod finalize;
pub mod flows;
pub mod health;
pub mod renderer;
pub mod webhooks;
