pub mod inbound;
pub mod sender;
pub mod twilio;
pub mod whatsapp;

pub use inbound::{InboundEvent, Transport};
pub use sender::{MessageSender, SendError};
pub use twilio::TwilioSender;
pub use whatsapp::WhatsappSender;
