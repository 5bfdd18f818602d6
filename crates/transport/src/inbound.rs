use karani_core::dialog::action::RawInput;

/// Which webhook a turn arrived on. Replies go back out on the same
/// transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    Twilio,
    Whatsapp,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Twilio => "twilio",
            Self::Whatsapp => "whatsapp",
        }
    }
}

/// One inbound message in transport-independent shape: who sent it (raw
/// sender identity, not yet normalized) and what they sent. Both adapters
/// produce this and nothing else crosses into the dialog engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub transport: Transport,
    pub from: String,
    pub input: RawInput,
}
