use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use karani_core::config::WhatsappConfig;
use karani_core::dialog::action::RawInput;
use karani_core::dialog::outbound::OutboundPlan;
use karani_core::msisdn::Msisdn;

use crate::inbound::{InboundEvent, Transport};
use crate::sender::{MessageSender, SendError};

// Cloud API truncates labels beyond these; cut cleanly ourselves.
const BUTTON_TITLE_MAX: usize = 20;
const ROW_TITLE_MAX: usize = 24;

/// Answer the webhook verification handshake: echo the challenge back when
/// the mode and token match, otherwise refuse.
pub fn handshake_response(
    verify_token: &SecretString,
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
) -> Option<String> {
    if mode != Some("subscribe") {
        return None;
    }
    if token != Some(verify_token.expose_secret()) {
        return None;
    }
    challenge.map(str::to_owned)
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextBody>,
    pub interactive: Option<Interactive>,
    pub image: Option<Image>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct Interactive {
    pub button_reply: Option<Reply>,
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Deserialize)]
pub struct Reply {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct Image {
    pub id: String,
}

/// Flatten a webhook payload into canonical inbound events. Delivery
/// receipts and unsupported message kinds are skipped; an entry can carry
/// several messages and each becomes its own turn.
pub fn parse_webhook(payload: &WebhookPayload) -> Vec<InboundEvent> {
    let mut events = Vec::new();

    for entry in &payload.entry {
        for change in &entry.changes {
            for message in &change.value.messages {
                let input = match message.kind.as_str() {
                    "text" => message
                        .text
                        .as_ref()
                        .map(|text| RawInput::Text(text.body.clone())),
                    "interactive" => message.interactive.as_ref().and_then(|interactive| {
                        interactive
                            .button_reply
                            .as_ref()
                            .or(interactive.list_reply.as_ref())
                            .map(|reply| RawInput::Interactive { id: reply.id.clone() })
                    }),
                    "image" => message
                        .image
                        .as_ref()
                        .map(|image| RawInput::Media { reference: image.id.clone() }),
                    _ => None,
                };

                if let Some(input) = input {
                    events.push(InboundEvent {
                        transport: Transport::Whatsapp,
                        from: message.from.clone(),
                        input,
                    });
                }
            }
        }
    }

    events
}

fn truncated(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        return label.to_owned();
    }
    let mut cut: String = label.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// The Graph API message body for one plan. Kept separate from the HTTP
/// call so the shape is testable without a network.
pub fn message_payload(to: &Msisdn, plan: &OutboundPlan) -> Value {
    let base = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to.as_str(),
    });
    let mut payload = base;

    match plan {
        OutboundPlan::Text { body } => {
            payload["type"] = json!("text");
            payload["text"] = json!({ "body": body });
        }
        OutboundPlan::Buttons { body, options } => {
            let buttons: Vec<Value> = options
                .iter()
                .map(|option| {
                    json!({
                        "type": "reply",
                        "reply": {
                            "id": option.id,
                            "title": truncated(&option.label, BUTTON_TITLE_MAX),
                        }
                    })
                })
                .collect();
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "button",
                "body": { "text": body },
                "action": { "buttons": buttons },
            });
        }
        OutboundPlan::List { body, button, options } => {
            let rows: Vec<Value> = options
                .iter()
                .map(|option| {
                    json!({
                        "id": option.id,
                        "title": truncated(&option.label, ROW_TITLE_MAX),
                    })
                })
                .collect();
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "list",
                "body": { "text": body },
                "action": {
                    "button": button,
                    "sections": [{ "rows": rows }],
                },
            });
        }
        OutboundPlan::Document { caption, link, filename } => {
            payload["type"] = json!("document");
            payload["document"] = json!({
                "link": link,
                "filename": filename,
                "caption": caption,
            });
        }
    }

    payload
}

pub struct WhatsappSender {
    http: reqwest::Client,
    phone_number_id: String,
    access_token: SecretString,
    api_base: String,
}

impl WhatsappSender {
    pub fn new(config: &WhatsappConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl MessageSender for WhatsappSender {
    async fn send(&self, to: &Msisdn, plan: &OutboundPlan) -> Result<(), SendError> {
        let endpoint = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let payload = message_payload(to, plan);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected { status: status.as_u16(), body });
        }

        debug!(to = %to, "whatsapp message accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use karani_core::dialog::action::RawInput;
    use karani_core::dialog::outbound::{MenuOption, OutboundPlan};
    use karani_core::msisdn::Msisdn;

    use super::{handshake_response, message_payload, parse_webhook, WebhookPayload};

    fn recipient() -> Msisdn {
        Msisdn::normalize("254722000001", "254").expect("valid phone")
    }

    #[test]
    fn handshake_echoes_challenge_only_for_the_right_token() {
        let token = "verify-me".to_string().into();
        assert_eq!(
            handshake_response(&token, Some("subscribe"), Some("verify-me"), Some("1158201444")),
            Some("1158201444".to_owned())
        );
        assert_eq!(
            handshake_response(&token, Some("subscribe"), Some("wrong"), Some("1158201444")),
            None
        );
        assert_eq!(
            handshake_response(&token, Some("unsubscribe"), Some("verify-me"), Some("x")),
            None
        );
    }

    #[test]
    fn webhook_text_and_replies_become_events() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "104", "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [
                            {
                                "from": "254722000001",
                                "id": "wamid.a",
                                "type": "text",
                                "text": { "body": "hello" }
                            },
                            {
                                "from": "254722000001",
                                "id": "wamid.b",
                                "type": "interactive",
                                "interactive": {
                                    "type": "button_reply",
                                    "button_reply": { "id": "new_invoice", "title": "New invoice" }
                                }
                            },
                            {
                                "from": "254722000001",
                                "id": "wamid.c",
                                "type": "image",
                                "image": { "id": "MEDIA93", "mime_type": "image/png" }
                            }
                        ]
                    }
                }]
            }]
        }))
        .expect("payload parses");

        let events = parse_webhook(&payload);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].input, RawInput::Text("hello".to_owned()));
        assert_eq!(events[1].input, RawInput::Interactive { id: "new_invoice".to_owned() });
        assert_eq!(events[2].input, RawInput::Media { reference: "MEDIA93".to_owned() });
    }

    #[test]
    fn status_only_webhooks_produce_no_events() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{ "changes": [{ "field": "messages", "value": { "statuses": [{}] } }] }]
        }))
        .expect("payload parses");
        assert!(parse_webhook(&payload).is_empty());
    }

    #[test]
    fn button_plans_become_interactive_button_messages() {
        let plan = OutboundPlan::menu(
            "Add another item?",
            vec![
                MenuOption::new("add_item", "Add another item"),
                MenuOption::new("confirm", "Confirm"),
            ],
        );
        let payload = message_payload(&recipient(), &plan);

        assert_eq!(payload["type"], "interactive");
        assert_eq!(payload["interactive"]["type"], "button");
        assert_eq!(
            payload["interactive"]["action"]["buttons"][0]["reply"]["id"],
            "add_item"
        );
    }

    #[test]
    fn oversized_menus_become_list_messages() {
        let options =
            (0..6).map(|i| MenuOption::new(format!("opt_{i}"), format!("Option {i}"))).collect();
        let plan = OutboundPlan::menu("Pick one", options);
        let payload = message_payload(&recipient(), &plan);

        assert_eq!(payload["interactive"]["type"], "list");
        let rows = payload["interactive"]["action"]["sections"][0]["rows"]
            .as_array()
            .expect("rows array");
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn long_button_labels_are_truncated() {
        let plan = OutboundPlan::Buttons {
            body: "Pick".to_owned(),
            options: vec![MenuOption::new("x", "An exceedingly long button label indeed")],
        };
        let payload = message_payload(&recipient(), &plan);
        let title = payload["interactive"]["action"]["buttons"][0]["reply"]["title"]
            .as_str()
            .expect("title");
        assert!(title.chars().count() <= 20);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn document_plans_carry_link_and_filename() {
        let plan = OutboundPlan::document(
            "Receipt RCT-000007",
            "https://karani.example/documents/rct.pdf",
            "RCT-000007.pdf",
        );
        let payload = message_payload(&recipient(), &plan);
        assert_eq!(payload["type"], "document");
        assert_eq!(payload["document"]["filename"], "RCT-000007.pdf");
    }
}
