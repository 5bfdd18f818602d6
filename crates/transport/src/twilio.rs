use async_trait::async_trait;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use tracing::debug;

use karani_core::config::TwilioConfig;
use karani_core::dialog::action::RawInput;
use karani_core::dialog::outbound::OutboundPlan;
use karani_core::msisdn::Msisdn;

use crate::inbound::{InboundEvent, Transport};
use crate::sender::{MessageSender, SendError};

type HmacSha1 = Hmac<Sha1>;

/// Verify the `X-Twilio-Signature` header: base64 HMAC-SHA1 over the full
/// webhook URL followed by every form parameter key and value in sorted key
/// order, keyed by the account auth token.
pub fn verify_signature(
    auth_token: &SecretString,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut payload = url.to_owned();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }

    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    // Both sides are fixed-length base64 of a MAC, so a plain comparison
    // does not leak anything useful.
    expected == signature
}

/// Lift the form payload into the canonical inbound shape. `MediaUrl0`
/// (image attachment) wins over the body; everything else is plain text.
pub fn parse_form(params: &[(String, String)]) -> Option<InboundEvent> {
    let field = |name: &str| {
        params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    };

    let from = field("From")?.to_owned();
    let input = match field("MediaUrl0") {
        Some(media) if !media.is_empty() => RawInput::Media { reference: media.to_owned() },
        _ => RawInput::Text(field("Body").unwrap_or_default().to_owned()),
    };

    Some(InboundEvent { transport: Transport::Twilio, from, input })
}

/// A plan flattened to what SMS/WhatsApp-via-Twilio can carry: one text
/// body, plus a media URL for document links. Menus become numbered lines,
/// which is what the numbered-reply maps on the inbound side resolve
/// against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedSms {
    pub body: String,
    pub media_url: Option<String>,
}

pub fn render_plan(plan: &OutboundPlan) -> RenderedSms {
    match plan {
        OutboundPlan::Text { body } => RenderedSms { body: body.clone(), media_url: None },
        OutboundPlan::Buttons { body, options } | OutboundPlan::List { body, options, .. } => {
            let mut lines = vec![body.clone()];
            for (index, option) in options.iter().enumerate() {
                lines.push(format!("{}. {}", index + 1, option.label));
            }
            RenderedSms { body: lines.join("\n"), media_url: None }
        }
        OutboundPlan::Document { caption, link, .. } => {
            RenderedSms { body: caption.clone(), media_url: Some(link.clone()) }
        }
    }
}

pub struct TwilioSender {
    http: reqwest::Client,
    account_sid: String,
    auth_token: SecretString,
    from_number: String,
    api_base: String,
}

impl TwilioSender {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl MessageSender for TwilioSender {
    async fn send(&self, to: &Msisdn, plan: &OutboundPlan) -> Result<(), SendError> {
        let rendered = render_plan(plan);
        let endpoint =
            format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, self.account_sid);

        let mut form = vec![
            ("To".to_owned(), to.to_e164()),
            ("From".to_owned(), self.from_number.clone()),
            ("Body".to_owned(), rendered.body),
        ];
        if let Some(media_url) = rendered.media_url {
            form.push(("MediaUrl".to_owned(), media_url));
        }

        let response = self
            .http
            .post(&endpoint)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected { status: status.as_u16(), body });
        }

        debug!(to = %to, "twilio message accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use karani_core::dialog::action::RawInput;
    use karani_core::dialog::outbound::{MenuOption, OutboundPlan};

    use super::{parse_form, render_plan, verify_signature, Transport};

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    fn sign(token: &str, url: &str, sorted_concat: &str) -> String {
        let mut mac =
            <hmac::Hmac<sha1::Sha1> as hmac::Mac>::new_from_slice(token.as_bytes()).expect("key");
        hmac::Mac::update(&mut mac, format!("{url}{sorted_concat}").as_bytes());
        base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            hmac::Mac::finalize(mac).into_bytes(),
        )
    }

    #[test]
    fn signature_accepts_the_sorted_key_value_payload() {
        let url = "https://karani.example/webhooks/twilio";
        // Deliberately unsorted; verification must sort by key first.
        let form = params(&[("From", "+254722000001"), ("Body", "1")]);
        let token = "secret-token".to_string().into();
        let signature = sign("secret-token", url, "Body1From+254722000001");

        assert!(verify_signature(&token, url, &form, &signature));
    }

    #[test]
    fn signature_rejects_tampering_anywhere() {
        let url = "https://karani.example/webhooks/twilio";
        let form = params(&[("From", "+254722000001"), ("Body", "1")]);
        let token = "secret-token".to_string().into();
        let signature = sign("secret-token", url, "Body1From+254722000001");

        let tampered_body = params(&[("From", "+254722000001"), ("Body", "2")]);
        assert!(!verify_signature(&token, url, &tampered_body, &signature));
        assert!(!verify_signature(&token, "https://elsewhere.example/x", &form, &signature));
        let wrong_token = "other-token".to_string().into();
        assert!(!verify_signature(&wrong_token, url, &form, &signature));
    }

    #[test]
    fn form_with_body_becomes_text_input() {
        let event = parse_form(&params(&[
            ("From", "whatsapp:+254722000001"),
            ("Body", "record payment"),
        ]))
        .expect("event");

        assert_eq!(event.transport, Transport::Twilio);
        assert_eq!(event.from, "whatsapp:+254722000001");
        assert_eq!(event.input, RawInput::Text("record payment".to_owned()));
    }

    #[test]
    fn form_with_media_becomes_media_input() {
        let event = parse_form(&params(&[
            ("From", "+254722000001"),
            ("Body", ""),
            ("MediaUrl0", "https://api.twilio.com/media/ME123"),
        ]))
        .expect("event");

        assert_eq!(
            event.input,
            RawInput::Media { reference: "https://api.twilio.com/media/ME123".to_owned() }
        );
    }

    #[test]
    fn form_without_sender_is_dropped() {
        assert_eq!(parse_form(&params(&[("Body", "hello")])), None);
    }

    #[test]
    fn menus_render_as_numbered_lines() {
        let plan = OutboundPlan::menu(
            "What would you like to do?",
            vec![
                MenuOption::new("new_invoice", "New invoice"),
                MenuOption::new("record_payment", "Record payment"),
            ],
        );
        let rendered = render_plan(&plan);
        assert_eq!(rendered.body, "What would you like to do?\n1. New invoice\n2. Record payment");
        assert_eq!(rendered.media_url, None);
    }

    #[test]
    fn documents_render_as_caption_plus_media() {
        let plan = OutboundPlan::document(
            "Invoice INV-000001",
            "https://karani.example/documents/inv.pdf",
            "INV-000001.pdf",
        );
        let rendered = render_plan(&plan);
        assert_eq!(rendered.body, "Invoice INV-000001");
        assert_eq!(
            rendered.media_url.as_deref(),
            Some("https://karani.example/documents/inv.pdf")
        );
    }
}
