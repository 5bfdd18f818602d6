//! The outbound dispatcher: fan a turn's plans out to whichever transport
//! the turn arrived on, and run the post-acknowledgement work (render the
//! committed document, then deliver the link). Send failures are logged
//! and swallowed; by the time this runs the webhook has already been
//! acknowledged and all state is durable.

use std::sync::Arc;

use tracing::{error, info, warn};

use karani_core::dialog::outbound::OutboundPlan;
use karani_core::domain::document::DocumentId;
use karani_core::msisdn::Msisdn;
use karani_transport::inbound::Transport;
use karani_transport::sender::MessageSender;

use crate::engine::{Deps, TurnReply};
use crate::renderer::DocumentRenderer;

pub struct Dispatcher {
    twilio: Option<Arc<dyn MessageSender>>,
    whatsapp: Option<Arc<dyn MessageSender>>,
    renderer: Arc<dyn DocumentRenderer>,
}

impl Dispatcher {
    pub fn new(
        twilio: Option<Arc<dyn MessageSender>>,
        whatsapp: Option<Arc<dyn MessageSender>>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self { twilio, whatsapp, renderer }
    }

    fn sender_for(&self, transport: Transport) -> Option<&Arc<dyn MessageSender>> {
        match transport {
            Transport::Twilio => self.twilio.as_ref(),
            Transport::Whatsapp => self.whatsapp.as_ref(),
        }
    }

    /// Deliver one turn's replies, then render and deliver the committed
    /// document if there is one. Runs detached, after the webhook ack.
    pub async fn deliver(&self, deps: &Deps, reply: TurnReply) {
        self.notify(reply.transport, &reply.to, &reply.plans).await;

        if let Some(document_id) = reply.render {
            self.render_and_deliver(deps, reply.transport, &reply.to, document_id).await;
        }
    }

    pub async fn notify(&self, transport: Transport, to: &Msisdn, plans: &[OutboundPlan]) {
        let Some(sender) = self.sender_for(transport) else {
            warn!(transport = transport.as_str(), "no sender configured; dropping replies");
            return;
        };

        for plan in plans {
            if let Err(send_error) = sender.send(to, plan).await {
                error!(
                    transport = transport.as_str(),
                    to = %to,
                    error = %send_error,
                    "outbound send failed"
                );
            }
        }
    }

    async fn render_and_deliver(
        &self,
        deps: &Deps,
        transport: Transport,
        to: &Msisdn,
        document_id: DocumentId,
    ) {
        let loaded = async {
            let document = deps.documents.find(&document_id).await?;
            let lines = deps.documents.list_lines(&document_id).await?;
            Ok::<_, karani_db::repositories::RepositoryError>((document, lines))
        }
        .await;

        let (document, lines) = match loaded {
            Ok((Some(document), lines)) => (document, lines),
            Ok((None, _)) => {
                warn!(document_id = %document_id, "committed document vanished before rendering");
                return;
            }
            Err(repo_error) => {
                error!(document_id = %document_id, error = %repo_error, "could not load document for rendering");
                return;
            }
        };

        let tenant = match deps.tenants.find(&document.tenant_id).await {
            Ok(Some(tenant)) => tenant,
            _ => {
                warn!(document_id = %document_id, "tenant missing for committed document");
                return;
            }
        };

        match self.renderer.render(&tenant, &document, &lines).await {
            Ok(rendered) => {
                if let Err(repo_error) =
                    deps.documents.update_artifact(&document.id, &rendered.url).await
                {
                    error!(document_id = %document_id, error = %repo_error, "could not store artifact url");
                }
                info!(
                    number = %document.number,
                    method = rendered.method.as_str(),
                    "document rendered and on its way"
                );
                let plan = OutboundPlan::document(
                    format!("{} {}", document.kind.label(), document.number),
                    rendered.url,
                    rendered.filename,
                );
                self.notify(transport, to, &[plan]).await;
            }
            Err(render_error) => {
                // The document stays committed; delivery degrades.
                error!(
                    number = %document.number,
                    error = %render_error,
                    "rendering failed; document remains committed"
                );
                let plan = OutboundPlan::text(format!(
                    "{} {} is saved, but the document file isn't ready yet. It will be available shortly.",
                    document.kind.label(),
                    document.number
                ));
                self.notify(transport, to, &[plan]).await;
            }
        }
    }
}
