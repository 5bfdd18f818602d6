//! Document rendering: tera HTML templates converted with wkhtmltopdf when
//! the binary is present, falling back to the HTML artifact itself. A
//! committed document with no artifact is a valid state; rendering is
//! re-attempted on the next delivery.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{info, warn};

use karani_core::domain::document::{Document, DocumentLine};
use karani_core::domain::tenant::Tenant;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMethod {
    Pdf,
    Html,
}

impl RenderMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Html => "html",
        }
    }
}

/// A publicly fetchable artifact for a committed document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedDocument {
    pub url: String,
    pub filename: String,
    pub method: RenderMethod,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        tenant: &Tenant,
        document: &Document,
        lines: &[DocumentLine],
    ) -> Result<RenderedDocument, RenderError>;
}

pub struct TeraRenderer {
    tera: Tera,
    output_dir: PathBuf,
    public_base_url: String,
    wkhtmltopdf_path: Option<String>,
}

impl TeraRenderer {
    pub fn new(
        template_dir: &str,
        output_dir: &str,
        public_base_url: &str,
    ) -> Result<Self, RenderError> {
        let tera = Tera::new(&format!("{template_dir}/**/*"))
            .map_err(|error| RenderError::Template(error.to_string()))?;
        Ok(Self::with_tera(tera, output_dir, public_base_url))
    }

    /// Template compiled into the binary, for tests and for deployments
    /// that ship no template directory.
    pub fn with_embedded_template(
        output_dir: &str,
        public_base_url: &str,
    ) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            "documents/document.html.tera",
            include_str!("../../../templates/documents/document.html.tera"),
        )
        .map_err(|error| RenderError::Template(error.to_string()))?;
        Ok(Self::with_tera(tera, output_dir, public_base_url))
    }

    fn with_tera(tera: Tera, output_dir: &str, public_base_url: &str) -> Self {
        let wkhtmltopdf_path =
            which::which("wkhtmltopdf").ok().map(|path| path.to_string_lossy().to_string());
        if wkhtmltopdf_path.is_none() {
            warn!("wkhtmltopdf not found in PATH; documents will be delivered as HTML");
        }

        Self {
            tera,
            output_dir: PathBuf::from(output_dir),
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
            wkhtmltopdf_path,
        }
    }

    fn build_context(tenant: &Tenant, document: &Document, lines: &[DocumentLine]) -> Context {
        let mut context = Context::new();
        context.insert(
            "document",
            &serde_json::json!({
                "number": document.number,
                "kind_label": document.kind.label(),
                "client_name": document.client_name,
                "issued_on": document.created_at.format("%e %B %Y").to_string(),
            }),
        );
        context.insert(
            "business",
            &serde_json::json!({
                "name": tenant.name,
                "currency": tenant.currency,
                "logo_url": tenant.logo_url,
            }),
        );
        let rendered_lines: Vec<serde_json::Value> = lines
            .iter()
            .map(|line| {
                serde_json::json!({
                    "description": line.description,
                    "quantity": line.quantity.normalize().to_string(),
                    "unit_price": line.unit_price.round_dp(2).to_string(),
                    "line_total": line.line_total.round_dp(2).to_string(),
                })
            })
            .collect();
        context.insert("lines", &rendered_lines);
        context.insert(
            "totals",
            &serde_json::json!({
                "subtotal": document.totals.subtotal.round_dp(2).to_string(),
                "discount": document.totals.discount.round_dp(2).to_string(),
                "has_discount": !document.totals.discount.is_zero(),
                "vat": document.totals.vat.round_dp(2).to_string(),
                "has_vat": !document.totals.vat.is_zero(),
                "total": document.totals.total.round_dp(2).to_string(),
            }),
        );
        context
    }

    async fn convert_to_pdf(
        &self,
        wkhtmltopdf: &str,
        html_path: &PathBuf,
        pdf_path: &PathBuf,
    ) -> Result<(), RenderError> {
        let output = Command::new(wkhtmltopdf)
            .arg("--page-size")
            .arg("A4")
            .arg("--encoding")
            .arg("utf-8")
            .arg("--quiet")
            .arg(html_path)
            .arg(pdf_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(RenderError::Conversion(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentRenderer for TeraRenderer {
    async fn render(
        &self,
        tenant: &Tenant,
        document: &Document,
        lines: &[DocumentLine],
    ) -> Result<RenderedDocument, RenderError> {
        let context = Self::build_context(tenant, document, lines);
        let html = self
            .tera
            .render("documents/document.html.tera", &context)
            .map_err(|error| RenderError::Template(error.to_string()))?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let html_name = format!("{}-{}.html", document.id, document.number);
        let html_path = self.output_dir.join(&html_name);
        tokio::fs::write(&html_path, &html).await?;

        if let Some(wkhtmltopdf) = &self.wkhtmltopdf_path {
            let pdf_name = format!("{}-{}.pdf", document.id, document.number);
            let pdf_path = self.output_dir.join(&pdf_name);
            match self.convert_to_pdf(wkhtmltopdf, &html_path, &pdf_path).await {
                Ok(()) => {
                    info!(number = %document.number, "document rendered as pdf");
                    return Ok(RenderedDocument {
                        url: format!("{}/documents/{pdf_name}", self.public_base_url),
                        filename: format!("{}.pdf", document.number),
                        method: RenderMethod::Pdf,
                    });
                }
                Err(error) => {
                    warn!(number = %document.number, error = %error, "pdf conversion failed, delivering html");
                }
            }
        }

        Ok(RenderedDocument {
            url: format!("{}/documents/{html_name}", self.public_base_url),
            filename: format!("{}.html", document.number),
            method: RenderMethod::Html,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use karani_core::dialog::session::DialogSession;
    use karani_core::domain::document::{
        Document, DocumentId, DocumentKind, DocumentLine, DocumentStatus, Totals,
    };
    use karani_core::domain::tenant::{Package, Tenant, TenantId};

    use super::{DocumentRenderer, RenderMethod, TeraRenderer};

    fn tenant() -> Tenant {
        Tenant {
            id: TenantId(Uuid::new_v4()),
            name: "Malaika Crafts".to_owned(),
            currency: "KES".to_owned(),
            package: Package::Starter,
            trial_ends_at: None,
            vat_rate: Decimal::ZERO,
            logo_url: None,
            invoice_seq: 1,
            quote_seq: 0,
            receipt_seq: 0,
            session: DialogSession::ready(),
            state_version: 0,
            created_at: Utc::now(),
        }
    }

    fn document(tenant: &Tenant) -> (Document, Vec<DocumentLine>) {
        let document = Document {
            id: DocumentId(Uuid::new_v4()),
            tenant_id: tenant.id,
            branch_id: None,
            kind: DocumentKind::Invoice,
            seq: 1,
            number: "INV-000001".to_owned(),
            client_id: None,
            client_name: "Wairimu".to_owned(),
            totals: Totals {
                subtotal: Decimal::from(3000),
                discount: Decimal::ZERO,
                vat: Decimal::ZERO,
                total: Decimal::from(3000),
            },
            status: DocumentStatus::Issued,
            draft_generation: Uuid::new_v4(),
            issued_by: "254722000001".to_owned(),
            artifact_url: None,
            created_at: Utc::now(),
        };
        let line = DocumentLine {
            id: Uuid::new_v4(),
            document_id: document.id,
            position: 0,
            description: "Beaded necklace".to_owned(),
            quantity: Decimal::from(2),
            unit_price: Decimal::from(1500),
            discount_pct: None,
            line_total: Decimal::from(3000),
        };
        (document, vec![line])
    }

    #[tokio::test]
    async fn renders_an_artifact_under_the_public_base_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = TeraRenderer::with_embedded_template(
            dir.path().to_str().expect("utf-8 path"),
            "https://karani.example",
        )
        .expect("renderer");

        let tenant = tenant();
        let (document, lines) = document(&tenant);
        let rendered = renderer.render(&tenant, &document, &lines).await.expect("render");

        assert!(rendered.url.starts_with("https://karani.example/documents/"));
        match rendered.method {
            RenderMethod::Pdf => assert!(rendered.filename.ends_with(".pdf")),
            RenderMethod::Html => assert!(rendered.filename.ends_with(".html")),
        }

        // The HTML artifact always exists, whichever method won.
        let html_name = format!("{}-{}.html", document.id, document.number);
        let html = std::fs::read_to_string(dir.path().join(html_name)).expect("artifact");
        assert!(html.contains("INV-000001"));
        assert!(html.contains("Beaded necklace"));
        assert!(html.contains("Malaika Crafts"));
    }
}
