use crate::config::EmailConfig;
use base64::{engine::general_purpose, Engine as _};
use handlebars::html_escape;
use lettre::message::header::{self, Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};
use notification_common::{
    provider_base::ProviderError, NotificationContent, Recipient, TraceContext,
};
use serde::{Deserialize, Serialize};

macro_rules! trace_header {
    ($name:ident, $header:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(pub String);

        impl Header for $name {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($header)
            }

            fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
                Ok(Self(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

trace_header!(XEventId, "X-Event-Id");
trace_header!(XGuestId, "X-Guest-Id");
trace_header!(XMatchCount, "X-Match-Count");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: String,
    pub to_name: String,
    pub from: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text_content: String,
    pub html_content: String,
    /// Written as the X-Event-Id, X-Guest-Id and X-Match-Count headers
    pub trace: TraceContext,
}

pub struct EmailFormatter {
    from: String,
    from_name: String,
    reply_to: Option<String>,
    max_photos: usize,
}

impl EmailFormatter {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            from: config.sender_email.clone(),
            from_name: config.sender_name.clone(),
            reply_to: config.reply_to.clone(),
            max_photos: config.max_photos,
        }
    }

    pub fn format_message(
        &self,
        recipient: &Recipient,
        content: &NotificationContent,
    ) -> Result<EmailPayload, ProviderError> {
        let to = recipient.email.clone().ok_or_else(|| {
            ProviderError::MalformedPayload("Recipient has no valid email address".to_string())
        })?;

        if content.subject.trim().is_empty() {
            return Err(ProviderError::MalformedPayload(
                "Email subject cannot be empty".to_string(),
            ));
        }

        let photos: Vec<_> = content.media.iter().take(self.max_photos).collect();

        let mut text_content = content.text_body.clone();
        let mut html_content = content.html_body.clone();
        if !photos.is_empty() {
            text_content.push_str("\n\nYour top photos:\n");
            for photo in &photos {
                text_content.push_str(&format!("- {}\n", photo.url));
            }

            let strip = photos
                .iter()
                .map(|photo| {
                    format!(
                        r#"<a href="{url}"><img src="{url}" alt="{alt}" width="180" style="margin: 4px; border-radius: 4px;"></a>"#,
                        url = html_escape(&photo.url),
                        alt = html_escape(&photo.caption)
                    )
                })
                .collect::<Vec<_>>()
                .join("");
            insert_before_body_end(&mut html_content, &format!(r#"<div class="photos">{}</div>"#, strip));
        }

        Ok(EmailPayload {
            to,
            to_name: recipient.display_name.clone(),
            from: self.from.clone(),
            from_name: self.from_name.clone(),
            reply_to: self.reply_to.clone(),
            subject: content.subject.clone(),
            text_content,
            html_content,
            trace: content.trace.clone(),
        })
    }
}

fn insert_before_body_end(html: &mut String, fragment: &str) {
    match html.rfind("</body>") {
        Some(index) => html.insert_str(index, fragment),
        None => html.push_str(fragment),
    }
}

/// Header values never carry line breaks
fn single_line(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .trim()
        .to_string()
}

fn mailbox(name: &str, address: &str) -> Result<Mailbox, ProviderError> {
    let parsed: Address = address.trim().parse().map_err(|e| {
        ProviderError::MalformedPayload(format!("Invalid email address '{}': {}", address, e))
    })?;
    let name = single_line(name);
    Ok(Mailbox::new((!name.is_empty()).then_some(name), parsed))
}

impl EmailPayload {
    /// RFC 5322 message with text and HTML alternatives
    pub fn to_message(&self) -> Result<Message, ProviderError> {
        let mut builder = Message::builder()
            .from(mailbox(&self.from_name, &self.from)?)
            .to(mailbox(&self.to_name, &self.to)?)
            .subject(single_line(&self.subject))
            .header(XEventId(single_line(&self.trace.event_id)))
            .header(XGuestId(single_line(&self.trace.guest_id)))
            .header(XMatchCount(self.trace.match_count.to_string()));

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(mailbox("", reply_to)?);
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(self.text_content.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(self.html_content.clone()),
                    ),
            )
            .map_err(|e| ProviderError::MalformedPayload(format!("Failed to build message: {}", e)))
    }

    /// Base64url-encoded message, as the send API expects
    pub fn to_raw(&self) -> Result<String, ProviderError> {
        let message = self.to_message()?;
        Ok(general_purpose::URL_SAFE.encode(message.formatted()))
    }
}
