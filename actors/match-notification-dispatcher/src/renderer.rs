//! Handlebars rendering of match notifications
//!
//! Plain-text templates (subject, text body, chat) are registered without HTML
//! escaping; the HTML body template keeps the default escaping.

use crate::config::ContactDefaults;
use handlebars::Handlebars;
use notification_common::{
    ContentRenderer, MediaItem, NotificationContent, NotificationJob, RenderError, TraceContext,
};
use serde_json::json;

const SUBJECT_TEMPLATE: &str =
    "{{name}}, we found {{count}} {{photo_word}} of you{{#if event_name}} at {{event_name}}{{/if}}";

const TEXT_TEMPLATE: &str = "Hi {{name}},

Good news! We found {{count}} {{photo_word}} of you{{#if event_name}} at {{event_name}}{{/if}}{{#if event_date}} ({{event_date}}){{/if}}.
Your best match scored {{best_percent}}%.

See your personal gallery: {{gallery_link}}

Questions? Write to {{support_email}} or visit {{website_url}}.
{{#if business_name}}
{{business_name}}
{{/if}}";

const HTML_TEMPLATE: &str = r#"<html>
<head>
    <style>
        body { font-family: Arial, sans-serif; padding: 20px; }
        .header { background-color: #f8f9fa; padding: 15px; border-radius: 5px; }
        .content { margin: 20px 0; }
        .cta { display: inline-block; padding: 10px 20px; background-color: #007bff; color: white; text-decoration: none; border-radius: 4px; }
        .footer { color: #6c757d; font-size: 12px; margin-top: 30px; }
    </style>
</head>
<body>
    <div class="header">
        {{#if business_logo_url}}<img src="{{business_logo_url}}" alt="{{business_name}}" height="40">{{/if}}
        <h2>{{count}} {{photo_word}} of you{{#if event_name}} at {{event_name}}{{/if}}</h2>
    </div>
    <div class="content">
        <p>Hi {{name}},</p>
        <p>We found {{count}} {{photo_word}} of you. Your best match scored {{best_percent}}%.</p>
        <p><a class="cta" href="{{gallery_link}}">View your gallery</a></p>
    </div>
    <div class="footer">
        <p>Questions? Contact <a href="mailto:{{support_email}}">{{support_email}}</a> or visit <a href="{{website_url}}">{{website_url}}</a>.</p>
    </div>
</body>
</html>"#;

const CHAT_TEMPLATE: &str = "Hi {{name}}! 📸 We found {{count}} {{photo_word}} of you{{#if event_name}} at {{event_name}}{{/if}}.
See them all here: {{gallery_link}}";

pub struct MatchContentRenderer {
    plain: Handlebars<'static>,
    html: Handlebars<'static>,
    contact: ContactDefaults,
}

impl MatchContentRenderer {
    pub fn new(contact: ContactDefaults) -> Result<Self, RenderError> {
        let mut plain = Handlebars::new();
        plain.register_escape_fn(handlebars::no_escape);
        for (name, template) in [
            ("subject", SUBJECT_TEMPLATE),
            ("text", TEXT_TEMPLATE),
            ("chat", CHAT_TEMPLATE),
        ] {
            plain
                .register_template_string(name, template)
                .map_err(|e| RenderError(format!("template {}: {}", name, e)))?;
        }

        let mut html = Handlebars::new();
        html.register_template_string("html", HTML_TEMPLATE)
            .map_err(|e| RenderError(format!("template html: {}", e)))?;

        Ok(Self {
            plain,
            html,
            contact,
        })
    }
}

fn percent(score: f64) -> u32 {
    (score * 100.0).round() as u32
}

impl ContentRenderer for MatchContentRenderer {
    fn render(&self, job: &NotificationJob) -> Result<NotificationContent, RenderError> {
        let summary = &job.match_summary;
        let presentation = &job.presentation;
        let gallery_link = job.gallery_link();

        let context = json!({
            "name": job.recipient.display_name,
            "count": summary.total_matches,
            "photo_word": if summary.total_matches == 1 { "photo" } else { "photos" },
            "best_percent": percent(summary.best_score),
            "event_name": presentation.event_name,
            "event_date": presentation.event_date,
            "business_name": presentation.business_name,
            "business_logo_url": presentation.business_logo_url,
            "gallery_link": gallery_link,
            "support_email": self.contact.support_email,
            "website_url": self.contact.website_url,
        });

        let render_plain = |name: &str| {
            self.plain
                .render(name, &context)
                .map_err(|e| RenderError(format!("{}: {}", name, e)))
        };

        let media = summary
            .top_matches
            .iter()
            .enumerate()
            .map(|(index, photo)| MediaItem {
                url: photo.media_url(&presentation.gallery_link_base),
                caption: format!("Photo {} ({}% match)", index + 1, percent(photo.score)),
            })
            .collect();

        Ok(NotificationContent {
            subject: render_plain("subject")?,
            text_body: render_plain("text")?,
            html_body: self
                .html
                .render("html", &context)
                .map_err(|e| RenderError(format!("html: {}", e)))?,
            chat_text: render_plain("chat")?,
            media,
            trace: TraceContext {
                event_id: job.event_id.clone(),
                guest_id: job.guest_id.clone(),
                match_count: summary.total_matches,
            },
        })
    }
}
