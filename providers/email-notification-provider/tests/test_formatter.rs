use email_notification_provider::{EmailConfig, EmailFormatter};
use notification_common::{MediaItem, NotificationContent, ProviderError, Recipient, TraceContext};

fn content(media: usize) -> NotificationContent {
    NotificationContent {
        subject: "Your photos from Spring Gala".to_string(),
        text_body: "Hi Ana".to_string(),
        html_body: "<html><body><p>Hi Ana</p></body></html>".to_string(),
        chat_text: "Hi Ana".to_string(),
        media: (0..media)
            .map(|i| MediaItem {
                url: format!("https://photos.example.com/photos/{}.jpg?a=1&b=2", i),
                caption: format!("Photo {}", i),
            })
            .collect(),
        trace: TraceContext {
            event_id: "evt-1".to_string(),
            guest_id: "guest-1".to_string(),
            match_count: 7,
        },
    }
}

fn recipient(email: Option<&str>) -> Recipient {
    Recipient {
        email: email.map(str::to_string),
        phone: None,
        display_name: "Ana".to_string(),
    }
}

#[test]
fn test_format_message_sets_trace_headers() {
    let formatter = EmailFormatter::new(&EmailConfig::default());
    let payload = formatter
        .format_message(&recipient(Some("ana@example.com")), &content(0))
        .unwrap();

    assert_eq!(payload.to, "ana@example.com");
    assert_eq!(payload.trace.event_id, "evt-1");
    assert_eq!(payload.trace.guest_id, "guest-1");
    assert_eq!(payload.trace.match_count, 7);

    let message = payload.to_message().unwrap();
    let headers = message.headers();
    assert_eq!(headers.get_raw("X-Event-Id"), Some("evt-1"));
    assert_eq!(headers.get_raw("X-Guest-Id"), Some("guest-1"));
    assert_eq!(headers.get_raw("X-Match-Count"), Some("7"));
}

#[test]
fn test_photo_strip_is_escaped_and_inside_body() {
    let config = EmailConfig {
        max_photos: 1,
        ..Default::default()
    };
    let formatter = EmailFormatter::new(&config);
    let payload = formatter
        .format_message(&recipient(Some("ana@example.com")), &content(3))
        .unwrap();

    assert!(payload.html_content.contains("0.jpg?a"));
    assert!(payload.html_content.contains("&amp;b"));
    assert!(!payload.html_content.contains("1.jpg"));
    assert!(payload.html_content.ends_with("</div></body></html>"));
}

#[test]
fn test_missing_email_is_malformed_payload() {
    let formatter = EmailFormatter::new(&EmailConfig::default());
    let err = formatter
        .format_message(&recipient(None), &content(0))
        .unwrap_err();
    assert!(matches!(err, ProviderError::MalformedPayload(_)));
}

#[test]
fn test_message_has_both_alternatives() {
    let formatter = EmailFormatter::new(&EmailConfig::default());
    let payload = formatter
        .format_message(&recipient(Some("ana@example.com")), &content(0))
        .unwrap();
    let mime = String::from_utf8(payload.to_message().unwrap().formatted()).unwrap();

    assert!(mime.contains("multipart/alternative"));
    assert!(mime.contains("Content-Type: text/plain"));
    assert!(mime.contains("Content-Type: text/html"));
    assert!(mime.contains("Subject: Your photos from Spring Gala"));
}

#[test]
fn test_invalid_recipient_address_is_malformed_payload() {
    let formatter = EmailFormatter::new(&EmailConfig::default());
    let payload = formatter
        .format_message(&recipient(Some("ana at example")), &content(0))
        .unwrap();

    assert!(matches!(
        payload.to_raw(),
        Err(ProviderError::MalformedPayload(_))
    ));
}
