use email_materialize::*;
use serde_json::json;

// --- ObjectLocation ---

#[test]
fn test_location_uri() {
    let loc = ObjectLocation::new("mail", "inbox/abc");
    assert_eq!(loc.uri("s3"), "s3://mail/inbox/abc");
    assert_eq!(loc.to_string(), "mail/inbox/abc");
}

#[test]
fn test_location_file_name() {
    assert_eq!(ObjectLocation::new("mail", "inbox/2025/msg-7").file_name(), "msg-7");
    assert_eq!(ObjectLocation::new("mail", "flat").file_name(), "flat");
}

// --- MessageRequest ---

#[test]
fn test_request_validate() {
    let loc = MessageRequest::new("mail", "inbox/abc").validate().unwrap();
    assert_eq!(loc, ObjectLocation::new("mail", "inbox/abc"));
}

#[test]
fn test_request_missing_fields() {
    let missing_container = MessageRequest {
        container: None,
        key: Some("inbox/abc".into()),
    };
    let err = missing_container.validate().unwrap_err();
    assert!(matches!(err, ProcessError::InvalidInput(ref m) if m.contains("container")));

    let missing_key = MessageRequest {
        container: Some("mail".into()),
        key: None,
    };
    let err = missing_key.validate().unwrap_err();
    assert!(matches!(err, ProcessError::InvalidInput(ref m) if m.contains("key")));
}

#[test]
fn test_request_empty_fields() {
    assert!(MessageRequest::new("", "inbox/abc").validate().is_err());
    assert!(MessageRequest::new("mail", "").validate().is_err());
}

// --- MessageId ---

#[test]
fn test_message_id_from_header() {
    let id = MessageId::from_header("  <abc@example.com> ").unwrap();
    assert_eq!(id.as_str(), "abc@example.com");
    assert_eq!(id.to_string(), "abc@example.com");
}

#[test]
fn test_message_id_from_blank_header() {
    assert!(MessageId::from_header("<>").is_none());
    assert!(MessageId::from_header("   ").is_none());
}

#[test]
fn test_message_id_from_source() {
    let id = MessageId::from_source(&ObjectLocation::new("mail", "inbox/abc123"));
    assert_eq!(id.as_str(), "abc123");
}

#[test]
fn test_message_id_serializes_as_string() {
    let id = MessageId::from_header("<x@y>").unwrap();
    assert_eq!(serde_json::to_value(&id).unwrap(), json!("x@y"));
}

// --- EmailAddress ---

#[test]
fn test_email_address_display() {
    let named = EmailAddress::new(Some("John Doe".into()), "john@example.com");
    assert_eq!(named.to_string(), "John Doe <john@example.com>");

    let bare = EmailAddress::new(Some("  ".into()), "anon@example.com");
    assert!(bare.name.is_none());
    assert_eq!(bare.to_string(), "anon@example.com");
}

fn parse_list(value: &str) -> Vec<EmailAddress> {
    EmailAddress::from_addr_list(&mailparse::addrparse(value).unwrap())
}

#[test]
fn test_email_address_from_addr_list() {
    let list = parse_list("Alice <alice@x.test>, bob@x.test");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name.as_deref(), Some("Alice"));
    assert_eq!(list[0].address, "alice@x.test");
    assert!(list[1].name.is_none());
    assert_eq!(list[1].address, "bob@x.test");
}

#[test]
fn test_email_address_parse_group() {
    let list = parse_list("Team: one@x.test, two@x.test;");
    let addresses: Vec<&str> = list.iter().map(|a| a.address.as_str()).collect();
    assert_eq!(addresses, ["one@x.test", "two@x.test"]);
}

// --- ResultDocument ---

#[test]
fn test_result_document_json_shape() {
    let doc = ResultDocument {
        result: Status::Ok,
        message_id: MessageId::from_source(&ObjectLocation::new("mail", "inbox/abc")),
        payload_uri: "s3://mail/inbox/abc".into(),
        from: "a@x.test".into(),
        to: vec!["b@x.test".into()],
        cc: Vec::new(),
        bcc: Vec::new(),
        recipients: vec!["b@x.test".into()],
        subject: None,
        date: None,
        text: None,
        content: ContentMap::default(),
    };

    let value = doc.to_json().unwrap();
    assert_eq!(value["result"], "OK");
    assert_eq!(value["message_id"], "abc");
    assert!(value["subject"].is_null());
    assert!(value["date"].is_null());
    assert_eq!(value["content"], json!({ "attachments": [] }));
}

#[test]
fn test_content_map_mode_from_str() {
    let mode: ContentMapMode = serde_json::from_value(json!("per_part")).unwrap();
    assert_eq!(mode, ContentMapMode::PerPart);
    assert_eq!(ContentMapMode::default(), ContentMapMode::Canonical);
}

// --- ObjectCreatedEvent ---

#[test]
fn test_event_to_request() {
    let event = ObjectCreatedEvent::from_json(json!({
        "version": "0",
        "detail": {
            "bucket": { "name": "mail" },
            "object": { "key": "inbox/abc", "size": 512, "etag": "x" }
        }
    }))
    .unwrap();

    assert_eq!(event.detail.as_ref().unwrap().object.as_ref().unwrap().size, Some(512));
    let request: MessageRequest = event.into();
    assert_eq!(request, MessageRequest::new("mail", "inbox/abc"));
}

#[test]
fn test_malformed_event_is_invalid_input() {
    let err = ObjectCreatedEvent::from_json(json!({ "detail": "not an object" })).unwrap_err();
    assert!(matches!(err, ProcessError::InvalidInput(_)));
    assert!(err.is_validation());
}

#[test]
fn test_event_without_detail() {
    let event = ObjectCreatedEvent::from_json(json!({})).unwrap();
    let request = event.to_request();
    assert!(request.container.is_none());
    assert!(request.key.is_none());
    assert!(request.validate().is_err());
}
