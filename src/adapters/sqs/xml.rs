//! Readers for the XML documents SQS answers with.

use crate::utils::error::{DataSourceError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub message_id: String,
    pub receipt_handle: String,
    pub md5_of_body: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

enum Node<'a> {
    Open(&'a [String]),
    Close(&'a [String], &'a str),
}

fn walk(xml: &str, mut visit: impl FnMut(Node<'_>)) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text.clear();
                visit(Node::Open(&path));
            }
            Ok(Event::Empty(ref e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                visit(Node::Open(&path));
                visit(Node::Close(&path, ""));
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                let unescaped = e.unescape().map_err(|err| DataSourceError::XmlError {
                    message: format!("bad text content: {}", err),
                })?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(_)) => {
                visit(Node::Close(&path, &text));
                text.clear();
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DataSourceError::XmlError {
                    message: format!("at position {}: {}", reader.buffer_position(), e),
                })
            }
            _ => {}
        }
    }
    Ok(())
}

fn parent_is(path: &[String], name: &str) -> bool {
    path.len() >= 2 && path[path.len() - 2] == name
}

fn leaf(path: &[String]) -> &str {
    path.last().map(String::as_str).unwrap_or("")
}

pub fn parse_queue_urls(xml: &str) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    walk(xml, |node| {
        if let Node::Close(path, text) = node {
            if leaf(path) == "QueueUrl" {
                urls.push(text.trim().to_string());
            }
        }
    })?;
    Ok(urls)
}

/// Text of the first element named `element` directly under `parent`.
pub fn parse_value(xml: &str, parent: &str, element: &str) -> Result<Option<String>> {
    let mut found = None;
    walk(xml, |node| {
        if let Node::Close(path, text) = node {
            if found.is_none() && leaf(path) == element && parent_is(path, parent) {
                found = Some(text.trim().to_string());
            }
        }
    })?;
    Ok(found)
}

pub fn parse_attributes(xml: &str) -> Result<HashMap<String, String>> {
    let mut attributes = HashMap::new();
    let mut pending_name: Option<String> = None;
    walk(xml, |node| {
        if let Node::Close(path, text) = node {
            if !parent_is(path, "Attribute") {
                return;
            }
            match leaf(path) {
                "Name" => pending_name = Some(text.trim().to_string()),
                "Value" => {
                    if let Some(name) = pending_name.take() {
                        attributes.insert(name, text.to_string());
                    }
                }
                _ => {}
            }
        }
    })?;
    Ok(attributes)
}

pub fn parse_messages(xml: &str) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    let mut current: Option<Message> = None;
    let mut pending_name: Option<String> = None;

    walk(xml, |node| match node {
        Node::Open(path) => {
            if leaf(path) == "Message" && parent_is(path, "ReceiveMessageResult") {
                current = Some(Message::default());
            }
        }
        Node::Close(path, text) => {
            let Some(message) = current.as_mut() else {
                return;
            };
            if parent_is(path, "Attribute") {
                match leaf(path) {
                    "Name" => pending_name = Some(text.trim().to_string()),
                    "Value" => {
                        if let Some(name) = pending_name.take() {
                            message.attributes.insert(name, text.to_string());
                        }
                    }
                    _ => {}
                }
                return;
            }
            if !parent_is(path, "Message") {
                if leaf(path) == "Message" {
                    if let Some(done) = current.take() {
                        messages.push(done);
                    }
                }
                return;
            }
            match leaf(path) {
                "MessageId" => message.message_id = text.trim().to_string(),
                "ReceiptHandle" => message.receipt_handle = text.trim().to_string(),
                "MD5OfBody" => message.md5_of_body = text.trim().to_string(),
                "Body" => message.body = text.to_string(),
                _ => {}
            }
        }
    })?;
    Ok(messages)
}

pub fn parse_error(xml: &str) -> Option<ErrorDetail> {
    let code = parse_value(xml, "Error", "Code").ok().flatten()?;
    let message = parse_value(xml, "Error", "Message")
        .ok()
        .flatten()
        .unwrap_or_default();
    Some(ErrorDetail { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECEIVE: &str = r#"<?xml version="1.0"?>
<ReceiveMessageResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/">
  <ReceiveMessageResult>
    <Message>
      <MessageId>5fea7756-0ea4-451a-a703-a558b933e274</MessageId>
      <ReceiptHandle>MbZj6wDWli+JvwwJaBV+3dcjk2YW2vA3+STFFljTM8tJJg6HRG6PYSasuWXPJB+Cw</ReceiptHandle>
      <MD5OfBody>fafb00f5732ab283681e124bf8747ed1</MD5OfBody>
      <Body>This is a test &amp; more</Body>
      <Attribute><Name>SenderId</Name><Value>195004372649</Value></Attribute>
      <Attribute><Name>SentTimestamp</Name><Value>1238099229000</Value></Attribute>
    </Message>
    <Message>
      <MessageId>second</MessageId>
      <ReceiptHandle>handle-2</ReceiptHandle>
      <MD5OfBody>abc</MD5OfBody>
      <Body>{"n":2}</Body>
    </Message>
  </ReceiveMessageResult>
  <ResponseMetadata><RequestId>b6633655-283d-45b4-aee4-4e84e0ae6afa</RequestId></ResponseMetadata>
</ReceiveMessageResponse>"#;

    #[test]
    fn test_parse_messages() {
        let messages = parse_messages(RECEIVE).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, "5fea7756-0ea4-451a-a703-a558b933e274");
        assert_eq!(messages[0].body, "This is a test & more");
        assert_eq!(messages[0].attributes.get("SenderId").unwrap(), "195004372649");
        assert_eq!(messages[1].receipt_handle, "handle-2");
        assert_eq!(messages[1].body, r#"{"n":2}"#);
    }

    #[test]
    fn test_parse_queue_urls() {
        let xml = r#"<ListQueuesResponse><ListQueuesResult>
            <QueueUrl>https://sqs.us-east-1.amazonaws.com/123456789012/orders</QueueUrl>
            <QueueUrl>https://sqs.us-east-1.amazonaws.com/123456789012/events</QueueUrl>
        </ListQueuesResult></ListQueuesResponse>"#;
        let urls = parse_queue_urls(xml).unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[1].ends_with("/events"));
    }

    #[test]
    fn test_parse_error() {
        let xml = r#"<ErrorResponse><Error><Type>Sender</Type>
            <Code>AWS.SimpleQueueService.NonExistentQueue</Code>
            <Message>The specified queue does not exist.</Message><Detail/></Error>
            <RequestId>42</RequestId></ErrorResponse>"#;
        let detail = parse_error(xml).unwrap();
        assert_eq!(detail.code, "AWS.SimpleQueueService.NonExistentQueue");
        assert_eq!(detail.message, "The specified queue does not exist.");
        assert!(parse_error("not xml at all").is_none());
    }

    #[test]
    fn test_parse_attributes() {
        let xml = r#"<GetQueueAttributesResponse><GetQueueAttributesResult>
            <Attribute><Name>ApproximateNumberOfMessages</Name><Value>7</Value></Attribute>
            <Attribute><Name>VisibilityTimeout</Name><Value>30</Value></Attribute>
        </GetQueueAttributesResult></GetQueueAttributesResponse>"#;
        let attributes = parse_attributes(xml).unwrap();
        assert_eq!(attributes.get("ApproximateNumberOfMessages").unwrap(), "7");
        assert_eq!(attributes.len(), 2);
    }
}
