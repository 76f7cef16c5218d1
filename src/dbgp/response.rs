//! DBGP response encoding
//!
//! Every reply is a `<response>` envelope carrying the command name and the
//! transaction id of the request, plus command specific attributes and an
//! optional payload. Attributes are written in a fixed order: `xmlns`,
//! `command`, `transaction_id`, then the extras in the order given.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::common::{Error, ProtocolError, Result};

use super::types::{Context, InitResponse, Property, Stack};

/// DBGP namespace
pub const XMLNS: &str = "urn:debugger_protocol_v1";

/// Protocol version announced in the init handshake
pub const PROTOCOL_VERSION: &str = "1.0";

/// Body of a response envelope
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Empty,
    Stack(&'a [Stack]),
    Contexts(&'a [Context]),
    Properties(&'a [Property]),
    /// Escaped text content
    Text(&'a str),
    /// Pre-escaped markup, written verbatim
    Raw(&'a str),
    Error(&'a ProtocolError),
}

/// Encode the init handshake
pub fn encode_init(init: &InitResponse) -> Result<String> {
    let mut w = Writer::new(Vec::new());
    write_element(
        &mut w,
        "init",
        &[
            ("xmlns", XMLNS),
            ("appid", init.app_id.as_str()),
            ("idekey", init.ide_key.as_str()),
            ("session", init.session.as_str()),
            ("thread", init.thread.as_str()),
            ("parent", init.parent.as_str()),
            ("language", init.language.as_str()),
            ("protocol_version", PROTOCOL_VERSION),
            ("fileuri", init.file_uri.as_str()),
        ],
        None,
    )?;
    finish(w)
}

/// Encode a response envelope
pub fn encode_response(
    command: &str,
    transaction_id: i64,
    attrs: &[(&str, String)],
    payload: Payload<'_>,
) -> Result<String> {
    let mut w = Writer::new(Vec::new());

    let txn = transaction_id.to_string();
    let mut start = BytesStart::new("response");
    start.push_attribute(("xmlns", XMLNS));
    start.push_attribute(("command", command));
    start.push_attribute(("transaction_id", txn.as_str()));
    for (key, value) in attrs {
        start.push_attribute((*key, value.as_str()));
    }

    if matches!(payload, Payload::Empty) {
        write_event(&mut w, Event::Empty(start))?;
        return finish(w);
    }

    write_event(&mut w, Event::Start(start))?;
    write_payload(&mut w, payload)?;
    write_event(&mut w, Event::End(BytesEnd::new("response")))?;
    finish(w)
}

/// Encode an error envelope for a failed command
///
/// Errors without a protocol code of their own are reported as code 999.
pub fn encode_error(command: &str, transaction_id: i64, error: &Error) -> Result<String> {
    let proto = ProtocolError::from(error);
    encode_response(command, transaction_id, &[], Payload::Error(&proto))
}

fn write_payload(w: &mut Writer<Vec<u8>>, payload: Payload<'_>) -> Result<()> {
    match payload {
        Payload::Empty => {}
        Payload::Stack(frames) => {
            for frame in frames {
                let level = frame.level.to_string();
                let frame_type = frame.frame_type.to_string();
                let line = frame.line.to_string();
                let mut attrs = vec![
                    ("level", level.as_str()),
                    ("type", frame_type.as_str()),
                    ("filename", frame.filename.as_str()),
                    ("lineno", line.as_str()),
                ];
                if let Some(r#where) = &frame.r#where {
                    attrs.push(("where", r#where.as_str()));
                }
                write_element(w, "stack", &attrs, None)?;
            }
        }
        Payload::Contexts(contexts) => {
            for context in contexts {
                let id = context.id.to_string();
                write_element(
                    w,
                    "context",
                    &[("name", context.name.as_str()), ("id", id.as_str())],
                    None,
                )?;
            }
        }
        Payload::Properties(properties) => {
            for property in properties {
                write_property(w, property)?;
            }
        }
        Payload::Text(text) => {
            write_event(w, Event::Text(BytesText::new(text)))?;
        }
        Payload::Raw(raw) => {
            w.get_mut().extend_from_slice(raw.as_bytes());
        }
        Payload::Error(error) => {
            let code = error.code.to_string();
            write_event(
                w,
                Event::Start(BytesStart::new("error").with_attributes([("code", code.as_str())])),
            )?;
            write_element(w, "message", &[], Some(error.message.as_str()))?;
            write_event(w, Event::End(BytesEnd::new("error")))?;
        }
    }
    Ok(())
}

fn write_property(w: &mut Writer<Vec<u8>>, property: &Property) -> Result<()> {
    let num_children = property.num_children.map(|n| n.to_string());

    let mut attrs = vec![
        ("name", property.name.as_str()),
        ("fullname", property.full_name.as_str()),
    ];
    if let Some(class_name) = &property.class_name {
        attrs.push(("classname", class_name.as_str()));
    }
    if !property.data_type.is_empty() {
        attrs.push(("type", property.data_type.as_str()));
    }
    if let Some(address) = &property.address {
        attrs.push(("address", address.as_str()));
    }
    if property.children {
        attrs.push(("children", "1"));
    }
    if let Some(n) = &num_children {
        attrs.push(("numchildren", n.as_str()));
    }

    write_element(w, "property", &attrs, property.value.as_deref())
}

/// Write `<name attrs/>`, or `<name attrs>text</name>` when text is given
fn write_element(
    w: &mut Writer<Vec<u8>>,
    name: &str,
    attrs: &[(&str, &str)],
    text: Option<&str>,
) -> Result<()> {
    let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
    match text {
        None => write_event(w, Event::Empty(start)),
        Some(text) => {
            write_event(w, Event::Start(start))?;
            write_event(w, Event::Text(BytesText::new(text)))?;
            write_event(w, Event::End(BytesEnd::new(name)))
        }
    }
}

fn write_event(w: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    w.write_event(event).map_err(|e| Error::Xml(e.to_string()))
}

fn finish(w: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(w.into_inner()).map_err(|e| Error::Xml(format!("invalid UTF-8: {}", e)))
}
