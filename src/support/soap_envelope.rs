//! OCPP-S (SOAP) envelope handling
//!
//! OCPP 1.5 stations speak SOAP over HTTP. This module parses an inbound
//! envelope into a namespace-agnostic element tree plus the WS-Addressing
//! header fields the core cares about (`chargeBoxIdentity`, `Action`,
//! `MessageID`, `From/Address`), and renders response envelopes.
//!
//! Only local element names are matched; the various vendor namespace
//! prefixes (`soap:`, `SOAP-ENV:`, `cs:`, `wsa5:`, ...) are ignored.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::errors::InfraError;

/// A parsed XML element: local name, attributes, text, children.
#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text content of the first child with the given name.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim()).filter(|t| !t.is_empty())
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse an XML document into its root element.
    pub fn parse(xml: &str) -> Result<XmlElement, InfraError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    let mut element = XmlElement {
                        name: local_name(start.name().as_ref()),
                        ..Default::default()
                    };
                    for attr in start.attributes().flatten() {
                        let key = local_name(attr.key.as_ref());
                        let value = attr
                            .unescape_value()
                            .map_err(|e| InfraError::Xml(e.to_string()))?
                            .into_owned();
                        element.attributes.push((key, value));
                    }
                    stack.push(element);
                }
                Ok(Event::Empty(start)) => {
                    let mut element = XmlElement {
                        name: local_name(start.name().as_ref()),
                        ..Default::default()
                    };
                    for attr in start.attributes().flatten() {
                        let key = local_name(attr.key.as_ref());
                        let value = attr
                            .unescape_value()
                            .map_err(|e| InfraError::Xml(e.to_string()))?
                            .into_owned();
                        element.attributes.push((key, value));
                    }
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::Text(text)) => {
                    if let Some(current) = stack.last_mut() {
                        let chunk = text
                            .unescape()
                            .map_err(|e| InfraError::Xml(e.to_string()))?;
                        current.text.push_str(&chunk);
                    }
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| InfraError::Xml("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(InfraError::Xml(e.to_string())),
            }
        }

        root.ok_or_else(|| InfraError::Xml("document has no root element".into()))
    }
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    match raw.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => raw.into_owned(),
    }
}

/// Escape a string for inclusion in XML text content.
pub fn escape_xml(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

// ── SoapEnvelope ───────────────────────────────────────────────

/// WS-Addressing header fields extracted from an inbound envelope.
#[derive(Debug, Clone, Default)]
pub struct SoapHeader {
    pub charge_box_identity: Option<String>,
    pub action: Option<String>,
    pub message_id: Option<String>,
    pub from_address: Option<String>,
}

/// A parsed inbound SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub header: SoapHeader,
    /// First element inside `Body` (the OCPP request).
    pub body: XmlElement,
}

impl SoapEnvelope {
    pub fn parse(xml: &str) -> Result<Self, InfraError> {
        let root = XmlElement::parse(xml)?;
        if root.name != "Envelope" {
            return Err(InfraError::Xml(format!(
                "expected SOAP Envelope, got <{}>",
                root.name
            )));
        }

        let mut header = SoapHeader::default();
        if let Some(h) = root.child("Header") {
            header.charge_box_identity = h.text_of("chargeBoxIdentity").map(String::from);
            header.action = h
                .text_of("Action")
                .map(|a| a.trim_start_matches('/').to_string());
            header.message_id = h.text_of("MessageID").map(String::from);
            header.from_address = h
                .child("From")
                .and_then(|f| f.text_of("Address"))
                .map(String::from);
        }

        let body = root
            .child("Body")
            .and_then(|b| b.children.first().cloned())
            .ok_or_else(|| InfraError::Xml("SOAP Body is empty".into()))?;

        Ok(Self { header, body })
    }

    /// Render a response envelope wrapping `body_xml` (already-serialized
    /// response element) with the mirrored action header.
    pub fn render_response(action: &str, related_message_id: Option<&str>, body_xml: &str) -> String {
        let relates_to = related_message_id
            .map(|id| format!("<wsa:RelatesTo>{}</wsa:RelatesTo>", escape_xml(id)))
            .unwrap_or_default();
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope" "#,
                r#"xmlns:wsa="http://www.w3.org/2005/08/addressing" "#,
                r#"xmlns:cs="urn://Ocpp/Cs/2012/06/">"#,
                "<soap:Header><wsa:Action>/{action}Response</wsa:Action>{relates_to}</soap:Header>",
                "<soap:Body>{body}</soap:Body>",
                "</soap:Envelope>"
            ),
            action = escape_xml(action),
            relates_to = relates_to,
            body = body_xml,
        )
    }

    /// Render a SOAP fault for frames the core cannot decode.
    pub fn render_fault(code: &str, reason: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">"#,
                "<soap:Body><soap:Fault>",
                "<soap:Code><soap:Value>soap:{code}</soap:Value></soap:Code>",
                "<soap:Reason><soap:Text xml:lang=\"en\">{reason}</soap:Text></soap:Reason>",
                "</soap:Fault></soap:Body></soap:Envelope>"
            ),
            code = escape_xml(code),
            reason = escape_xml(reason),
        )
    }
}
