//! SOAP envelope parsing.

use std::io::BufReader;

use xmltree::{Element, XMLNode};

/// A parsed SOAP envelope. The body keeps its raw tree: what it contains
/// depends on the action that was called.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub header: Option<SoapHeader>,
    pub body: SoapBody,
}

#[derive(Debug, Clone)]
pub struct SoapHeader {
    pub content: Element,
}

#[derive(Debug, Clone)]
pub struct SoapBody {
    pub content: Element,
}

#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),
    #[error("missing SOAP Envelope")]
    MissingEnvelope,
    #[error("missing SOAP Body")]
    MissingBody,
}

/// Parses a complete SOAP envelope. Devices prefix (or do not prefix)
/// envelope elements freely, so matching is by local-name suffix.
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let root = Element::parse(BufReader::new(xml))?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let header = find_child_with_suffix(&root, "Header").map(|e| SoapHeader { content: e.clone() });

    let body = find_child_with_suffix(&root, "Body")
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        header,
        body: SoapBody {
            content: body.clone(),
        },
    })
}

/// First child element whose local name ends with `suffix`.
pub fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}
