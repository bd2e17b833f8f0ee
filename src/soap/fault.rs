//! SOAP fault extraction.

use xmltree::XMLNode;

use super::envelope::{find_child_with_suffix, SoapEnvelope};

/// A UPnP error carried in a SOAP `Fault/detail/UPnPError` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFault {
    pub code: u32,
    pub description: String,
}

/// Digs the UPnP error out of a fault response, if the body carries one.
pub fn parse_upnp_fault(envelope: &SoapEnvelope) -> Option<UpnpFault> {
    let fault = find_child_with_suffix(&envelope.body.content, "Fault")?;
    let detail = find_child_with_suffix(fault, "detail")?;
    let upnp_error = find_child_with_suffix(detail, "UPnPError")?;

    let code = upnp_error
        .children
        .iter()
        .find_map(|node| match node {
            XMLNode::Element(elem) if elem.name.ends_with("errorCode") => elem.get_text(),
            _ => None,
        })?
        .trim()
        .parse::<u32>()
        .ok()?;

    let description = upnp_error
        .children
        .iter()
        .find_map(|node| match node {
            XMLNode::Element(elem) if elem.name.ends_with("errorDescription") => {
                elem.get_text().map(|t| t.trim().to_string())
            }
            _ => None,
        })
        .unwrap_or_default();

    Some(UpnpFault { code, description })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::envelope::parse_soap_envelope;

    const FAULT: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>702</errorCode>
          <errorDescription>Seek mode not supported</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn extracts_code_and_description() {
        let envelope = parse_soap_envelope(FAULT.as_bytes()).unwrap();
        assert_eq!(
            parse_upnp_fault(&envelope),
            Some(UpnpFault {
                code: 702,
                description: "Seek mode not supported".into(),
            })
        );
    }

    #[test]
    fn plain_responses_carry_no_fault() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body><u:StopResponse xmlns:u="urn:x:service:AVTransport:1"/></s:Body>
</s:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(parse_upnp_fault(&envelope), None);
    }
}
