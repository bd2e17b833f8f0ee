//! The SOAP action dispatcher.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace, warn};
use ureq::Agent;

use crate::description::{child_text, Service};

use super::builder::build_soap_request;
use super::envelope::{find_child_with_suffix, parse_soap_envelope};
use super::fault::parse_upnp_fault;
use super::value::{coerce_value, ActionValue};

/// Per-request timeout on control POSTs.
pub const SOAP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("UPnP fault {code}: {description}")]
    Fault { code: u32, description: String },
    #[error("cannot coerce output argument {argument} from '{value}'")]
    Coerce { argument: String, value: String },
    #[error("SOAP transport error: {0}")]
    Transport(String),
    #[error("argument {argument} references state variable {variable}, absent from the service state table")]
    MissingStateVar { argument: String, variable: String },
    #[error("service has no action named {0}")]
    UnknownAction(String),
    #[error("action {action} takes {expected} input argument(s), {given} given")]
    InputArity {
        action: String,
        expected: usize,
        given: usize,
    },
    #[error("SOAP response has no {0} element")]
    MissingResponse(String),
    #[error("SOAP response is not a valid envelope: {0}")]
    Envelope(#[from] super::envelope::SoapParseError),
    #[error("failed to build SOAP request: {0}")]
    Request(#[from] xmltree::Error),
}

/// Invokes `action_name` on `service`, binding `inputs` positionally to
/// the declared `in` arguments, and returns one typed value per `out`
/// argument keyed by argument name.
pub fn invoke_action(
    service: &Service,
    action_name: &str,
    inputs: &[&str],
) -> Result<HashMap<String, ActionValue>, ActionError> {
    invoke_action_with_timeout(service, action_name, inputs, SOAP_TIMEOUT)
}

pub fn invoke_action_with_timeout(
    service: &Service,
    action_name: &str,
    inputs: &[&str],
    timeout: Duration,
) -> Result<HashMap<String, ActionValue>, ActionError> {
    let action = service
        .action(action_name)
        .ok_or_else(|| ActionError::UnknownAction(action_name.to_string()))?;

    let in_args: Vec<_> = action.inputs().collect();
    if in_args.len() != inputs.len() {
        return Err(ActionError::InputArity {
            action: action_name.to_string(),
            expected: in_args.len(),
            given: inputs.len(),
        });
    }
    // Reject unresolvable outputs before any network traffic.
    for arg in action.outputs() {
        if service.state_variable(&arg.related_state_variable).is_none() {
            return Err(ActionError::MissingStateVar {
                argument: arg.name.clone(),
                variable: arg.related_state_variable.clone(),
            });
        }
    }

    let named: Vec<(&str, &str)> = in_args
        .iter()
        .map(|a| a.name.as_str())
        .zip(inputs.iter().copied())
        .collect();
    let body_xml = build_soap_request(&service.service_type, action_name, &named)?;
    trace!(body = body_xml.as_str(), "SOAP request body");

    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    let agent: Agent = config.into();

    let soap_action = format!("\"{}#{}\"", service.service_type, action_name);
    debug!(
        url = service.control_url.as_str(),
        action = action_name,
        "📤 sending SOAP request"
    );

    let mut response = agent
        .post(&service.control_url)
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .header("SOAPAction", &soap_action)
        .send(body_xml)
        .map_err(|e| ActionError::Transport(e.to_string()))?;

    let status = response.status();
    let raw_body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| ActionError::Transport(e.to_string()))?;
    debug!(status = status.as_u16(), "📥 SOAP response received");

    let envelope = match parse_soap_envelope(raw_body.as_bytes()) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => {
            return Err(ActionError::Transport(format!(
                "HTTP status {} with body: {}",
                status.as_u16(),
                snippet(&raw_body)
            )));
        }
    };

    if let Some(fault) = parse_upnp_fault(&envelope) {
        warn!(
            "❌ {} returned UPnP fault {}: {}",
            action_name, fault.code, fault.description
        );
        return Err(ActionError::Fault {
            code: fault.code,
            description: fault.description,
        });
    }
    if !status.is_success() {
        return Err(ActionError::Transport(format!(
            "HTTP status {} with body: {}",
            status.as_u16(),
            snippet(&raw_body)
        )));
    }

    let response_name = format!("{}Response", action_name);
    let response_elem = find_child_with_suffix(&envelope.body.content, &response_name)
        .ok_or(ActionError::MissingResponse(response_name))?;

    let mut outputs = HashMap::new();
    for arg in action.outputs() {
        let var = service
            .state_variable(&arg.related_state_variable)
            .ok_or_else(|| ActionError::MissingStateVar {
                argument: arg.name.clone(),
                variable: arg.related_state_variable.clone(),
            })?;
        // Devices routinely omit empty string outputs altogether.
        let text = child_text(response_elem, &arg.name).unwrap_or_default();
        let value = coerce_value(&var.data_type, &text).map_err(|e| ActionError::Coerce {
            argument: arg.name.clone(),
            value: e.value,
        })?;
        outputs.insert(arg.name.clone(), value);
    }

    Ok(outputs)
}

fn snippet(body: &str) -> String {
    const MAX_LEN: usize = 256;
    let trimmed = body.trim();
    if trimmed.len() <= MAX_LEN {
        trimmed.to_string()
    } else {
        format!("{}…", &trimmed[..MAX_LEN])
    }
}
