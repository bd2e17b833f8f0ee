//! # SOAP - action invocation over HTTP
//!
//! One dispatcher replaces per-action generated code: the parsed action
//! metadata drives request synthesis and the service state table drives
//! output coercion.
//!
//! ## Fonctionnalités
//!
//! - ✅ SOAP 1.1 request envelopes from action metadata
//! - ✅ Envelope parsing with namespace-prefix tolerance
//! - ✅ UPnP fault extraction (`Fault/detail/UPnPError`)
//! - ✅ Output coercion driven by state-variable `dataType`

mod builder;
mod envelope;
mod fault;
mod invoke;
mod value;

pub use builder::build_soap_request;
pub use envelope::{
    find_child_with_suffix, parse_soap_envelope, SoapBody, SoapEnvelope, SoapHeader,
    SoapParseError,
};
pub use fault::{parse_upnp_fault, UpnpFault};
pub use invoke::{invoke_action, invoke_action_with_timeout, ActionError, SOAP_TIMEOUT};
pub use value::{coerce_value, ActionValue, CoerceError};
