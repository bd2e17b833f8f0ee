//! End-to-end description pipeline and SOAP dispatch against an
//! in-process HTTP fixture.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use pmocontrolpoint::description::{
    get_description, get_description_with_timeout, FetchError, ServiceStatus,
};
use pmocontrolpoint::soap::{invoke_action_with_timeout, ActionError, ActionValue};
use pmocontrolpoint::{Action, Argument, Device, Direction, Service, StateVariable};

const DDF: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Fixture Renderer</friendlyName>
    <manufacturer>ACME</manufacturer>
    <modelName>Fixture v1</modelName>
    <UDN>uuid:fixture-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <SCPDURL>/rc.xml</SCPDURL>
        <controlURL>/control</controlURL>
        <eventSubURL>/rc/event</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:Broken:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:Broken</serviceId>
        <SCPDURL>/missing.xml</SCPDURL>
        <controlURL>/broken/control</controlURL>
        <eventSubURL>/broken/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

const SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <actionList>
    <action>
      <name>GetVolume</name>
      <argumentList>
        <argument>
          <name>Channel</name>
          <direction>in</direction>
          <relatedStateVariable>A_ARG_TYPE_Channel</relatedStateVariable>
        </argument>
        <argument>
          <name>CurrentVolume</name>
          <direction>out</direction>
          <relatedStateVariable>Volume</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>Volume</name>
      <dataType>ui2</dataType>
    </stateVariable>
    <stateVariable sendEvents="no">
      <name>A_ARG_TYPE_Channel</name>
      <dataType>string</dataType>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

const VOLUME_RESPONSE: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
      <CurrentVolume>42</CurrentVolume>
    </u:GetVolumeResponse>
  </s:Body>
</s:Envelope>"#;

const FAULT_RESPONSE: &str = r#"<?xml version="1.0"?>
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

struct Route {
    status: u16,
    body: &'static str,
    /// Sleep this long before answering the first request on the route.
    delay_first: Option<Duration>,
}

impl Route {
    fn ok(body: &'static str) -> Self {
        Route {
            status: 200,
            body,
            delay_first: None,
        }
    }
}

struct Fixture {
    addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl Fixture {
    fn serve(routes: HashMap<&'static str, Route>) -> Fixture {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let routes = Arc::new(routes);

        let accept_hits = Arc::clone(&hits);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&accept_hits);
                std::thread::spawn(move || handle(stream, &routes, &hits));
            }
        });

        Fixture { addr, hits }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn hits(&self, path: &str) -> usize {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<&'static str, Route>, hits: &Mutex<HashMap<String, usize>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    if content_length > 0 {
        let mut body = vec![0u8; content_length];
        let _ = reader.read_exact(&mut body);
    }

    let hit = {
        let mut hits = hits.lock().unwrap();
        let entry = hits.entry(path.clone()).or_insert(0);
        *entry += 1;
        *entry
    };

    match routes.get(path.as_str()) {
        Some(route) => {
            if hit == 1 {
                if let Some(delay) = route.delay_first {
                    std::thread::sleep(delay);
                }
            }
            let reason = if route.status == 200 { "OK" } else { "Error" };
            let _ = write!(
                stream,
                "HTTP/1.1 {} {}\r\nContent-Type: text/xml; charset=\"utf-8\"\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                route.status,
                reason,
                route.body.len(),
                route.body
            );
        }
        None => {
            let _ = write!(
                stream,
                "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
        }
    }
}

fn renderer_fixture() -> Fixture {
    let mut routes = HashMap::new();
    routes.insert("/desc.xml", Route::ok(DDF));
    routes.insert("/rc.xml", Route::ok(SCPD));
    routes.insert("/control", Route::ok(VOLUME_RESPONSE));
    Fixture::serve(routes)
}

#[test]
fn device_builds_from_ddf_and_scpd() -> Result<()> {
    let fixture = renderer_fixture();
    let device = Device::from_location(&fixture.url("/desc.xml"))?;

    assert_eq!(device.friendly_name, "Fixture Renderer");
    assert_eq!(device.udn, "uuid:fixture-1");
    assert_eq!(device.url_base, format!("http://{}/", fixture.addr));
    assert_eq!(device.services.len(), 2);

    let rc = device
        .find_service("urn:schemas-upnp-org:service:RenderingControl:1")
        .expect("RenderingControl should be present");
    assert_eq!(rc.status, ServiceStatus::Ready);
    assert_eq!(rc.control_url, fixture.url("/control"));
    assert_eq!(rc.actions.len(), 1);
    assert!(rc.state_variable("Volume").is_some());
    Ok(())
}

#[test]
fn failed_scpd_does_not_poison_sibling_services() -> Result<()> {
    let fixture = renderer_fixture();
    let device = Device::from_location(&fixture.url("/desc.xml"))?;

    let broken = device
        .find_service("urn:schemas-upnp-org:service:Broken:1")
        .expect("Broken service stub should be present");
    assert!(matches!(broken.status, ServiceStatus::Failed(_)));

    let rc = device
        .find_service("urn:schemas-upnp-org:service:RenderingControl:1")
        .unwrap();
    assert_eq!(rc.status, ServiceStatus::Ready);
    Ok(())
}

#[test]
fn invoke_coerces_outputs_by_the_state_table() -> Result<()> {
    let fixture = renderer_fixture();
    let device = Device::from_location(&fixture.url("/desc.xml"))?;
    let rc = device
        .find_service("urn:schemas-upnp-org:service:RenderingControl:1")
        .unwrap();

    let outputs = invoke_action_with_timeout(rc, "GetVolume", &["Master"], Duration::from_secs(5))?;

    // An integer, not the string "42".
    assert_eq!(outputs.get("CurrentVolume"), Some(&ActionValue::Int(42)));
    assert_eq!(outputs.len(), 1);
    Ok(())
}

#[test]
fn soap_faults_surface_code_and_description() {
    let mut routes = HashMap::new();
    routes.insert(
        "/fault",
        Route {
            status: 500,
            body: FAULT_RESPONSE,
            delay_first: None,
        },
    );
    let fixture = Fixture::serve(routes);

    let service = Service {
        service_type: "urn:schemas-upnp-org:service:AVTransport:1".into(),
        service_id: "urn:upnp-org:serviceId:AVTransport".into(),
        scpd_url: String::new(),
        control_url: fixture.url("/fault"),
        event_sub_url: String::new(),
        status: ServiceStatus::Ready,
        state_table: vec![StateVariable {
            name: "A_ARG_TYPE_SeekMode".into(),
            data_type: "string".into(),
            default_value: None,
            allowed_values: Vec::new(),
            allowed_range: None,
            send_events: false,
        }],
        actions: vec![Action {
            name: "Seek".into(),
            arguments: vec![Argument {
                name: "Unit".into(),
                direction: Direction::In,
                related_state_variable: "A_ARG_TYPE_SeekMode".into(),
            }],
        }],
    };

    let err = invoke_action_with_timeout(&service, "Seek", &["ABS_TIME"], Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(
        err,
        ActionError::Fault { code: 702, ref description } if description == "Seek mode not supported"
    ));
}

#[test]
fn description_fetch_retries_once_on_timeout() -> Result<()> {
    let mut routes = HashMap::new();
    routes.insert(
        "/slow.xml",
        Route {
            status: 200,
            body: "<root><device/></root>",
            delay_first: Some(Duration::from_millis(900)),
        },
    );
    let fixture = Fixture::serve(routes);

    let tree = get_description_with_timeout(&fixture.url("/slow.xml"), Duration::from_millis(300))?;
    assert_eq!(tree.name, "root");
    // Exactly two attempts: the timed-out one and the retry.
    assert_eq!(fixture.hits("/slow.xml"), 2);
    Ok(())
}

#[test]
fn non_200_responses_fail_with_the_status_code() {
    let fixture = Fixture::serve(HashMap::new());
    let err = get_description(&fixture.url("/nope.xml")).unwrap_err();
    assert!(matches!(err, FetchError::Status(404)));
}
