//! Service catalog: device and service descriptors built from the appliance's
//! own description documents.

use crate::error::{FritzError, Result};
use crate::value::DataType;
use crate::xml::Tree;
use log::debug;
use std::collections::HashMap;

/// Identity of the appliance, read from the root description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub host: String,
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
    pub display_name: String,
}

/// Direction of an action argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    pub name: String,
    pub direction: Direction,
    /// Name of the state variable that declares the argument's type
    pub related_variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub name: String,
    pub arguments: Vec<ArgumentDescriptor>,
}

impl ActionDescriptor {
    pub fn inputs(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.arguments.iter().filter(|a| a.direction == Direction::In)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ArgumentDescriptor> {
        self.arguments.iter().filter(|a| a.direction == Direction::Out)
    }
}

/// A fully resolved service. Built in one piece and cached as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub service_type: String,
    pub control_url: String,
    pub actions: Vec<ActionDescriptor>,
    pub data_types: HashMap<String, DataType>,
}

impl ServiceDescriptor {
    pub fn action(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn data_type(&self, variable: &str) -> Option<&DataType> {
        self.data_types.get(variable)
    }
}

/// An entry of the root description's service list, before its own
/// description has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawService {
    pub service_type: String,
    pub control_url: Option<String>,
    pub scpd_url: Option<String>,
}

/// Reads the device identity and the flattened service list from a root
/// description document.
pub fn parse_root_description(tree: &Tree, host: &str) -> Result<(DeviceDescriptor, Vec<RawService>)> {
    let root = tree
        .get("root")
        .ok_or_else(|| FritzError::Protocol("description has no root element".to_string()))?;
    let device = root.get("device");
    let field = |name: &str| {
        device
            .and_then(|d| d.get(name))
            .and_then(Tree::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let manufacturer = field("manufacturer");
    let serial = field("serialNumber");
    let model = field("modelName");
    let firmware = root
        .path(&["systemVersion", "Display"])
        .and_then(Tree::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let (Some(manufacturer), Some(serial), Some(model), Some(firmware)) =
        (manufacturer, serial, model, firmware)
    else {
        return Err(FritzError::Protocol("error getting device info".to_string()));
    };

    let display_name = field("friendlyName").unwrap_or_else(|| model.clone());

    let device = device.ok_or_else(|| FritzError::Protocol("description has no device".to_string()))?;
    if device.path(&["serviceList", "service"]).is_none() {
        return Err(FritzError::Protocol("error getting service list".to_string()));
    }
    let mut services = Vec::new();
    collect_services(device, &mut services);

    Ok((
        DeviceDescriptor {
            host: host.to_string(),
            manufacturer,
            model,
            serial,
            firmware,
            display_name,
        },
        services,
    ))
}

/// Walks a device and all nested sub-devices, appending their services.
fn collect_services(device: &Tree, out: &mut Vec<RawService>) {
    if let Some(list) = device.path(&["serviceList", "service"]) {
        for service in list.as_list() {
            let text = |name: &str| {
                service
                    .get(name)
                    .and_then(Tree::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            if let Some(service_type) = text("serviceType") {
                out.push(RawService {
                    service_type,
                    control_url: text("controlURL"),
                    scpd_url: text("SCPDURL"),
                });
            }
        }
    }
    if let Some(children) = device.path(&["deviceList", "device"]) {
        for child in children.as_list() {
            collect_services(child, out);
        }
    }
}

/// Builds a service descriptor from its description document. Actions and
/// arguments missing a name, direction or related variable are skipped.
pub fn parse_service_description(
    tree: &Tree,
    service_type: &str,
    control_url: &str,
) -> Result<ServiceDescriptor> {
    let scpd = tree
        .get("scpd")
        .ok_or_else(|| FritzError::Protocol(format!("{}: no scpd element", service_type)))?;

    let action_list = scpd
        .path(&["actionList", "action"])
        .ok_or_else(|| FritzError::Protocol(format!("{}: no action list", service_type)))?;

    let mut actions = Vec::new();
    for action in action_list.as_list() {
        let Some(name) = action.get("name").and_then(Tree::as_str) else {
            continue;
        };
        let mut arguments = Vec::new();
        if let Some(list) = action.path(&["argumentList", "argument"]) {
            for arg in list.as_list() {
                let name = arg.get("name").and_then(Tree::as_str);
                let direction = arg
                    .get("direction")
                    .and_then(Tree::as_str)
                    .and_then(Direction::parse);
                let related = arg.get("relatedStateVariable").and_then(Tree::as_str);
                if let (Some(name), Some(direction), Some(related)) = (name, direction, related) {
                    arguments.push(ArgumentDescriptor {
                        name: name.to_string(),
                        direction,
                        related_variable: related.to_string(),
                    });
                } else {
                    debug!("Skipping incomplete argument of {}", name.unwrap_or("?"));
                }
            }
        }
        actions.push(ActionDescriptor {
            name: name.to_string(),
            arguments,
        });
    }

    let variables = scpd
        .path(&["serviceStateTable", "stateVariable"])
        .ok_or_else(|| FritzError::Protocol(format!("{}: no service state table", service_type)))?;

    let mut data_types = HashMap::new();
    for variable in variables.as_list() {
        let name = variable.get("name").and_then(Tree::as_str);
        let data_type = variable.get("dataType").and_then(Tree::as_str);
        if let (Some(name), Some(data_type)) = (name, data_type) {
            data_types.insert(name.to_string(), DataType::from(data_type.trim()));
        }
    }

    Ok(ServiceDescriptor {
        service_type: service_type.to_string(),
        control_url: control_url.to_string(),
        actions,
        data_types,
    })
}
