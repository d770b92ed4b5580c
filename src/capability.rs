//! Smart home device classification.
//!
//! Maps the device entries of `getdevicelistinfos` to the accessory services
//! and characteristics a bridge exposes, and describes the energy-meter
//! characteristics that have no standard definition.

use crate::xml::Tree;
use std::fmt;

/// Access a client has to a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    PairedRead,
    PairedWrite,
    Notify,
}

/// Static description of a numeric characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilityDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub uuid: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub permissions: &'static [Permission],
}

const READ_NOTIFY: &[Permission] = &[Permission::PairedRead, Permission::Notify];

pub const VOLTAGE: CapabilityDescriptor = CapabilityDescriptor {
    id: "Voltage",
    display_name: "Voltage",
    uuid: "E863F10A-079E-48FF-8F27-9C2605A29F52",
    unit: "V",
    min: 0.0,
    max: 380.0,
    step: 0.1,
    permissions: READ_NOTIFY,
};

pub const TOTAL_CONSUMPTION: CapabilityDescriptor = CapabilityDescriptor {
    id: "TotalConsumption",
    display_name: "Total Consumption",
    uuid: "E863F10C-079E-48FF-8F27-9C2605A29F52",
    unit: "kWh",
    min: 0.0,
    max: 1_000_000.0,
    step: 0.01,
    permissions: READ_NOTIFY,
};

pub const CONSUMPTION: CapabilityDescriptor = CapabilityDescriptor {
    id: "Consumption",
    display_name: "Consumption",
    uuid: "E863F10D-079E-48FF-8F27-9C2605A29F52",
    unit: "W",
    min: 0.0,
    max: 12_000.0,
    step: 0.1,
    permissions: READ_NOTIFY,
};

/// Service grouping the three energy characteristics.
pub const ENERGY_METER_UUID: &str = "E863F008-079E-48FF-8F27-9C2605A29F52";

pub const CAPABILITIES: &[CapabilityDescriptor] = &[VOLTAGE, TOTAL_CONSUMPTION, CONSUMPTION];

/// Find a descriptor by id.
pub fn lookup(id: &str) -> Option<&'static CapabilityDescriptor> {
    CAPABILITIES.iter().find(|c| c.id == id)
}

impl CapabilityDescriptor {
    /// Clamp a reading into range and round it to the step.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        let stepped = (value / self.step).round() * self.step;
        stepped.clamp(self.min, self.max)
    }
}

/// Accessory service kinds, in order of preference for the primary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceService {
    WindowCovering,
    Thermostat,
    Outlet,
    Lightbulb,
    Switch,
    EnergyMeter,
    ContactSensor,
    LeakSensor,
    MotionSensor,
    TemperatureSensor,
    HumiditySensor,
    Battery,
}

impl DeviceService {
    const PREFERENCE: [DeviceService; 11] = [
        DeviceService::WindowCovering,
        DeviceService::Thermostat,
        DeviceService::Outlet,
        DeviceService::Lightbulb,
        DeviceService::Switch,
        DeviceService::EnergyMeter,
        DeviceService::ContactSensor,
        DeviceService::LeakSensor,
        DeviceService::MotionSensor,
        DeviceService::TemperatureSensor,
        DeviceService::HumiditySensor,
    ];

    /// Services from here on may accompany the primary one.
    const FIRST_SECONDARY: usize = 5;
}

impl fmt::Display for DeviceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Optional characteristics of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Brightness,
    Hue,
    Saturation,
    ColorTemperature,
    UseMappedColor,
    BatteryLevel,
}

/// The `functionbitmask` attribute of a device entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFunctions(pub u32);

impl DeviceFunctions {
    pub const HANFUN_DEVICE: u32 = 0;
    pub const ZIGBEE_DEVICE: u32 = 1;
    pub const LIGHT: u32 = 2;
    pub const ALARM_SENSOR: u32 = 4;
    pub const BUTTON: u32 = 5;
    pub const THERMOSTAT: u32 = 6;
    pub const ENERGY_METER: u32 = 7;
    pub const TEMPERATURE_SENSOR: u32 = 8;
    pub const OUTLET: u32 = 9;
    pub const DECT_REPEATER: u32 = 10;
    pub const MICROPHONE: u32 = 11;
    pub const HANFUN_UNIT: u32 = 13;
    pub const SWITCHABLE: u32 = 15;
    pub const LEVEL_CONTROL: u32 = 16;
    pub const COLOR_LIGHT: u32 = 17;
    pub const BLINDS: u32 = 18;
    pub const HUMIDITY_SENSOR: u32 = 20;

    pub fn has(&self, bit: u32) -> bool {
        bit < 32 && self.0 & (1 << bit) != 0
    }

    /// Services implied by the set bits, lowest bit first. Bits that say
    /// nothing about the accessory type are ignored.
    pub fn services(&self) -> Vec<DeviceService> {
        const MAPPED: &[(u32, DeviceService)] = &[
            (DeviceFunctions::LIGHT, DeviceService::Lightbulb),
            (DeviceFunctions::THERMOSTAT, DeviceService::Thermostat),
            (DeviceFunctions::ENERGY_METER, DeviceService::EnergyMeter),
            (DeviceFunctions::TEMPERATURE_SENSOR, DeviceService::TemperatureSensor),
            (DeviceFunctions::OUTLET, DeviceService::Outlet),
            (DeviceFunctions::SWITCHABLE, DeviceService::Switch),
            (DeviceFunctions::COLOR_LIGHT, DeviceService::Lightbulb),
            (DeviceFunctions::BLINDS, DeviceService::WindowCovering),
            (DeviceFunctions::HUMIDITY_SENSOR, DeviceService::HumiditySensor),
        ];
        MAPPED
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, service)| *service)
            .collect()
    }
}

/// Service of a HAN-FUN unit, by its `etsiunitinfo/unittype`.
pub fn service_for_unit_type(unit_type: u32) -> Option<DeviceService> {
    match unit_type {
        256 | 257 => Some(DeviceService::Switch),
        262 | 263 => Some(DeviceService::Outlet),
        264 | 265 | 266 | 277 | 278 => Some(DeviceService::Lightbulb),
        281 | 282 => Some(DeviceService::WindowCovering),
        512..=514 => Some(DeviceService::ContactSensor),
        515 => Some(DeviceService::MotionSensor),
        518 => Some(DeviceService::LeakSensor),
        // buttons, glass break and vibration detectors, sirens
        _ => None,
    }
}

/// What a device entry should be exposed as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Primary service first, then any sensors
    pub services: Vec<DeviceService>,
    pub characteristics: Vec<Characteristic>,
}

/// Classify one `<device>` entry of `getdevicelistinfos`.
///
/// The first reported service in preference order becomes the primary one;
/// the first five kinds exclude each other, later ones are added as
/// secondary services.
pub fn classify(device: &Tree) -> Classification {
    let functions = DeviceFunctions(int_attr(device, "functionbitmask").unwrap_or(0));

    let reported = if functions.has(DeviceFunctions::HANFUN_UNIT) {
        device
            .path(&["etsiunitinfo", "unittype"])
            .and_then(Tree::as_str)
            .and_then(|s| s.trim().parse().ok())
            .and_then(service_for_unit_type)
            .into_iter()
            .collect()
    } else {
        functions.services()
    };

    let mut services: Vec<DeviceService> = DeviceService::PREFERENCE
        .iter()
        .find(|s| reported.contains(s))
        .copied()
        .into_iter()
        .collect();
    for service in &DeviceService::PREFERENCE[DeviceService::FIRST_SECONDARY..] {
        if reported.contains(service) && !services.contains(service) {
            services.push(*service);
        }
    }

    let has_battery = device.get("battery").is_some();
    if has_battery || device.get("batterylow").is_some() {
        services.push(DeviceService::Battery);
    }

    let mut characteristics = Vec::new();
    if services.contains(&DeviceService::Lightbulb) {
        characteristics = lightbulb_characteristics(device);
    }
    if has_battery {
        characteristics.push(Characteristic::BatteryLevel);
    }

    Classification {
        services,
        characteristics,
    }
}

fn lightbulb_characteristics(device: &Tree) -> Vec<Characteristic> {
    let mut characteristics = Vec::new();

    if let Some(level) = device.get("levelcontrol")
        && (level.get("level").is_some() || level.get("levelpercentage").is_some())
    {
        characteristics.push(Characteristic::Brightness);
    }

    let Some(color) = device.get("colorcontrol") else {
        return characteristics;
    };
    let supported_modes = int_attr(color, "supported_modes").unwrap_or(0);
    let current_mode = int_attr(color, "current_mode").unwrap_or(0);
    let mapped = int_attr(color, "mapped").unwrap_or(0);

    // Mode bit 0 is hue/saturation, bit 2 is color temperature
    if supported_modes & 0b001 != 0 || current_mode == 1 {
        characteristics.push(Characteristic::Hue);
        characteristics.push(Characteristic::Saturation);
    }
    if supported_modes & 0b100 != 0 || current_mode == 4 {
        characteristics.push(Characteristic::ColorTemperature);
    }
    if mapped != 0 {
        characteristics.push(Characteristic::UseMappedColor);
    }
    characteristics
}

fn int_attr(node: &Tree, name: &str) -> Option<u32> {
    node.attr(name).and_then(|s| s.trim().parse().ok())
}
