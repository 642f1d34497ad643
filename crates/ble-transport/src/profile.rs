use uuid::Uuid;

/// GATT contract of a device family: one service, one write characteristic
/// (commands in) and one notify characteristic (responses out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BleProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub service_uuid: Uuid,
    pub write_uuid: Uuid,
    pub notify_uuid: Uuid,
    /// Used when the platform cannot report the negotiated MTU.
    pub mtu_hint: u16,
}

impl BleProfile {
    pub fn nano_x() -> Self {
        Self {
            id: "nano_x",
            name: "Nano X",
            service_uuid: uuid::uuid!("13d63400-2c97-0004-0000-4c6564676572"),
            write_uuid: uuid::uuid!("13d63400-2c97-0004-0002-4c6564676572"),
            notify_uuid: uuid::uuid!("13d63400-2c97-0004-0001-4c6564676572"),
            mtu_hint: 153,
        }
    }
}

impl Default for BleProfile {
    fn default() -> Self {
        Self::nano_x()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceModel {
    NanoX,
    Stax,
    Flex,
    Unknown,
}

impl DeviceModel {
    /// Infers the model from the advertised local name.
    pub fn from_name(name: Option<&str>) -> Self {
        let Some(name) = name.map(str::trim) else {
            return Self::Unknown;
        };
        if name.starts_with("Nano X") {
            Self::NanoX
        } else if name.starts_with("Stax") {
            Self::Stax
        } else if name.starts_with("Flex") {
            Self::Flex
        } else {
            Self::Unknown
        }
    }
}

/// A discovered (or remembered) signing device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: Option<String>,
    pub model: DeviceModel,
    pub rssi: Option<i16>,
    pub firmware: Option<String>,
    pub battery: Option<u8>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: Option<String>, rssi: Option<i16>) -> Self {
        let model = DeviceModel::from_name(name.as_deref());
        Self {
            id: id.into(),
            name,
            model,
            rssi,
            firmware: None,
            battery: None,
        }
    }

    /// Folds a repeated advertisement into this entry. Only signal strength
    /// and a late-arriving name are taken; identity never changes.
    pub fn refresh(&mut self, advert: &Device) {
        if advert.rssi.is_some() {
            self.rssi = advert.rssi;
        }
        if self.name.is_none() && advert.name.is_some() {
            self.name = advert.name.clone();
            self.model = DeviceModel::from_name(self.name.as_deref());
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// Shortens a platform device id for logs.
pub fn redact_device_id(device_id: &str) -> String {
    let chars: Vec<char> = device_id.chars().collect();
    if chars.is_empty() {
        return "<redacted>".to_string();
    }
    let start = chars.len().saturating_sub(6);
    format!("...{}", chars[start..].iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_model_from_name() {
        assert_eq!(DeviceModel::from_name(Some("Nano X 1A2B")), DeviceModel::NanoX);
        assert_eq!(DeviceModel::from_name(Some("Stax 99")), DeviceModel::Stax);
        assert_eq!(DeviceModel::from_name(Some("Flex")), DeviceModel::Flex);
        assert_eq!(DeviceModel::from_name(Some("Headphones")), DeviceModel::Unknown);
        assert_eq!(DeviceModel::from_name(None), DeviceModel::Unknown);
    }

    #[test]
    fn refresh_keeps_identity_and_updates_rssi() {
        let mut device = Device::new("dev-1", None, Some(-80));
        device.refresh(&Device::new("dev-1", Some("Nano X AB".into()), Some(-52)));
        assert_eq!(device.rssi, Some(-52));
        assert_eq!(device.model, DeviceModel::NanoX);

        device.refresh(&Device::new("dev-1", Some("Other".into()), None));
        assert_eq!(device.name.as_deref(), Some("Nano X AB"));
        assert_eq!(device.rssi, Some(-52));
    }

    #[test]
    fn redacts_device_ids() {
        assert_eq!(redact_device_id("AA:BB:CC:DD:EE:FF"), "...:EE:FF");
        assert_eq!(redact_device_id(""), "<redacted>");
    }
}
