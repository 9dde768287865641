//! Fixture device catalog and its filters.

use serde::{Deserialize, Serialize};

/// One video device as served by the mock data service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub status: String,
    pub ip_address: String,
    pub port: u16,
    pub rtsp_url: String,
    pub http_url: String,
    pub location: String,
    pub model: String,
    pub resolution: String,
    pub last_online: String,
    pub manufacturer: String,
    pub firmware_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
}

/// Compact constructor for the fixture table below.
#[allow(clippy::too_many_arguments)]
fn device(
    device_id: &str,
    name: &str,
    device_type: &str,
    status: &str,
    host: u8,
    location: &str,
    model: &str,
    resolution: &str,
    last_online: &str,
    manufacturer: &str,
    firmware_version: &str,
    channels: Option<u32>,
) -> Device {
    let ip = format!("192.168.1.{host}");
    Device {
        device_id: device_id.into(),
        name: name.into(),
        device_type: device_type.into(),
        status: status.into(),
        rtsp_url: format!("rtsp://{ip}:554/stream1"),
        http_url: format!("http://{ip}:80"),
        ip_address: ip,
        port: 554,
        location: location.into(),
        model: model.into(),
        resolution: resolution.into(),
        last_online: last_online.into(),
        manufacturer: manufacturer.into(),
        firmware_version: firmware_version.into(),
        channels,
    }
}

/// The fixed catalog: eight IP cameras and two NVRs.
pub fn fixture_devices() -> Vec<Device> {
    vec![
        device("ca001", "仓库门口摄像头", "ip_camera", "online", 101, "仓库门口",
            "Hikvision DS-2CD2042WD-I", "1080p", "2024-01-15 10:30:00", "Hikvision", "V5.4.5", None),
        device("ca002", "仓库内部摄像头", "ip_camera", "online", 102, "仓库内部",
            "Dahua IPC-HDW1431TMP-AS", "4K", "2024-01-15 10:30:00", "Dahua",
            "V2.800.0000000.28.R.20190805", None),
        device("ca003", "门口摄像头", "ip_camera", "offline", 103, "公司门口",
            "Axis P3225-LVE Mk III", "1080p", "2024-01-15 09:15:00", "Axis", "9.80.1", None),
        device("nv001", "仓库NVR", "nvr", "online", 201, "仓库机房",
            "Hikvision DS-7732NI-K4", "4K", "2024-01-15 10:30:00", "Hikvision", "V4.30.000", Some(32)),
        device("nv002", "办公楼NVR", "nvr", "online", 202, "办公楼机房",
            "Dahua NVR4232-4KS2", "4K", "2024-01-15 10:30:00", "Dahua",
            "V3.216.0000000.42.R.20200731", Some(32)),
        device("ca004", "走廊摄像头1", "ip_camera", "online", 104, "1楼走廊",
            "Hikvision DS-2CD2045FWD-I", "1080p", "2024-01-15 10:29:00", "Hikvision", "V5.4.5", None),
        device("ca005", "走廊摄像头2", "ip_camera", "online", 105, "2楼走廊",
            "Hikvision DS-2CD2045FWD-I", "1080p", "2024-01-15 10:29:00", "Hikvision", "V5.4.5", None),
        device("ca006", "走廊摄像头3", "ip_camera", "online", 106, "3楼走廊",
            "Dahua IPC-HDW1431TMP-AS", "1080p", "2024-01-15 10:30:00", "Dahua",
            "V2.800.0000000.28.R.20190805", None),
        device("ca007", "大会议室摄像头", "ip_camera", "online", 107, "大会议室",
            "Axis P3224-LV Mk III", "4K", "2024-01-15 10:30:00", "Axis", "9.80.1", None),
        device("ca008", "小会议室摄像头", "ip_camera", "online", 108, "小会议室A",
            "Sony SNC-VB770D", "1080p", "2024-01-15 10:30:00", "Sony", "V6.20", None),
    ]
}

/// Filter by exact type, exact status, and a case-insensitive keyword that
/// may appear in the name, id, or location. Empty filters are ignored.
pub fn filter_devices<'a>(
    devices: &'a [Device],
    device_type: Option<&str>,
    status: Option<&str>,
    keyword: Option<&str>,
) -> Vec<&'a Device> {
    let device_type = device_type.filter(|t| !t.is_empty());
    let status = status.filter(|s| !s.is_empty());
    let keyword = keyword
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty());

    devices
        .iter()
        .filter(|d| device_type.map_or(true, |t| d.device_type == t))
        .filter(|d| status.map_or(true, |s| d.status == s))
        .filter(|d| {
            keyword.as_deref().map_or(true, |k| {
                d.name.to_lowercase().contains(k)
                    || d.device_id.to_lowercase().contains(k)
                    || d.location.to_lowercase().contains(k)
            })
        })
        .collect()
}

/// Exact lookup by id.
pub fn find_by_id<'a>(devices: &'a [Device], device_id: &str) -> Option<&'a Device> {
    devices.iter().find(|d| d.device_id == device_id)
}

/// First device whose name contains `name`, case-insensitively.
pub fn find_by_name<'a>(devices: &'a [Device], name: &str) -> Option<&'a Device> {
    let needle = name.to_lowercase();
    devices
        .iter()
        .find(|d| d.name.to_lowercase().contains(&needle))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_size() {
        let devices = fixture_devices();
        assert_eq!(devices.len(), 10);
        assert_eq!(devices.iter().filter(|d| d.device_type == "nvr").count(), 2);
    }

    #[test]
    fn test_filter_by_type_and_status() {
        let devices = fixture_devices();
        let cams = filter_devices(&devices, Some("ip_camera"), Some("online"), None);
        assert_eq!(cams.len(), 7);
        let offline = filter_devices(&devices, None, Some("offline"), None);
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].device_id, "ca003");
    }

    #[test]
    fn test_keyword_matches_id_name_location() {
        let devices = fixture_devices();
        assert_eq!(filter_devices(&devices, None, None, Some(" NV ")).len(), 2);
        assert_eq!(filter_devices(&devices, None, None, Some("走廊")).len(), 3);
        assert_eq!(filter_devices(&devices, None, None, Some("小会议室a")).len(), 1);
    }

    #[test]
    fn test_empty_filters_return_all() {
        let devices = fixture_devices();
        assert_eq!(filter_devices(&devices, Some(""), None, Some("  ")).len(), 10);
    }

    #[test]
    fn test_find() {
        let devices = fixture_devices();
        assert_eq!(find_by_id(&devices, "nv002").unwrap().channels, Some(32));
        assert!(find_by_id(&devices, "device_1").is_none());
        assert_eq!(find_by_name(&devices, "nvr").unwrap().device_id, "nv001");
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(&fixture_devices()[0]).unwrap();
        assert_eq!(json["type"], "ip_camera");
        assert_eq!(json["rtsp_url"], "rtsp://192.168.1.101:554/stream1");
        assert!(json.get("channels").is_none());
    }
}
