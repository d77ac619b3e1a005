//! `adb devices -l` 输出解析
//!
//! 每行格式：`<serial> <state> [key:value ...]`，例如
//!
//! ```text
//! List of devices attached
//! 1WMHH815K10234         device usb:1-1 product:hollywood model:Quest_2 device:hollywood transport_id:3
//! 1WMHH815K10235         unauthorized usb:1-2 transport_id:4
//! ```

use alvr_usb_core::DeviceRecord;

/// 解析设备列表，忽略标题行和 `* daemon ...` 提示行
pub fn parse_devices(output: &str) -> Vec<DeviceRecord> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<DeviceRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('*') || line.starts_with("List of devices") {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let serial = tokens.next()?;
    let state = tokens.next().unwrap_or_default();

    let mut record = DeviceRecord {
        serial: serial.to_string(),
        state: state.to_string(),
        ..DeviceRecord::default()
    };

    for token in tokens {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        match key {
            "product" => record.product = value.to_string(),
            "model" => record.model_name = value.to_string(),
            "device" => record.display_name = value.to_string(),
            _ => {},
        }
    }

    Some(record)
}
