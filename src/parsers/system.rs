use super::{text_or, to_record, ReportParser, STRUCTURED, UNKNOWN};
use crate::{error::ParseError, tree::RpcTree};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SoftwareInformation {
    pub hostname: String,
    pub model: String,
    pub version: String,
    pub serial_number: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceOsReport {
    pub software_information: SoftwareInformation,
    pub format: &'static str,
}

/// `get-software-information`
pub struct DeviceOsParser;

impl ReportParser for DeviceOsParser {
    fn root(&self) -> &'static str {
        "software-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        to_record(&DeviceOsReport {
            software_information: SoftwareInformation {
                hostname: text_or(root, &["host-name"], UNKNOWN),
                model: text_or(root, &["product-model"], UNKNOWN),
                version: text_or(
                    root,
                    &["junos-version", "package-information/comment"],
                    UNKNOWN,
                ),
                serial_number: text_or(root, &["serial-number"], UNKNOWN),
            },
            format: STRUCTURED,
        })
    }
}
