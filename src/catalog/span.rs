//! Remote mirroring (RSPAN) session planning.

use super::operations::Operation;
use crate::error::ConnectError;

/// Maps a SPAN VLAN to a monitor session number in `1..=10`.
///
/// This is the one place a VLAN value is used as a number, so it is
/// validated as a decimal integer first.
pub fn span_session_from_vlan(vlan: &str) -> Result<u32, ConnectError> {
    let trimmed = vlan.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConnectError::InvalidVlan(vlan.to_string()));
    }
    let value: u64 = trimmed
        .parse()
        .map_err(|_| ConnectError::InvalidVlan(vlan.to_string()))?;
    Ok((value % 10) as u32 + 1)
}

/// Per-device operations that mirror `source_interface` on `source_device`
/// to `destination_interface` on `destination_device`.
///
/// On a single device the session connects the two interfaces directly.
/// Across devices the traffic is carried on the remote VLAN.
pub fn remote_span_plan(
    source_device: &str,
    source_interface: &str,
    destination_device: &str,
    destination_interface: &str,
    vlan: &str,
) -> Result<Vec<(String, Operation)>, ConnectError> {
    let session = span_session_from_vlan(vlan)?;
    let vlan = vlan.trim();

    if source_device == destination_device {
        return Ok(vec![(
            source_device.to_string(),
            Operation::RemoteSpan {
                session,
                source: format!("interface {source_interface}"),
                destination: format!("interface {destination_interface}"),
            },
        )]);
    }

    Ok(vec![
        (
            source_device.to_string(),
            Operation::RemoteSpan {
                session,
                source: format!("interface {source_interface}"),
                destination: format!("remote vlan {vlan}"),
            },
        ),
        (
            destination_device.to_string(),
            Operation::RemoteSpan {
                session,
                source: format!("remote vlan {vlan}"),
                destination: format!("interface {destination_interface}"),
            },
        ),
    ])
}
