use super::*;

/// Canonical sort key for a patch-panel label.
///
/// Labels are split at `-` or `.` and numeric parts are zero-padded to
/// two digits, so `A-2.10` sorts after `A-2.9`.
pub fn normalize_patch_id(patch_id: &str) -> String {
    patch_id
        .split(['-', '.'])
        .map(|part| match part.parse::<u64>() {
            Ok(number) if part.bytes().all(|b| b.is_ascii_digit()) => format!("{number:02}"),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join("-")
}

impl<C: Connector> Fleet<C> {
    /// Discovers the fleet and lists every patched port, ordered by patch label.
    pub async fn available_patch_ports(&mut self) -> Vec<Record> {
        self.discover().await;
        let mut ports = self.execute_on_all(&Operation::ShowInterfaceVlan).await;
        ports.sort_by_cached_key(|port| {
            normalize_patch_id(port.get("patchid").unwrap_or_default())
        });
        ports
    }

    /// VLANs configured on `device`, plus the `dynamic` and `trunk` pseudo-VLANs
    /// accepted by [`Fleet::configure_interface_vlan`].
    pub async fn available_vlans(&self, device: &str) -> Result<Vec<Record>, ConnectError> {
        let mut vlans = self.execute_on_device(device, &Operation::ShowVlan).await?;
        for pseudo in ["dynamic", "trunk"] {
            vlans.push(
                [
                    ("vlanid", pseudo),
                    ("vlanname", pseudo),
                    ("vlanstatus", "software-generated"),
                    (crate::catalog::HOSTNAME, device),
                ]
                .into_iter()
                .collect(),
            );
        }
        Ok(vlans)
    }

    /// Puts `interface` on `device` into `vlan` and saves the configuration.
    ///
    /// `vlan` is either a VLAN id or `trunk`. Both commands run on one session.
    pub async fn configure_interface_vlan(
        &self,
        device: &str,
        interface: &str,
        vlan: &str,
    ) -> Result<Vec<Record>, ConnectError> {
        let change = if vlan == "trunk" {
            Operation::SetInterfaceTrunk {
                interface: interface.to_string(),
            }
        } else {
            Operation::SetInterfaceVlan {
                interface: interface.to_string(),
                vlan: vlan.to_string(),
            }
        };

        let mut shell = self.connector.connect(device).await?;
        let result = async {
            let mut records = change.run(&mut shell).await?;
            records.extend(Operation::SaveConfig.run(&mut shell).await?);
            Ok::<_, ConnectError>(records)
        }
        .await;
        if let Err(err) = shell.close().await {
            debug!("{}: close failed: {}", device, err);
        }
        if result.is_ok() {
            info!("{}: {} set to vlan {}", device, interface, vlan);
        }
        result
    }
}
