use super::*;
use crate::catalog::{remote_span_plan, span_session_from_vlan};

impl<C: Connector> Fleet<C> {
    /// Mirrors `source_interface` on `source_device` to `destination_interface`
    /// on `destination_device` over `vlan`.
    ///
    /// The fleet is discovered first, then the monitor session derived from
    /// `vlan` is cleared on every known device. Returns the resulting monitor
    /// sessions across the fleet.
    pub async fn configure_remote_span(
        &mut self,
        source_device: &str,
        source_interface: &str,
        destination_device: &str,
        destination_interface: &str,
        vlan: &str,
    ) -> Result<Vec<Record>, ConnectError> {
        let plan = remote_span_plan(
            source_device,
            source_interface,
            destination_device,
            destination_interface,
            vlan,
        )?;
        let session = span_session_from_vlan(vlan)?;

        self.discover().await;
        self.dispatch(&Operation::ClearRemoteSpan { session }).await;
        for (device, operation) in plan {
            self.execute_on_device(&device, &operation).await?;
        }
        info!(
            "Monitor session {} mirrors {}:{} to {}:{}",
            session, source_device, source_interface, destination_device, destination_interface
        );
        Ok(self.execute_on_all(&Operation::ShowSpan).await)
    }

    /// Discovers the fleet and removes the monitor session for `vlan` from
    /// every device.
    pub async fn clear_remote_span(&mut self, vlan: &str) -> Result<Vec<Record>, ConnectError> {
        let session = span_session_from_vlan(vlan)?;
        self.discover().await;
        self.dispatch(&Operation::ClearRemoteSpan { session }).await;
        Ok(self.execute_on_all(&Operation::ShowSpan).await)
    }
}
