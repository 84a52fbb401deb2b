/*!
# Warden DevKit - test doubles for the kernel

- `MockBroker`: records signals as the MQTT messages they would become
- `StubConnection`: scripted refresh transport
- `FlakyStore`: document store whose writes can be made to fail
- `SnapshotBuilder`: site status payloads
- `TestHarness`: a `SiteService` over memory stores, the mock broker and the
  stub connection
*/

pub mod broker_stub;
pub mod connection_stub;
pub mod snapshot_builder;
pub mod store_stub;
pub mod test_utils;

pub use broker_stub::{MockBroker, MockMessage};
pub use connection_stub::StubConnection;
pub use snapshot_builder::SnapshotBuilder;
pub use store_stub::FlakyStore;
pub use test_utils::TestHarness;
