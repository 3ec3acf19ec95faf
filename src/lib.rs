/*!
 # BanlanX (SPTech) LED Controller Library

 A Rust library for identifying and driving BanlanX "SP" addressable LED
 controllers. Network models (SP530E, SP538E, SP548E, ...) are reached over
 TCP, Bluetooth models (SP630E, SP64xE, ...) over BLE.

 ## Features

 * Model registry: resolve a raw model code or advertised name to a
   fully parameterized [`ProtocolModel`]
 * Light type (wiring) catalog with per-mode effect tables
 * Network and BLE device sessions speaking the SPTech frame protocol
 * Update coordinator with per-device locking, lifecycle-aware retries
   and trailing-edge refresh debouncing
 * UDP discovery of network controllers

 ## Example

 ```rust,no_run
 use banlanx_led_controller::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     tracing_subscriber::fmt::init();

     let registry = Registry::builtin();
     let Some(model) = registry.match_model_code(0x4E) else {
         return Err(Error::UnsupportedModel("0x4e".into()));
     };

     let settings = Settings::default();
     let session = NetSession::new("192.168.1.50", "Kitchen", model, &settings);
     let (_entry, lifecycle) = tokio::sync::watch::channel(EntryState::Loaded);
     let coordinator = UpdateCoordinator::new(session, lifecycle, &settings);

     coordinator.refresh(EntryContext::loaded()).await.ok();
     println!("{:?}", coordinator.state());
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the BanlanX LED controller library
#[derive(Error, Debug)]
pub enum Error {
    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// No compatible LED device found
    #[error("No compatible LED device found")]
    NoCompatibleDevice,

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// BLE communication error
    #[error("BLE communication error: {0}")]
    BleError(String),

    /// The device did not answer in time
    #[error("Timed out after {0} attempts")]
    Timeout(u8),

    /// Malformed or unexpected frame from the device
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Value out of range
    #[error("Value {0} out of range ({1}..={2})")]
    ValueOutOfRange(u32, u32, u32),

    /// Model code or name not present in the registry
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// The requested mode, effect or light type does not exist for this device
    #[error("Unsupported setting: {0}")]
    Unsupported(String),

    /// The session has not received a status report yet
    #[error("Device state unknown, no status received yet")]
    StateUnknown,

    /// Invalid settings file
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket level error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error from btleplug
    #[error(transparent)]
    BtlePlugError(#[from] btleplug::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod chips;
pub mod coordinator;
pub mod device;
pub mod discovery;
pub mod effects;
pub mod light_type;
pub mod model;
pub mod models;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod settings;

pub use chips::ChipOrder;
pub use coordinator::{
    Debouncer, EntryContext, EntryState, ListenerGuard, UpdateCoordinator, UpdateError,
    UpdateStatus,
};
pub use device::BleSession;
pub use discovery::{Discovery, NetScanner};
pub use effects::{Effect, EffectKind, EffectMode, EffectTable};
pub use light_type::{LightConfig, LightConfigBuilder};
pub use model::{ModelFamily, ProtocolModel, Signature, Transport, TransportParams};
pub use net::NetSession;
pub use registry::Registry;
pub use session::{DeviceSession, DeviceState, LightControl};
pub use settings::Settings;
