//! Transport registry.
//!
//! Maps the `[transport] kind` string to a factory. Built-in transports are
//! registered by [`TransportRegistry::with_builtin`]; callers may add their
//! own before creating.

use std::collections::HashMap;

use exo_common::drive::DriveError;

use crate::transport::{
    DriveIdentity, GatewayTransport, LoopbackTransport, SimulatedGateway, Transport,
    TransportConfig,
};

/// Factory function creating a transport for one drive.
pub type TransportFactory =
    fn(&TransportConfig, DriveIdentity) -> Result<Box<dyn Transport>, DriveError>;

pub struct TransportRegistry {
    factories: HashMap<&'static str, TransportFactory>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding `gateway`, `loopback` and `simulation`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("gateway", |config, _| {
            let transport = GatewayTransport::connect(&config.gateway_address, config.timeout())?;
            Ok(Box::new(transport))
        });
        registry.register("loopback", |_, _| Ok(Box::new(LoopbackTransport::new())));
        registry.register("simulation", |config, identity| {
            Ok(Box::new(SimulatedGateway::new(
                identity,
                config.simulation.clone(),
            )))
        });
        registry
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn register(&mut self, name: &'static str, factory: TransportFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Create the transport named by `config.kind`.
    ///
    /// # Errors
    /// `DriveError::TransportNotFound` for unknown names; factory errors otherwise.
    pub fn create(
        &self,
        config: &TransportConfig,
        identity: DriveIdentity,
    ) -> Result<Box<dyn Transport>, DriveError> {
        let factory = self
            .factories
            .get(config.kind.as_str())
            .ok_or_else(|| DriveError::TransportNotFound(config.kind.clone()))?;
        factory(config, identity)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
