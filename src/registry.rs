//! Process-wide provider ownership.

use log::warn;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::provider::{DeviceFilter, RgbDeviceProvider};

/// Owner of at most one provider per vendor.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn RgbDeviceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a provider, rejecting a second one for the same vendor.
    pub fn register(&mut self, provider: Box<dyn RgbDeviceProvider>) -> Result<()> {
        if self.get(provider.vendor()).is_some() {
            return Err(Error::DuplicateProvider(provider.vendor().into()));
        }

        self.providers.push(provider);

        Ok(())
    }

    pub fn get(&self, vendor: &str) -> Option<&dyn RgbDeviceProvider> {
        self.providers.iter().find(|provider| provider.vendor() == vendor).map(|provider| &**provider)
    }

    pub fn get_mut(&mut self, vendor: &str) -> Option<&mut (dyn RgbDeviceProvider + 'static)> {
        self.providers
            .iter_mut()
            .find(|provider| provider.vendor() == vendor)
            .map(|provider| &mut **provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn RgbDeviceProvider> {
        self.providers.iter().map(|provider| &**provider)
    }

    /// Devices of every provider.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.providers.iter().flat_map(|provider| provider.devices())
    }

    /// Initialize every provider.
    ///
    /// Returns the number of providers that are ready. With `throw_on_error` the first failure
    /// aborts the remaining initializations.
    pub fn initialize_all(&mut self, filter: &DeviceFilter, throw_on_error: bool) -> Result<usize> {
        let mut ready = 0;

        for provider in &mut self.providers {
            if provider.initialize(filter, throw_on_error)? {
                ready += 1;
            } else {
                warn!("{} provider is unavailable", provider.vendor());
            }
        }

        Ok(ready)
    }

    /// Dispose every provider, even if some of them fail.
    pub fn dispose_all(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        for mut provider in self.providers.drain(..) {
            if let Err(err) = provider.dispose() {
                errors.push(err);
            }
        }

        Error::from_disposal(errors)
    }
}

impl Drop for ProviderRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.dispose_all() {
            warn!("{}", err);
        }
    }
}
