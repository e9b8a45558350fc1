// Licensed under the Apache-2.0 license

//! The droidboot command set.

pub mod flash;
pub mod maintenance;

use crate::device::DeviceContext;
use crate::dispatch::CommandRegistry;
use crate::error::FlashResult;

pub fn register_all(registry: &mut CommandRegistry<DeviceContext>) -> FlashResult<()> {
    flash::register(registry)?;
    maintenance::register(registry)?;
    Ok(())
}
