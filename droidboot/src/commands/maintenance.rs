// Licensed under the Apache-2.0 license

//! `maintenance <command> [args]` handlers.

use crate::device::DeviceContext;
use crate::dispatch::{CommandRegistry, Reply, Request};
use crate::error::{FlashError, FlashResult};
use crate::modem::ProgressEvent;
use crate::platform::RebootTarget;
use fw_version::Component;
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Longest mount point accepted by `erase`.
pub const MAX_MOUNT_POINT_LEN: usize = 49;
/// Longest value accepted by `dnx_timeout --set`.
pub const MAX_TIMEOUT_LEN: usize = 19;

const PROXY_PROPERTY: &str = "service.proxy.enable";
const COLD_BOOT_PROPERTY: &str = "sys.forcecoldboot";
const PRODUCT_NAME_PROPERTY: &str = "ro.product.name";

pub fn register(registry: &mut CommandRegistry<DeviceContext>) -> FlashResult<()> {
    registry.register("maintenance erase", erase)?;
    registry.register("maintenance repart", repart)?;
    registry.register("maintenance dnx_timeout", dnx_timeout)?;
    registry.register("maintenance proxy", proxy)?;
    registry.register("maintenance nvm", nvm)?;
    registry.register("maintenance uniqueid", uniqueid)?;
    registry.register("maintenance sysinfo", sysinfo)?;
    registry.register("maintenance reboot", |dev, req| {
        reboot(dev, req, RebootTarget::Android)
    })?;
    registry.register("maintenance continue", |dev, req| {
        reboot(dev, req, RebootTarget::Android)
    })?;
    registry.register("maintenance reboot-bootloader", |dev, req| {
        reboot(dev, req, RebootTarget::Bootloader)
    })?;
    Ok(())
}

fn usage(text: &str) -> FlashError {
    FlashError::invalid_argument(format!("usage: maintenance {text}"))
}

/// Mount point erased by `erase <partition>`.
pub fn mount_point(partition: &str) -> FlashResult<String> {
    let mount = if partition.starts_with('/') {
        partition.to_string()
    } else if partition == "userdata" {
        "/data".to_string()
    } else {
        format!("/{partition}")
    };
    if mount.len() > MAX_MOUNT_POINT_LEN {
        return Err(FlashError::invalid_argument(format!(
            "mount point '{mount}' exceeds {MAX_MOUNT_POINT_LEN} characters"
        )));
    }
    Ok(mount)
}

fn erase(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    let [partition] = req.args else {
        return Err(usage("erase <partition>"));
    };
    let mount = mount_point(partition)?;
    info!("CMD 'erase {mount}'...");

    let buffer_size = dev.config.erase_buffer_size;
    let platform = &mut dev.platform;
    platform
        .observer
        .notify(&ProgressEvent::Status("ERASE step 1/2...".to_string()));
    platform
        .volumes
        .nuke(&mount, buffer_size)
        .map_err(|e| FlashError::io(format!("nuke_volume failed: {mount}: {e}")))?;
    platform
        .observer
        .notify(&ProgressEvent::Status("ERASE step 2/2...".to_string()));
    platform
        .volumes
        .format(&mount)
        .map_err(|e| FlashError::io(format!("format_volume failed: {mount}: {e}")))?;
    info!("format_volume succeeds: {mount}");
    Ok(Reply::ok())
}

fn repart(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    if !req.args.is_empty() {
        return Err(usage("repart (takes no arguments)"));
    }
    dev.platform
        .partitioner
        .create_partitions()
        .map_err(|e| FlashError::io(format!("cannot write partition: {e}")))?;
    Ok(Reply::ok())
}

fn read_timeout(file: &mut fs::File) -> FlashResult<String> {
    let mut raw = Vec::new();
    file.take(MAX_TIMEOUT_LEN as u64 + 1).read_to_end(&mut raw)?;
    if raw.is_empty() {
        return Err(FlashError::io("failed to read DnX timeout"));
    }
    let value = String::from_utf8_lossy(&raw);
    Ok(value.trim_end_matches('\n').to_string())
}

fn open_timeout(path: &Path) -> FlashResult<fs::File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| FlashError::io(format!("can't open {}: {e}", path.display())))
}

fn dnx_timeout(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    match req.args {
        ["--get"] => {
            let mut file = open_timeout(&dev.config.dnx_timeout)?;
            Ok(Reply::with_message(read_timeout(&mut file)?))
        }
        ["--set", value] => {
            if value.is_empty() || value.len() > MAX_TIMEOUT_LEN {
                return Err(FlashError::invalid_argument(format!(
                    "timeout value '{value}' must be 1 to {MAX_TIMEOUT_LEN} characters"
                )));
            }
            let mut file = open_timeout(&dev.config.dnx_timeout)?;
            file.set_len(0)?;
            file.write_all(value.as_bytes())?;
            file.seek(SeekFrom::Start(0))?;
            let check = read_timeout(&mut file)?;
            if check != *value {
                return Err(FlashError::invalid_argument(format!(
                    "DnX timeout '{value}' was not accepted (reads back '{check}')"
                )));
            }
            info!("DnX timeout set to {value}");
            Ok(Reply::ok())
        }
        _ => Err(usage("dnx_timeout --get | --set <value>")),
    }
}

fn proxy(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    match req.args {
        ["start"] => {
            if !dev.config.hsi_port.exists() {
                return Err(FlashError::io(format!(
                    "fails to find HSI node: {}",
                    dev.config.hsi_port.display()
                )));
            }
            // no modem reset on parts exposing a fourth CPU
            if !dev.config.cpu3_node.exists() {
                info!("Reset modem");
                if let Err(e) = dev.platform.modem.reset() {
                    warn!("Modem reset failed: {e}");
                }
            }
            dev.platform.properties.set(PROXY_PROPERTY, "1")?;
        }
        ["stop"] => dev.platform.properties.set(PROXY_PROPERTY, "0")?,
        _ => return Err(usage("proxy start|stop")),
    }
    Ok(Reply::ok())
}

fn nvm(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    let nvm = &mut dev.platform.nvm;
    let output = match req.args {
        ["apply", path] => nvm.apply(Path::new(path)),
        ["applyzip", path] => nvm.apply_zip(Path::new(path)),
        ["identify"] => nvm.identify(),
        _ => return Err(usage("nvm apply <path> | applyzip <path> | identify")),
    }
    .map_err(|e| FlashError::io(format!("modem NVM operation failed: {e}")))?;
    Ok(Reply::with_message(output))
}

/// Hex dump, 16 bytes per line.
fn hex_dump(data: &[u8]) -> String {
    data.chunks(16)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join("\n")
}

fn uniqueid(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    if !req.args.is_empty() {
        return Err(usage("uniqueid (takes no arguments)"));
    }
    let key = dev
        .platform
        .token
        .unique_key()
        .map_err(|e| FlashError::io(format!("cannot get uniqueid: {e}")))?;
    let dump = hex_dump(&key);
    info!("{dump}");
    Ok(Reply::with_message(dump))
}

/// Value of `key=value` in a property file, upper-cased.
fn product_name(path: &Path) -> FlashResult<String> {
    let contents = fs::read_to_string(path)?;
    contents
        .lines()
        .find_map(|line| line.strip_prefix(PRODUCT_NAME_PROPERTY)?.strip_prefix('='))
        .map(|value| value.trim().to_uppercase())
        .ok_or_else(|| {
            FlashError::io(format!("{PRODUCT_NAME_PROPERTY} not set in {}", path.display()))
        })
}

fn sysinfo(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    let info = match req.args {
        ["ifwi"] => dev
            .device_versions()?
            .get(Component::Ifwi)
            .version()
            .to_string(),
        ["product"] => product_name(&dev.config.default_prop)?,
        ["serial"] => fs::read_to_string(&dev.config.usb_serial)?
            .trim()
            .to_string(),
        _ => return Err(usage("sysinfo ifwi|product|serial")),
    };
    Ok(Reply::with_message(info))
}

fn reboot(dev: &mut DeviceContext, req: &Request<'_>, target: RebootTarget) -> FlashResult<Reply> {
    if !req.args.is_empty() {
        return Err(usage("reboot, continue and reboot-bootloader take no arguments"));
    }
    let platform = &mut dev.platform;
    if target == RebootTarget::Android {
        // init cold boots the device when this is set
        platform.properties.set(COLD_BOOT_PROPERTY, "yes")?;
    }
    platform.power.sync();
    info!("Rebooting to {}", target.as_str());
    platform.power.reboot(target)?;
    Ok(Reply::ok())
}
