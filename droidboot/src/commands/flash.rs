// Licensed under the Apache-2.0 license

//! `flash <target>` handlers. The request payload is the image.

use crate::device::DeviceContext;
use crate::dispatch::{CommandRegistry, Reply, Request};
use crate::error::{ErrorKind, FlashError, FlashResult};
use crate::modem::ModemOperation;
use crate::scratch::ScratchFile;
use crate::slot::SlotSelector;
use log::info;
use osip::Attributes;
use std::path::PathBuf;

/// Flash targets written straight into the OSIP slot of the same name.
pub const NAMED_SLOTS: [&str; 4] = ["boot", "recovery", "fastboot", "uefi"];

pub const MODEM_TARGETS: [&str; 8] = [
    "radio",
    "radio_no_end_reboot",
    "radio_fuse",
    "radio_fuse_only",
    "radio_erase_all",
    "rnd_read",
    "rnd_erase",
    "radio_hwid",
];

pub fn register(registry: &mut CommandRegistry<DeviceContext>) -> FlashResult<()> {
    for slot in NAMED_SLOTS {
        registry.register(&format!("flash {slot}"), move |dev, req| {
            flash_slot(dev, SlotSelector::Name(slot), req)
        })?;
    }
    registry.register("flash splashscreen", |dev, req| {
        flash_slot(dev, SlotSelector::Attribute(Attributes::SPLASHSCREEN), req)
    })?;
    registry.register("flash dnx", flash_dnx)?;
    registry.register("flash ifwi", flash_ifwi)?;

    for target in MODEM_TARGETS {
        let op = ModemOperation::for_target(target).ok_or_else(|| {
            FlashError::invalid_argument(format!("no modem operation for '{target}'"))
        })?;
        registry.register(&format!("flash {target}"), move |dev, req| {
            flash_modem(dev, &op, req)
        })?;
    }
    registry.register("flash radio_img", store_radio_image)?;
    registry.register("flash rnd_write", write_rnd_certificate)?;
    registry.register("flash token", flash_token)?;
    Ok(())
}

fn flash_slot(
    dev: &mut DeviceContext,
    selector: SlotSelector<'_>,
    req: &Request<'_>,
) -> FlashResult<Reply> {
    let index = dev.image_writer().write_selected(selector, req.payload)?;
    info!("Flashed {selector} into OSIP slot {index}");
    Ok(Reply::ok())
}

fn stage(path: PathBuf, data: &[u8], what: &str) -> FlashResult<ScratchFile> {
    ScratchFile::create(path.clone(), data).map_err(|e| {
        FlashError::io(format!("couldn't write {what} to {}: {e}", path.display()))
    })
}

/// Keeps the DnX loader for a later `flash ifwi`.
fn flash_dnx(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    let path = stage(dev.config.dnx_path(), req.payload, "dnx file")?.persist();
    info!("DnX loader staged at {}", path.display());
    Ok(Reply::ok())
}

fn flash_ifwi(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    dev.update_ifwi(req.payload, false)?;
    Ok(Reply::ok())
}

fn flash_modem(
    dev: &mut DeviceContext,
    op: &ModemOperation,
    req: &Request<'_>,
) -> FlashResult<Reply> {
    let image = stage(dev.config.radio_path(), req.payload, "radio image")?;
    run_modem(dev, &image, op)
}

fn run_modem(
    dev: &mut DeviceContext,
    image: &ScratchFile,
    op: &ModemOperation,
) -> FlashResult<Reply> {
    info!("Modem operation {op:?}");
    if op.writes_firmware() {
        info!("Rewriting modem firmware, do not power off");
    }
    let platform = &mut dev.platform;
    platform
        .modem
        .run(image.path(), op, platform.observer.as_mut())
        .map_err(|e| FlashError::io(format!("modem operation {op:?} failed: {e}")))?;
    Ok(Reply::ok())
}

/// Keeps the radio image for a later `flash rnd_write`.
fn store_radio_image(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    stage(dev.config.radio_path(), req.payload, "radio image")?.persist();
    Ok(Reply::with_message("Radio Image Saved"))
}

fn write_rnd_certificate(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    let radio_path = dev.config.radio_path();
    if !radio_path.exists() {
        return Err(FlashError::new(
            ErrorKind::PrerequisiteMissing,
            format!(
                "radio image {} not found, call flash radio_img first",
                radio_path.display()
            ),
        ));
    }
    let certificate = stage(dev.config.radio_rnd_path(), req.payload, "radio_rnd image")?;
    let image = ScratchFile::adopt(radio_path);
    let op = ModemOperation::WriteRndCertificate {
        certificate: certificate.path().to_path_buf(),
    };
    run_modem(dev, &image, &op)
}

fn flash_token(dev: &mut DeviceContext, req: &Request<'_>) -> FlashResult<Reply> {
    dev.platform
        .token
        .consume(req.payload)
        .map_err(|e| FlashError::io(format!("secure token rejected: {e}")))?;
    Ok(Reply::ok())
}
