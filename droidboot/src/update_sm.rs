// Licensed under the Apache-2.0 license

//! IFWI update sequencing.
//!
//! The candidate image is staged to scratch storage, checked against the
//! version the device is running, then handed to the platform firmware in a
//! single privileged request. The staged image is removed on every exit
//! path. The DnX loader staged by `flash dnx` is a precondition and is left
//! in place.

use crate::error::{ErrorKind, FlashError, FlashResult};
use crate::modem::ProgressEvent;
use crate::platform::{PrivilegedChannel, ProgressObserver};
use crate::scratch::ScratchFile;
use crate::storage::BlockStorage;
use crate::version::{current_device_version, FirmwareInfoSource};
use core::mem::size_of;
use fw_version::{extract_version, is_update_compatible, VersionTuple};
use log::{debug, error, info};
use smlang::statemachine;
use std::path::PathBuf;
use zerocopy::little_endian::U32;
use zerocopy::{Immutable, IntoBytes, KnownLayout};

statemachine! {
    derive_states: [Debug, Clone],
    derive_events: [Clone, Debug],
    transitions: {
        *Idle + Stage / on_stage = Staged,
        Staged + Validate / on_validate = Validated,
        Validated + Commit / on_commit = Committed,
        Committed + Finish / on_finish = Done,

        Idle + Abort / on_abort = Failed,
        Staged + Abort / on_abort = Failed,
        Validated + Abort / on_abort = Failed,
        Committed + Abort / on_abort = Failed,
    }
}

/// Header of the firmware update request; the image follows it directly.
#[repr(C)]
#[derive(Clone, Copy, Debug, IntoBytes, Immutable, KnownLayout)]
pub struct UpdateInfo {
    pub size: U32,
    pub reset_after_update: U32,
    pub reserved: U32,
}

/// Value of the `size` field for an image of `len` bytes.
pub fn packet_size(len: usize) -> FlashResult<u32> {
    u32::try_from(len).map_err(|_| {
        FlashError::new(
            ErrorKind::OversizeImage,
            format!("IFWI image of {len} bytes does not fit an update request"),
        )
    })
}

pub fn update_packet(image: &[u8], reset_after_update: bool) -> FlashResult<Vec<u8>> {
    let info = UpdateInfo {
        size: U32::new(packet_size(image.len())?),
        reset_after_update: U32::new(reset_after_update as u32),
        reserved: U32::new(0),
    };
    let mut packet = Vec::with_capacity(size_of::<UpdateInfo>() + image.len());
    packet.extend_from_slice(info.as_bytes());
    packet.extend_from_slice(image);
    Ok(packet)
}

/// The candidate image while an update runs.
#[derive(Debug)]
pub struct StagedImage {
    file: ScratchFile,
    pub version: Option<VersionTuple>,
}

pub struct InnerContext<'a> {
    pub image: &'a [u8],
    pub reset_after_update: bool,
    pub ifwi_path: PathBuf,
    pub dnx_path: PathBuf,
    storage: &'a mut dyn BlockStorage,
    firmware_info: &'a mut dyn FirmwareInfoSource,
    channel: &'a mut dyn PrivilegedChannel,
    observer: &'a mut dyn ProgressObserver,
    pub staged: Option<StagedImage>,
    pub device_version: Option<VersionTuple>,
    /// Set once the privileged request has been issued.
    pub committed: bool,
    pub error: Option<FlashError>,
}

impl InnerContext<'_> {
    fn status(&mut self, msg: String) {
        self.observer.notify(&ProgressEvent::Status(msg));
    }

    /// Records why the current step failed.
    fn fail(&mut self, err: FlashError) -> Result<(), ()> {
        error!("IFWI update: {err}");
        self.observer.notify(&ProgressEvent::Error(err.to_string()));
        self.error = Some(err);
        Err(())
    }
}

#[allow(clippy::result_unit_err)]
pub trait StateMachineActions {
    fn on_stage(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        match ScratchFile::create(ctx.ifwi_path.clone(), ctx.image) {
            Ok(file) => {
                ctx.staged = Some(StagedImage {
                    file,
                    version: None,
                });
                ctx.status(format!("IFWI image staged ({} bytes)", ctx.image.len()));
                Ok(())
            }
            Err(e) => ctx.fail(FlashError::io(format!(
                "unable to stage IFWI image at {}: {e}",
                ctx.ifwi_path.display()
            ))),
        }
    }

    fn on_validate(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        if !ctx.dnx_path.exists() {
            return ctx.fail(FlashError::new(
                ErrorKind::PrerequisiteMissing,
                "dnx binary must be flashed to the board first",
            ));
        }

        let staged = match ctx.staged.as_ref().map(|s| s.file.read()) {
            Some(Ok(data)) => data,
            Some(Err(e)) => return ctx.fail(e.into()),
            None => return ctx.fail(FlashError::io("no staged IFWI image")),
        };
        let image_version = match extract_version(&staged) {
            Ok(v) => v,
            Err(e) => return ctx.fail(e.into()),
        };
        let device_version = match current_device_version(&mut *ctx.firmware_info) {
            Ok(v) => v,
            Err(e) => return ctx.fail(e),
        };
        if let Some(staged) = ctx.staged.as_mut() {
            staged.version = Some(image_version);
        }
        ctx.device_version = Some(device_version);

        if !is_update_compatible(&image_version, &device_version) {
            return ctx.fail(FlashError::new(
                ErrorKind::IncompatibleVersion,
                format!(
                    "IFWI major versions differ (file={:02X} current={:02X})",
                    image_version.major, device_version.major
                ),
            ));
        }
        ctx.status(format!(
            "IFWI version {} accepted over {}",
            image_version.version(),
            device_version.version()
        ));
        Ok(())
    }

    fn on_commit(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        let packet = match update_packet(ctx.image, ctx.reset_after_update) {
            Ok(packet) => packet,
            Err(e) => return ctx.fail(e),
        };
        info!(
            "update_ifwi_image -- size: {} reset: {}",
            ctx.image.len(),
            ctx.reset_after_update as u32
        );
        if let Err(e) = ctx.storage.sync() {
            return ctx.fail(e.into());
        }
        ctx.committed = true;
        if let Err(e) = ctx.channel.submit(&packet) {
            return ctx.fail(FlashError::io(format!("DEVICE_FW_UPGRADE failed: {e}")));
        }
        ctx.status("IFWI update request accepted".to_string());
        Ok(())
    }

    fn on_finish(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        ctx.staged = None;
        Ok(())
    }

    fn on_abort(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        ctx.staged = None;
        Ok(())
    }
}

pub struct DefaultActions;
impl StateMachineActions for DefaultActions {}

pub struct Context<'a, T: StateMachineActions> {
    inner: T,
    pub inner_ctx: InnerContext<'a>,
}

impl<'a, T: StateMachineActions> Context<'a, T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actions: T,
        image: &'a [u8],
        reset_after_update: bool,
        ifwi_path: PathBuf,
        dnx_path: PathBuf,
        storage: &'a mut dyn BlockStorage,
        firmware_info: &'a mut dyn FirmwareInfoSource,
        channel: &'a mut dyn PrivilegedChannel,
        observer: &'a mut dyn ProgressObserver,
    ) -> Self {
        Self {
            inner: actions,
            inner_ctx: InnerContext {
                image,
                reset_after_update,
                ifwi_path,
                dnx_path,
                storage,
                firmware_info,
                channel,
                observer,
                staged: None,
                device_version: None,
                committed: false,
                error: None,
            },
        }
    }
}

macro_rules! delegate_to_inner_action {
    ($($fn_name:ident),* $(,)?) => {
        $(
            fn $fn_name(&mut self) -> Result<(), ()> {
                debug!("IFWI update action: {}", stringify!($fn_name));
                self.inner.$fn_name(&mut self.inner_ctx)
            }
        )*
    };
}

impl<T: StateMachineActions> StateMachineContext for Context<'_, T> {
    delegate_to_inner_action! {
        on_stage,
        on_validate,
        on_commit,
        on_finish,
        on_abort,
    }
}

/// Drives one update from `Idle` to `Done`, or to `Failed` on the first
/// step that fails. There is no retry.
pub fn run<T: StateMachineActions>(sm: &mut StateMachine<Context<'_, T>>) -> FlashResult<()> {
    for event in [
        Events::Stage,
        Events::Validate,
        Events::Commit,
        Events::Finish,
    ] {
        debug!("IFWI update state {:?} + {:?}", sm.state(), event);
        if sm.process_event(event).is_err() {
            if sm.process_event(Events::Abort).is_err() {
                error!("IFWI update could not abort from {:?}", sm.state());
            }
            let err = sm
                .context_mut()
                .inner_ctx
                .error
                .take()
                .unwrap_or_else(|| FlashError::io("IFWI update step failed"));
            return Err(err);
        }
    }
    info!("IFWI update done");
    Ok(())
}
