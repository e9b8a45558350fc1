// Licensed under the Apache-2.0 license

use std::path::PathBuf;

/// A modem firmware download job. Each variant maps to exactly one flash
/// target, so unsupported combinations cannot be expressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModemOperation {
    /// Download the firmware; reboot the modem afterwards when `end_reboot`.
    Flash { end_reboot: bool },
    /// Download the firmware and read back the chip fusing parameters.
    FlashAndReadFuses,
    /// Read the chip fusing parameters only.
    ReadFuses,
    /// Erase the modem flash, then download the firmware.
    EraseAllAndFlash,
    ReadRndCertificate,
    WriteRndCertificate { certificate: PathBuf },
    EraseRndCertificate,
    ReadHardwareId,
}

impl ModemOperation {
    /// Operation behind a `flash <target>` command that takes the staged
    /// radio image as its only input.
    pub fn for_target(target: &str) -> Option<Self> {
        Some(match target {
            "radio" => ModemOperation::Flash { end_reboot: true },
            "radio_no_end_reboot" => ModemOperation::Flash { end_reboot: false },
            "radio_fuse" => ModemOperation::FlashAndReadFuses,
            "radio_fuse_only" => ModemOperation::ReadFuses,
            "radio_erase_all" => ModemOperation::EraseAllAndFlash,
            "rnd_read" => ModemOperation::ReadRndCertificate,
            "rnd_erase" => ModemOperation::EraseRndCertificate,
            "radio_hwid" => ModemOperation::ReadHardwareId,
            _ => return None,
        })
    }

    /// Whether the firmware image is written back to the modem.
    pub fn writes_firmware(&self) -> bool {
        matches!(
            self,
            ModemOperation::Flash { .. }
                | ModemOperation::FlashAndReadFuses
                | ModemOperation::EraseAllAndFlash
        )
    }
}

/// Events reported while a modem download runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    Booting,
    Synced,
    Downloading(String),
    Detail(String),
    Error(String),
    /// Percentage complete.
    Progress(u8),
    Version(String),
    /// Milestone of an engine operation such as an IFWI update.
    Status(String),
}
