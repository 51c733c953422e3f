//! Chip type and family detection.

use super::{ChipKey, NtPort, PlxFamily, Variant, PLX_VENDOR_ID};
use crate::{PlxError, PlxResult};
use plx_hal::RegisterSpace;

/// Config offsets that may hold the hard-coded chip ID of NT ports.
const NT_ID_OFFSETS: [usize; 3] = [0xE0, 0x958, 0xB78];
/// The VSEC of the DMA function.
const DMA_ID_OFFSETS: [usize; 1] = [0xB78];

/// Chips whose hard-coded ID carries no usable revision.
const KEEP_PCI_REVISION: [u16; 6] = [0x8612, 0x8616, 0x8624, 0x8632, 0x8647, 0x8648];

/// BAR registers of the 9000 hard-coded ID and revision.
pub(super) const P9000_ID_REG: usize = 0x70;
pub(super) const P9000_REV_REG: usize = 0x74;

/// Family table of the 8000 series.
static FAMILIES: &[(PlxFamily, &[u16])] = &[
    (PlxFamily::Altair, &[0x8525, 0x8533, 0x8547, 0x8548]),
    (PlxFamily::AltairXl, &[0x8505, 0x8509]),
    (PlxFamily::Vega, &[0x8516, 0x8524, 0x8532]),
    (PlxFamily::VegaLite, &[0x8508, 0x8512, 0x8517, 0x8518]),
    (
        PlxFamily::Deneb,
        &[0x8612, 0x8616, 0x8624, 0x8632, 0x8647, 0x8648],
    ),
    (
        PlxFamily::Sirius,
        &[
            0x8604, 0x8606, 0x8608, 0x8609, 0x8613, 0x8614, 0x8615, 0x8617, 0x8618, 0x8619,
        ],
    ),
    (
        PlxFamily::Cygnus,
        &[0x8625, 0x8636, 0x8649, 0x8664, 0x8680, 0x8696],
    ),
    (PlxFamily::Scout, &[0x8700]),
    // revision AA is Draco 1, anything later Draco 2
    (
        PlxFamily::Draco1,
        &[0x8712, 0x8716, 0x8724, 0x8732, 0x8747, 0x8748],
    ),
    (
        PlxFamily::Draco2,
        &[0x8713, 0x8717, 0x8725, 0x8733, 0x8749],
    ),
    (
        PlxFamily::Capella1,
        &[0x8714, 0x8718, 0x8734, 0x8750, 0x8764, 0x8780, 0x8796],
    ),
    (
        PlxFamily::Capella2,
        &[0x8715, 0x8719, 0x8735, 0x8751, 0x8765, 0x8781, 0x8797],
    ),
];

/// Family of an 8000 series chip.
pub fn family_of(chip: u16, revision: u8) -> PlxFamily {
    if chip == 0 {
        return PlxFamily::None;
    }
    let family = FAMILIES
        .iter()
        .find(|(_, chips)| chips.contains(&chip))
        .map(|(family, _)| *family);
    match family {
        Some(PlxFamily::Draco1) if revision != 0xAA => PlxFamily::Draco2,
        Some(family) => family,
        None => PlxFamily::Unknown,
    }
}

/// Fill in the PLX chip, revision and family of `key` from what config
/// space tells.
///
/// The 9000 series keeps its hard-coded ID in a BAR register, so for those
/// chips only a provisional type is set here and the rest is done by
/// [`identify_9000`] once the BAR is mapped.
pub fn detect(key: &mut ChipKey, config: &dyn RegisterSpace) -> PlxResult {
    match key.variant {
        Variant::Plx8000Dma => detect_8000(key, config, &DMA_ID_OFFSETS)?,
        Variant::Plx8000Nt => {
            detect_8000(key, config, &NT_ID_OFFSETS)?;
            key.nt_port = NtPort::Unknown;
        }
        Variant::Plx6000Nt => detect_6000(key)?,
        Variant::Plx9000 => {
            key.plx_chip = key.device_id;
            key.plx_revision = key.revision;
            key.plx_family = PlxFamily::BridgeP2L;
        }
        Variant::Plx9050 | Variant::Plx9030 => {
            // no hard-coded ID register
            key.plx_chip = if key.variant == Variant::Plx9030 {
                0x9030
            } else {
                0x9050
            };
            key.plx_revision = 0xAA;
            key.plx_family = PlxFamily::BridgeP2L;
        }
    }
    info!(
        "PLX chip {:04x} rev {:02x} family {:?} ({:04x}:{:04x})",
        key.plx_chip, key.plx_revision, key.plx_family, key.vendor_id, key.device_id
    );
    Ok(())
}

fn detect_8000(key: &mut ChipKey, config: &dyn RegisterSpace, offsets: &[usize]) -> PlxResult {
    let hard_coded = offsets.iter().find_map(|&offset| {
        let id = config.read32(offset);
        if id & 0xFFFF == PLX_VENDOR_ID as u32 {
            Some((offset, id))
        } else {
            None
        }
    });
    match hard_coded {
        Some((offset, id)) => {
            key.plx_chip = (id >> 16) as u16;
            key.plx_revision = if KEEP_PCI_REVISION.contains(&key.plx_chip) {
                key.revision
            } else {
                config.read32(offset + 4) as u8
            };
        }
        None if key.vendor_id != PLX_VENDOR_ID => {
            warn!(
                "no PLX ID found for {:04x}:{:04x}",
                key.vendor_id, key.device_id
            );
            return Err(PlxError::INVALID_OBJECT);
        }
        None => {
            key.plx_chip = key.device_id;
            key.plx_revision = key.revision;
        }
    }
    key.plx_family = family_of(key.plx_chip, key.plx_revision);
    Ok(())
}

fn detect_6000(key: &mut ChipKey) -> PlxResult {
    let id = (key.device_id as u32) << 16 | key.vendor_id as u32;
    let (chip, bb_revision) = match id {
        0x0021_3388 => (0x6254, 4),
        0x0029_3388 | 0x6541_10B5 | 0x6542_10B5 => (0x6540, 2),
        _ => return Err(PlxError::INVALID_OBJECT),
    };
    key.plx_chip = chip;
    key.plx_revision = if key.revision == bb_revision {
        0xBB
    } else {
        key.revision
    };
    key.plx_family = PlxFamily::BridgePciP2P;
    Ok(())
}

/// Read the hard-coded ID of a 9000 series bridge from its BAR.
pub fn identify_9000(key: &mut ChipKey, bar: &dyn RegisterSpace) {
    let id = bar.read32(P9000_ID_REG);
    if id & 0xFFFF == PLX_VENDOR_ID as u32 {
        key.plx_chip = (id >> 16) as u16;
        key.plx_revision = bar.read32(P9000_REV_REG) as u8;
    } else {
        key.plx_chip = key.device_id;
        key.plx_revision = key.revision;
    }
    key.plx_family = PlxFamily::BridgeP2L;
}
