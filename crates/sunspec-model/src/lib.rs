#![allow(dead_code)]

pub mod layout;
pub mod vendor;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use types::{CanonicalMeasurements, DeviceInfo, OperatingState};

use layout::{reg, PointKind, BASE_ADDRESS, END_MODEL_ID, IMAGE_LENGTH, SUNSPEC_ID0, SUNSPEC_ID1};

/// SunSpec "not implemented" sentinel for unsigned points.
pub const NOT_IMPLEMENTED_U16: u16 = 0xFFFF;
/// SunSpec "not implemented" sentinel for signed points (0x8000).
pub const NOT_IMPLEMENTED_I16: u16 = i16::MIN as u16;
/// Sentinel for an unimplemented scale-factor point.
pub const NOT_IMPLEMENTED_SF: u16 = i16::MIN as u16;

/// Largest scale factor the encoder will escalate to before giving up.
const MAX_SCALE_FACTOR: i16 = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("register buffer too short at offset {offset}")]
    ShortBuffer { offset: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{value} not representable as {width:?} at any scale factor up to {max_sf}")]
pub struct EncodeRangeError {
    pub value: f64,
    pub width: IntWidth,
    pub max_sf: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    U16,
    I16,
}

impl IntWidth {
    fn sentinel(self) -> u16 {
        match self {
            Self::U16 => NOT_IMPLEMENTED_U16,
            Self::I16 => NOT_IMPLEMENTED_I16,
        }
    }
}

fn fits(value: f64, sf: i16, width: IntWidth) -> bool {
    let scaled = (value / 10f64.powi(sf.into())).round();
    match width {
        // 0xFFFF is the sentinel, so the largest encodable raw value is 65534.
        IntWidth::U16 => (0.0..=65_534.0).contains(&scaled),
        IntWidth::I16 => (-32_767.0..=32_767.0).contains(&scaled),
    }
}

/// Picks the smallest scale factor, starting at the precision the point
/// requires, at which every value of a shared-SF group fits its integer
/// width.
pub fn choose_scale(
    values: &[f64],
    precision_sf: i16,
    width: IntWidth,
) -> Result<i16, EncodeRangeError> {
    let mut sf = precision_sf;
    while sf <= MAX_SCALE_FACTOR {
        if values.iter().all(|v| fits(*v, sf, width)) {
            return Ok(sf);
        }
        sf += 1;
    }
    let worst = values
        .iter()
        .copied()
        .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
    Err(EncodeRangeError {
        value: worst,
        width,
        max_sf: MAX_SCALE_FACTOR,
    })
}

fn encode_at(value: f64, sf: i16, width: IntWidth) -> u16 {
    let scaled = (value / 10f64.powi(sf.into())).round();
    match width {
        IntWidth::U16 => scaled as u16,
        IntWidth::I16 => (scaled as i16) as u16,
    }
}

/// A point group encoded against one shared scale-factor register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaledGroup {
    pub raws: Vec<u16>,
    /// Raw value of the group's SF register.
    pub sf: u16,
}

/// Encodes a shared-scale-factor point group.
///
/// `None` members become the "not implemented" sentinel; an all-`None` group
/// gets a sentinel scale factor too. A group whose magnitude cannot be
/// represented at any usable scale factor clamps every member to the
/// sentinel and reports the error instead of wrapping, so a single absurd
/// reading never fails the poll.
pub fn encode_scaled_group(
    values: &[Option<f64>],
    precision_sf: i16,
    width: IntWidth,
) -> (ScaledGroup, Option<EncodeRangeError>) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return (
            ScaledGroup {
                raws: vec![width.sentinel(); values.len()],
                sf: NOT_IMPLEMENTED_SF,
            },
            None,
        );
    }

    match choose_scale(&present, precision_sf, width) {
        Ok(sf) => {
            let raws = values
                .iter()
                .map(|v| match v {
                    Some(v) => encode_at(*v, sf, width),
                    None => width.sentinel(),
                })
                .collect();
            (
                ScaledGroup {
                    raws,
                    sf: encode_sf(sf),
                },
                None,
            )
        }
        Err(err) => (
            ScaledGroup {
                raws: vec![width.sentinel(); values.len()],
                sf: NOT_IMPLEMENTED_SF,
            },
            Some(err),
        ),
    }
}

pub fn encode_sf(sf: i16) -> u16 {
    sf as u16
}

/// Applies a scale factor to a raw point value; sentinels decode to `None`.
pub fn decode_scaled(raw: u16, sf_raw: u16, width: IntWidth) -> Option<f64> {
    if sf_raw == NOT_IMPLEMENTED_SF {
        return None;
    }
    let sf = sf_raw as i16;
    let value = match width {
        IntWidth::U16 => {
            if raw == NOT_IMPLEMENTED_U16 {
                return None;
            }
            raw as f64
        }
        IntWidth::I16 => {
            if raw == NOT_IMPLEMENTED_I16 {
                return None;
            }
            (raw as i16) as f64
        }
    };
    Some(value * 10f64.powi(sf.into()))
}

/// Packs an ASCII string into `width` registers, truncating overlong input
/// and right-padding with NUL words.
pub fn encode_string(s: &str, width: usize) -> Vec<u16> {
    let mut bytes: Vec<u8> = s
        .bytes()
        .filter(|b| b.is_ascii() && *b != 0)
        .take(width * 2)
        .collect();
    bytes.resize(width * 2, 0);
    bytes
        .chunks(2)
        .map(|pair| ((pair[0] as u16) << 8) | pair[1] as u16)
        .collect()
}

/// Reverses [`encode_string`], trimming the NUL padding.
pub fn decode_string(words: &[u16]) -> String {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.push((word >> 8) as u8);
        bytes.push((word & 0xFF) as u8);
    }
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Splits a 32-bit value into two registers, high word first.
pub fn encode_u32(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

pub fn decode_u32(words: &[u16], offset: usize) -> Result<u32, DecodeError> {
    let hi = words
        .get(offset)
        .ok_or(DecodeError::ShortBuffer { offset })?;
    let lo = words
        .get(offset + 1)
        .ok_or(DecodeError::ShortBuffer { offset: offset + 1 })?;
    Ok(((*hi as u32) << 16) | *lo as u32)
}

/// Network-writable immediate-control points (model 123).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    /// Active-power ceiling as percent of the nameplate rating (0..=100).
    pub w_max_lim_pct: u16,
    /// Seconds after which an applied limit reverts on the device.
    pub w_max_lim_rvrt_tms: u16,
    /// Whether the limit is enforced.
    pub w_max_lim_ena: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            w_max_lim_pct: 100,
            w_max_lim_rvrt_tms: 0,
            w_max_lim_ena: false,
        }
    }
}

impl Controls {
    /// The limit the poll loop should push to the device, when enabled.
    pub fn active_limit_pct(&self) -> Option<u16> {
        self.w_max_lim_ena.then_some(self.w_max_lim_pct)
    }
}

/// The encoded SunSpec register block served to network clients.
///
/// Rebuilt wholesale from a measurement snapshot; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterImage {
    words: Vec<u16>,
}

impl RegisterImage {
    fn index(addr: u16) -> Option<usize> {
        addr.checked_sub(BASE_ADDRESS)
            .map(usize::from)
            .filter(|i| *i < IMAGE_LENGTH as usize)
    }

    /// Returns the span starting at `addr`, or `None` when any requested
    /// register falls outside the model.
    pub fn read(&self, addr: u16, count: u16) -> Option<&[u16]> {
        let start = Self::index(addr)?;
        let end = start.checked_add(count as usize)?;
        self.words.get(start..end)
    }

    pub fn get(&self, addr: u16) -> Option<u16> {
        Self::index(addr).map(|i| self.words[i])
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }
}

struct ImageWriter {
    words: Vec<u16>,
}

impl ImageWriter {
    fn new() -> Self {
        Self {
            words: vec![NOT_IMPLEMENTED_U16; IMAGE_LENGTH as usize],
        }
    }

    fn set(&mut self, addr: u16, value: u16) {
        if let Some(i) = RegisterImage::index(addr) {
            self.words[i] = value;
        }
    }

    fn set_words(&mut self, addr: u16, values: &[u16]) {
        for (offset, value) in values.iter().enumerate() {
            self.set(addr + offset as u16, *value);
        }
    }
}

/// Builds the complete served register block from the canonical state.
///
/// Pure: identical inputs yield an identical image. `device == None` leaves
/// the SunSpec marker cleared, so clients can tell "no device identified
/// yet" apart from a device reporting zeros.
pub fn build_image(
    device: Option<&DeviceInfo>,
    measurements: Option<&CanonicalMeasurements>,
    controls: &Controls,
    max_power_w: Option<u16>,
) -> RegisterImage {
    let mut image = ImageWriter::new();
    let placeholder;
    let info = match device {
        Some(info) => info,
        None => {
            placeholder = DeviceInfo::placeholder();
            &placeholder
        }
    };

    let marker = if device.is_some() {
        [SUNSPEC_ID0, SUNSPEC_ID1]
    } else {
        [0, 0]
    };
    image.set_words(reg::MARKER, &marker);

    image.set(layout::COMMON.addr, layout::COMMON.id);
    image.set(layout::COMMON.addr + 1, layout::COMMON.len);
    image.set_words(reg::MN, &encode_string(&info.manufacturer, 16));
    image.set_words(reg::MD, &encode_string(&info.model, 16));
    image.set_words(reg::OPT, &encode_string(&info.options, 8));
    image.set_words(reg::VR, &encode_string(&info.version, 8));
    image.set_words(reg::SN, &encode_string(&info.serial, 16));
    image.set(reg::DA, layout::SERVED_UNIT_ID);

    image.set(layout::INVERTER.addr, layout::INVERTER.id);
    image.set(layout::INVERTER.addr + 1, layout::INVERTER.len);
    encode_inverter_points(&mut image, measurements);

    image.set(layout::NAMEPLATE.addr, layout::NAMEPLATE.id);
    image.set(layout::NAMEPLATE.addr + 1, layout::NAMEPLATE.len);
    // DER type 4 = PV inverter.
    image.set(reg::DER_TYP, 4);
    match max_power_w {
        Some(watts) => {
            image.set(reg::W_RTG, watts);
            image.set(reg::W_RTG_SF, encode_sf(0));
        }
        None => {
            image.set(reg::W_RTG, NOT_IMPLEMENTED_U16);
            image.set(reg::W_RTG_SF, NOT_IMPLEMENTED_SF);
        }
    }

    image.set(layout::CONTROLS.addr, layout::CONTROLS.id);
    image.set(layout::CONTROLS.addr + 1, layout::CONTROLS.len);
    image.set(reg::W_MAX_LIM_PCT, controls.w_max_lim_pct);
    image.set(reg::W_MAX_LIM_PCT_RVRT_TMS, controls.w_max_lim_rvrt_tms);
    image.set(reg::W_MAX_LIM_ENA, controls.w_max_lim_ena as u16);
    image.set(reg::W_MAX_LIM_PCT_SF, encode_sf(0));

    image.set(reg::END, END_MODEL_ID);
    image.set(reg::END + 1, 0);

    RegisterImage { words: image.words }
}

fn encode_inverter_points(image: &mut ImageWriter, measurements: Option<&CanonicalMeasurements>) {
    let Some(m) = measurements else {
        // Nothing acquired yet: every point reads as its type's sentinel,
        // except the state which reports OFF as the device default.
        for p in layout::INVERTER.points {
            match p.kind {
                PointKind::I16 => image.set(p.addr, NOT_IMPLEMENTED_I16),
                PointKind::Sf => image.set(p.addr, NOT_IMPLEMENTED_SF),
                PointKind::Acc32 => image.set_words(p.addr, &[0, 0]),
                _ => {}
            }
        }
        image.set(reg::ST, OperatingState::Off.code());
        image.set_words(reg::EVT1, &[0, 0]);
        image.set_words(reg::EVT2, &[0, 0]);
        return;
    };

    let amps = Some(m.ac_current);
    let (currents, range_err) =
        encode_scaled_group(&[amps, amps, None, None], -2, IntWidth::U16);
    warn_clamped("A", range_err);
    image.set_words(reg::A, &currents.raws);
    image.set(reg::A_SF, currents.sf);

    let (volts, range_err) = encode_scaled_group(
        &[None, None, None, Some(m.ac_voltage), None, None],
        -1,
        IntWidth::U16,
    );
    warn_clamped("PhVphA", range_err);
    image.set_words(reg::PPV_AB, &volts.raws);
    image.set(reg::V_SF, volts.sf);

    let (power, range_err) = encode_scaled_group(&[Some(m.active_power)], 0, IntWidth::I16);
    warn_clamped("W", range_err);
    image.set(reg::W, power.raws[0]);
    image.set(reg::W_SF, power.sf);

    let (freq, range_err) = encode_scaled_group(&[m.frequency], -2, IntWidth::U16);
    warn_clamped("Hz", range_err);
    image.set(reg::HZ, freq.raws[0]);
    image.set(reg::HZ_SF, freq.sf);

    let (apparent, range_err) = encode_scaled_group(&[m.apparent_power], 0, IntWidth::I16);
    warn_clamped("VA", range_err);
    image.set(reg::VA, apparent.raws[0]);
    image.set(reg::VA_SF, apparent.sf);

    let (reactive, range_err) = encode_scaled_group(&[m.reactive_power], 0, IntWidth::I16);
    warn_clamped("VAr", range_err);
    image.set(reg::VAR, reactive.raws[0]);
    image.set(reg::VAR_SF, reactive.sf);

    image.set(reg::PF, NOT_IMPLEMENTED_I16);
    image.set(reg::PF_SF, NOT_IMPLEMENTED_SF);

    let energy = m.energy_wh.min(u32::MAX as u64);
    if energy != m.energy_wh {
        warn!(energy_wh = m.energy_wh, "energy accumulator clamped to 32 bits");
    }
    image.set_words(reg::WH, &encode_u32(energy as u32));
    image.set(reg::WH_SF, encode_sf(0));

    let (dc_amps, range_err) = encode_scaled_group(&[m.dc_current], -2, IntWidth::U16);
    warn_clamped("DCA", range_err);
    image.set(reg::DCA, dc_amps.raws[0]);
    image.set(reg::DCA_SF, dc_amps.sf);

    let (dc_volts, range_err) = encode_scaled_group(&[m.dc_voltage], -1, IntWidth::U16);
    warn_clamped("DCV", range_err);
    image.set(reg::DCV, dc_volts.raws[0]);
    image.set(reg::DCV_SF, dc_volts.sf);

    image.set(reg::DCW, NOT_IMPLEMENTED_I16);
    image.set(reg::DCW_SF, NOT_IMPLEMENTED_SF);

    for addr in reg::TMP_CAB..reg::TMP_SF {
        image.set(addr, NOT_IMPLEMENTED_I16);
    }
    image.set(reg::TMP_SF, NOT_IMPLEMENTED_SF);

    image.set(reg::ST, m.operating_state.code());
    image.set(reg::ST_VND, NOT_IMPLEMENTED_U16);
    image.set_words(reg::EVT1, &[0, 0]);
    image.set_words(reg::EVT2, &[0, 0]);
}

fn warn_clamped(point: &'static str, err: Option<EncodeRangeError>) {
    if let Some(err) = err {
        warn!(point, error = %err, "value clamped to sentinel");
    }
}

/// Diagnostic decode of a served register block back into engineering
/// values. Used by tests to verify the encode round trip and by anything
/// that wants to inspect what a SunSpec client would see.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub sunspec_marker: bool,
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub serial: String,
    pub ac_current: Option<f64>,
    pub ac_voltage: Option<f64>,
    pub active_power: Option<f64>,
    pub frequency: Option<f64>,
    pub apparent_power: Option<f64>,
    pub reactive_power: Option<f64>,
    pub energy_wh: Option<u64>,
    pub dc_current: Option<f64>,
    pub dc_voltage: Option<f64>,
    pub operating_state: Option<OperatingState>,
    pub w_max_lim_pct: u16,
    pub w_max_lim_ena: bool,
}

/// Decodes a raw register dump of the whole model block, as a network
/// client would read it starting at the base address.
pub fn decode_image(words: &[u16]) -> Result<DecodedImage, DecodeError> {
    if words.len() < IMAGE_LENGTH as usize {
        return Err(DecodeError::ShortBuffer {
            offset: words.len(),
        });
    }

    let at = |addr: u16| words[(addr - BASE_ADDRESS) as usize];
    let span = |addr: u16, len: u16| {
        let start = (addr - BASE_ADDRESS) as usize;
        &words[start..start + len as usize]
    };

    let energy_raw = decode_u32(words, (reg::WH - BASE_ADDRESS) as usize)?;
    let energy_wh = if at(reg::WH_SF) == NOT_IMPLEMENTED_SF {
        None
    } else {
        let sf = at(reg::WH_SF) as i16;
        Some((energy_raw as f64 * 10f64.powi(sf.into())) as u64)
    };

    Ok(DecodedImage {
        sunspec_marker: span(reg::MARKER, 2) == [SUNSPEC_ID0, SUNSPEC_ID1],
        manufacturer: decode_string(span(reg::MN, 16)),
        model: decode_string(span(reg::MD, 16)),
        version: decode_string(span(reg::VR, 8)),
        serial: decode_string(span(reg::SN, 16)),
        ac_current: decode_scaled(at(reg::A), at(reg::A_SF), IntWidth::U16),
        ac_voltage: decode_scaled(at(reg::PHV_A), at(reg::V_SF), IntWidth::U16),
        active_power: decode_scaled(at(reg::W), at(reg::W_SF), IntWidth::I16),
        frequency: decode_scaled(at(reg::HZ), at(reg::HZ_SF), IntWidth::U16),
        apparent_power: decode_scaled(at(reg::VA), at(reg::VA_SF), IntWidth::I16),
        reactive_power: decode_scaled(at(reg::VAR), at(reg::VAR_SF), IntWidth::I16),
        energy_wh,
        dc_current: decode_scaled(at(reg::DCA), at(reg::DCA_SF), IntWidth::U16),
        dc_voltage: decode_scaled(at(reg::DCV), at(reg::DCV_SF), IntWidth::U16),
        operating_state: OperatingState::from_code(at(reg::ST)),
        w_max_lim_pct: at(reg::W_MAX_LIM_PCT),
        w_max_lim_ena: at(reg::W_MAX_LIM_ENA) != 0,
    })
}
