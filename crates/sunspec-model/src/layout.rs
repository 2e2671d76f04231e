//! Register layout tables for the served SunSpec models.
//!
//! Addresses are absolute holding-register addresses. The codec takes these
//! tables as explicit inputs; there is no ambient register map.

pub const BASE_ADDRESS: u16 = 40_000;
pub const IMAGE_LENGTH: u16 = 178;

pub const SUNSPEC_ID0: u16 = 0x5375;
pub const SUNSPEC_ID1: u16 = 0x6e53;
pub const END_MODEL_ID: u16 = 0xFFFF;

/// Modbus unit id the bridge presents on the SunSpec side.
pub const SERVED_UNIT_ID: u16 = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    U16,
    I16,
    Acc32,
    Sf,
    Str,
    Enum16,
    Bitfield32,
    Pad,
}

#[derive(Debug, Clone, Copy)]
pub struct PointDef {
    pub name: &'static str,
    pub addr: u16,
    pub len: u16,
    pub kind: PointKind,
    pub writable: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelDef {
    pub id: u16,
    /// Address of the model-id header register.
    pub addr: u16,
    /// Register count of the model body, excluding the two header registers.
    pub len: u16,
    pub points: &'static [PointDef],
}

/// Absolute addresses of the points referenced elsewhere in the bridge.
pub mod reg {
    pub const MARKER: u16 = 40_000;

    pub const COMMON_ID: u16 = 40_002;
    pub const MN: u16 = 40_004;
    pub const MD: u16 = 40_020;
    pub const OPT: u16 = 40_036;
    pub const VR: u16 = 40_044;
    pub const SN: u16 = 40_052;
    pub const DA: u16 = 40_068;

    pub const INVERTER_ID: u16 = 40_070;
    pub const A: u16 = 40_072;
    pub const APH_A: u16 = 40_073;
    pub const A_SF: u16 = 40_076;
    pub const PPV_AB: u16 = 40_077;
    pub const PHV_A: u16 = 40_080;
    pub const V_SF: u16 = 40_083;
    pub const W: u16 = 40_084;
    pub const W_SF: u16 = 40_085;
    pub const HZ: u16 = 40_086;
    pub const HZ_SF: u16 = 40_087;
    pub const VA: u16 = 40_088;
    pub const VA_SF: u16 = 40_089;
    pub const VAR: u16 = 40_090;
    pub const VAR_SF: u16 = 40_091;
    pub const PF: u16 = 40_092;
    pub const PF_SF: u16 = 40_093;
    pub const WH: u16 = 40_094;
    pub const WH_SF: u16 = 40_096;
    pub const DCA: u16 = 40_097;
    pub const DCA_SF: u16 = 40_098;
    pub const DCV: u16 = 40_099;
    pub const DCV_SF: u16 = 40_100;
    pub const DCW: u16 = 40_101;
    pub const DCW_SF: u16 = 40_102;
    pub const TMP_CAB: u16 = 40_103;
    pub const TMP_SF: u16 = 40_107;
    pub const ST: u16 = 40_108;
    pub const ST_VND: u16 = 40_109;
    pub const EVT1: u16 = 40_110;
    pub const EVT2: u16 = 40_112;

    pub const NAMEPLATE_ID: u16 = 40_122;
    pub const DER_TYP: u16 = 40_124;
    pub const W_RTG: u16 = 40_125;
    pub const W_RTG_SF: u16 = 40_126;

    pub const CONTROLS_ID: u16 = 40_150;
    pub const W_MAX_LIM_PCT: u16 = 40_155;
    pub const W_MAX_LIM_PCT_RVRT_TMS: u16 = 40_157;
    pub const W_MAX_LIM_ENA: u16 = 40_159;
    pub const W_MAX_LIM_PCT_SF: u16 = 40_173;

    pub const END: u16 = 40_176;
}

const fn point(name: &'static str, addr: u16, len: u16, kind: PointKind) -> PointDef {
    PointDef {
        name,
        addr,
        len,
        kind,
        writable: false,
    }
}

const fn control(name: &'static str, addr: u16, kind: PointKind) -> PointDef {
    PointDef {
        name,
        addr,
        len: 1,
        kind,
        writable: true,
    }
}

const COMMON_POINTS: &[PointDef] = &[
    point("Mn", reg::MN, 16, PointKind::Str),
    point("Md", reg::MD, 16, PointKind::Str),
    point("Opt", reg::OPT, 8, PointKind::Str),
    point("Vr", reg::VR, 8, PointKind::Str),
    point("SN", reg::SN, 16, PointKind::Str),
    point("DA", reg::DA, 1, PointKind::U16),
    point("pad", 40_069, 1, PointKind::Pad),
];

const INVERTER_POINTS: &[PointDef] = &[
    point("A", reg::A, 1, PointKind::U16),
    point("AphA", reg::APH_A, 1, PointKind::U16),
    point("AphB", 40_074, 1, PointKind::U16),
    point("AphC", 40_075, 1, PointKind::U16),
    point("A_SF", reg::A_SF, 1, PointKind::Sf),
    point("PPVphAB", reg::PPV_AB, 1, PointKind::U16),
    point("PPVphBC", 40_078, 1, PointKind::U16),
    point("PPVphCA", 40_079, 1, PointKind::U16),
    point("PhVphA", reg::PHV_A, 1, PointKind::U16),
    point("PhVphB", 40_081, 1, PointKind::U16),
    point("PhVphC", 40_082, 1, PointKind::U16),
    point("V_SF", reg::V_SF, 1, PointKind::Sf),
    point("W", reg::W, 1, PointKind::I16),
    point("W_SF", reg::W_SF, 1, PointKind::Sf),
    point("Hz", reg::HZ, 1, PointKind::U16),
    point("Hz_SF", reg::HZ_SF, 1, PointKind::Sf),
    point("VA", reg::VA, 1, PointKind::I16),
    point("VA_SF", reg::VA_SF, 1, PointKind::Sf),
    point("VAr", reg::VAR, 1, PointKind::I16),
    point("VAr_SF", reg::VAR_SF, 1, PointKind::Sf),
    point("PF", reg::PF, 1, PointKind::I16),
    point("PF_SF", reg::PF_SF, 1, PointKind::Sf),
    point("WH", reg::WH, 2, PointKind::Acc32),
    point("WH_SF", reg::WH_SF, 1, PointKind::Sf),
    point("DCA", reg::DCA, 1, PointKind::U16),
    point("DCA_SF", reg::DCA_SF, 1, PointKind::Sf),
    point("DCV", reg::DCV, 1, PointKind::U16),
    point("DCV_SF", reg::DCV_SF, 1, PointKind::Sf),
    point("DCW", reg::DCW, 1, PointKind::I16),
    point("DCW_SF", reg::DCW_SF, 1, PointKind::Sf),
    point("TmpCab", reg::TMP_CAB, 1, PointKind::I16),
    point("TmpSnk", 40_104, 1, PointKind::I16),
    point("TmpTrns", 40_105, 1, PointKind::I16),
    point("TmpOt", 40_106, 1, PointKind::I16),
    point("Tmp_SF", reg::TMP_SF, 1, PointKind::Sf),
    point("St", reg::ST, 1, PointKind::Enum16),
    point("StVnd", reg::ST_VND, 1, PointKind::Enum16),
    point("Evt1", reg::EVT1, 2, PointKind::Bitfield32),
    point("Evt2", reg::EVT2, 2, PointKind::Bitfield32),
    point("EvtVnd1", 40_114, 2, PointKind::Bitfield32),
    point("EvtVnd2", 40_116, 2, PointKind::Bitfield32),
    point("EvtVnd3", 40_118, 2, PointKind::Bitfield32),
    point("EvtVnd4", 40_120, 2, PointKind::Bitfield32),
];

const NAMEPLATE_POINTS: &[PointDef] = &[
    point("DERTyp", reg::DER_TYP, 1, PointKind::Enum16),
    point("WRtg", reg::W_RTG, 1, PointKind::U16),
    point("WRtg_SF", reg::W_RTG_SF, 1, PointKind::Sf),
    point("pad", 40_127, 23, PointKind::Pad),
];

const CONTROLS_POINTS: &[PointDef] = &[
    point("Conn_WinTms", 40_152, 1, PointKind::U16),
    point("Conn_RvrtTms", 40_153, 1, PointKind::U16),
    point("Conn", 40_154, 1, PointKind::Enum16),
    control("WMaxLimPct", reg::W_MAX_LIM_PCT, PointKind::U16),
    point("WMaxLimPct_WinTms", 40_156, 1, PointKind::U16),
    control("WMaxLimPct_RvrtTms", reg::W_MAX_LIM_PCT_RVRT_TMS, PointKind::U16),
    point("WMaxLimPct_RmpTms", 40_158, 1, PointKind::U16),
    control("WMaxLim_Ena", reg::W_MAX_LIM_ENA, PointKind::Enum16),
    point("OutPFSet", 40_160, 1, PointKind::I16),
    point("pad", 40_161, 12, PointKind::Pad),
    point("WMaxLimPct_SF", reg::W_MAX_LIM_PCT_SF, 1, PointKind::Sf),
    point("OutPFSet_SF", 40_174, 1, PointKind::Sf),
    point("VArPct_SF", 40_175, 1, PointKind::Sf),
];

pub const COMMON: ModelDef = ModelDef {
    id: 1,
    addr: reg::COMMON_ID,
    len: 66,
    points: COMMON_POINTS,
};

pub const INVERTER: ModelDef = ModelDef {
    id: 101,
    addr: reg::INVERTER_ID,
    len: 50,
    points: INVERTER_POINTS,
};

pub const NAMEPLATE: ModelDef = ModelDef {
    id: 120,
    addr: reg::NAMEPLATE_ID,
    len: 26,
    points: NAMEPLATE_POINTS,
};

pub const CONTROLS: ModelDef = ModelDef {
    id: 123,
    addr: reg::CONTROLS_ID,
    len: 24,
    points: CONTROLS_POINTS,
};

pub const MODELS: [ModelDef; 4] = [COMMON, INVERTER, NAMEPLATE, CONTROLS];

/// Whether a register may be written by a network client.
pub fn writable(addr: u16) -> bool {
    MODELS.iter().any(|model| {
        model
            .points
            .iter()
            .any(|p| p.writable && p.addr == addr)
    })
}

/// Looks up the point a register belongs to.
pub fn point_at(addr: u16) -> Option<&'static PointDef> {
    MODELS.iter().find_map(|model| {
        model
            .points
            .iter()
            .find(|p| addr >= p.addr && addr < p.addr + p.len)
    })
}
