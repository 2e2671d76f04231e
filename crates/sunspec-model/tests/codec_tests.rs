use sunspec_model::layout::{self, reg};
use sunspec_model::{
    build_image, choose_scale, decode_image, decode_scaled, decode_string, encode_scaled_group,
    encode_string, vendor, Controls, DecodeError, IntWidth, NOT_IMPLEMENTED_I16,
    NOT_IMPLEMENTED_SF, NOT_IMPLEMENTED_U16,
};
use types::{CanonicalMeasurements, DeviceInfo, OperatingState};

fn sample_device() -> DeviceInfo {
    DeviceInfo {
        manufacturer: "Solis".to_string(),
        model: "Generic".to_string(),
        options: String::new(),
        version: "1f".to_string(),
        serial: "1030a04012".to_string(),
    }
}

fn sample_measurements() -> CanonicalMeasurements {
    CanonicalMeasurements {
        ac_voltage: 230.4,
        ac_current: 2.1,
        frequency: Some(50.02),
        active_power: 483.0,
        reactive_power: None,
        apparent_power: None,
        energy_wh: 12_345_000,
        dc_voltage: Some(312.5),
        dc_current: Some(1.6),
        operating_state: OperatingState::Mppt,
        acquired_at_ms: 1_700_000_000_000,
    }
}

#[test]
fn scale_factor_keeps_required_precision() {
    let sf = choose_scale(&[230.4], -1, IntWidth::U16).expect("scale");
    assert_eq!(sf, -1);

    let (group, err) = encode_scaled_group(&[Some(230.4)], -1, IntWidth::U16);
    assert!(err.is_none());
    assert_eq!(group.raws, vec![2304]);
    assert_eq!(group.sf as i16, -1);
}

#[test]
fn scale_factor_grows_until_value_fits() {
    // 40 kW does not fit an i16 at 1 W resolution.
    let sf = choose_scale(&[40_000.0], 0, IntWidth::I16).expect("scale");
    assert_eq!(sf, 1);

    let (group, err) = encode_scaled_group(&[Some(40_000.0)], 0, IntWidth::I16);
    assert!(err.is_none());
    assert_eq!(group.raws, vec![4000]);
    assert_eq!(group.sf as i16, 1);
}

#[test]
fn group_scale_factor_is_shared_over_members() {
    let (group, err) =
        encode_scaled_group(&[Some(2.1), Some(700.0), None], -2, IntWidth::U16);
    assert!(err.is_none());
    // 700 A forces the group one step up; 2.1 A loses a digit with it.
    assert_eq!(group.sf as i16, -1);
    assert_eq!(group.raws, vec![21, 7000, NOT_IMPLEMENTED_U16]);
}

#[test]
fn out_of_range_value_clamps_to_sentinel() {
    let (group, err) = encode_scaled_group(&[Some(1e12)], 0, IntWidth::I16);
    let err = err.expect("range error");
    assert_eq!(err.value, 1e12);
    assert_eq!(group.raws, vec![NOT_IMPLEMENTED_I16]);
    assert_eq!(group.sf, NOT_IMPLEMENTED_SF);
}

#[test]
fn absent_group_encodes_sentinels() {
    let (group, err) = encode_scaled_group(&[None, None], -1, IntWidth::U16);
    assert!(err.is_none());
    assert_eq!(group.raws, vec![NOT_IMPLEMENTED_U16; 2]);
    assert_eq!(group.sf, NOT_IMPLEMENTED_SF);
    assert_eq!(decode_scaled(group.raws[0], group.sf, IntWidth::U16), None);
}

#[test]
fn signed_values_survive_the_round_trip() {
    let (group, err) = encode_scaled_group(&[Some(-1500.0)], 0, IntWidth::I16);
    assert!(err.is_none());
    let decoded = decode_scaled(group.raws[0], group.sf, IntWidth::I16).expect("value");
    assert_eq!(decoded, -1500.0);
}

#[test]
fn string_encoding_pads_and_round_trips() {
    let words = encode_string("Solis", 16);
    assert_eq!(words.len(), 16);
    assert_eq!(words[0], 0x536f); // "So"
    assert_eq!(words[15], 0);
    assert_eq!(decode_string(&words), "Solis");

    let words = encode_string("", 8);
    assert_eq!(words, vec![0; 8]);
    assert_eq!(decode_string(&words), "");

    // Overlong input is truncated to the field width.
    let long = "x".repeat(40);
    let words = encode_string(&long, 8);
    assert_eq!(words.len(), 8);
    assert_eq!(decode_string(&words).len(), 16);
}

#[test]
fn image_has_model_chain_and_end_marker() {
    let device = sample_device();
    let m = sample_measurements();
    let image = build_image(Some(&device), Some(&m), &Controls::default(), Some(3000));

    assert_eq!(
        image.read(reg::MARKER, 2).expect("marker"),
        &[layout::SUNSPEC_ID0, layout::SUNSPEC_ID1]
    );
    assert_eq!(image.get(reg::COMMON_ID), Some(1));
    assert_eq!(image.get(reg::COMMON_ID + 1), Some(66));
    assert_eq!(image.get(reg::INVERTER_ID), Some(101));
    assert_eq!(image.get(reg::INVERTER_ID + 1), Some(50));
    assert_eq!(image.get(reg::NAMEPLATE_ID), Some(120));
    assert_eq!(image.get(reg::CONTROLS_ID), Some(123));
    assert_eq!(image.get(reg::END), Some(layout::END_MODEL_ID));
    assert_eq!(image.get(reg::END + 1), Some(0));
    assert_eq!(image.get(reg::DA), Some(layout::SERVED_UNIT_ID));
    assert_eq!(image.get(reg::W_RTG), Some(3000));
}

#[test]
fn round_trip_reconstructs_within_point_precision() {
    let device = sample_device();
    let m = sample_measurements();
    let image = build_image(Some(&device), Some(&m), &Controls::default(), None);
    let decoded = decode_image(image.words()).expect("decode");

    assert!(decoded.sunspec_marker);
    assert_eq!(decoded.manufacturer, "Solis");
    assert_eq!(decoded.serial, "1030a04012");
    assert!((decoded.ac_voltage.expect("voltage") - 230.4).abs() < 0.05);
    assert!((decoded.ac_current.expect("current") - 2.1).abs() < 0.005);
    assert!((decoded.frequency.expect("frequency") - 50.02).abs() < 0.005);
    assert!((decoded.active_power.expect("power") - 483.0).abs() < 0.5);
    assert_eq!(decoded.energy_wh, Some(12_345_000));
    assert!((decoded.dc_voltage.expect("dc voltage") - 312.5).abs() < 0.05);
    assert!((decoded.dc_current.expect("dc current") - 1.6).abs() < 0.005);
    assert_eq!(decoded.operating_state, Some(OperatingState::Mppt));
}

#[test]
fn meter_without_dc_side_reads_dc_sentinels() {
    let device = DeviceInfo {
        manufacturer: "Carlo Gavazzi".to_string(),
        model: "EM24".to_string(),
        ..DeviceInfo::placeholder()
    };
    let m = CanonicalMeasurements {
        dc_voltage: None,
        dc_current: None,
        ..sample_measurements()
    };
    let image = build_image(Some(&device), Some(&m), &Controls::default(), None);

    assert_eq!(image.get(reg::DCA), Some(NOT_IMPLEMENTED_U16));
    assert_eq!(image.get(reg::DCA_SF), Some(NOT_IMPLEMENTED_SF));
    assert_eq!(image.get(reg::DCV), Some(NOT_IMPLEMENTED_U16));
    assert_eq!(image.get(reg::DCW), Some(NOT_IMPLEMENTED_I16));

    let decoded = decode_image(image.words()).expect("decode");
    assert!((decoded.ac_voltage.expect("voltage") - 230.4).abs() < 0.05);
    assert_eq!(decoded.dc_voltage, None);
    assert_eq!(decoded.dc_current, None);
}

#[test]
fn unacquired_image_is_distinct_from_zero_readings() {
    let unacquired = build_image(None, None, &Controls::default(), None);
    assert_eq!(unacquired.read(reg::MARKER, 2).expect("marker"), &[0, 0]);
    assert_eq!(unacquired.get(reg::PHV_A), Some(NOT_IMPLEMENTED_U16));
    assert_eq!(unacquired.get(reg::V_SF), Some(NOT_IMPLEMENTED_SF));
    assert_eq!(unacquired.get(reg::W), Some(NOT_IMPLEMENTED_I16));
    assert_eq!(unacquired.get(reg::ST), Some(OperatingState::Off.code()));

    let zeros = CanonicalMeasurements {
        ac_voltage: 0.0,
        ac_current: 0.0,
        active_power: 0.0,
        ..sample_measurements()
    };
    let device = sample_device();
    let acquired = build_image(Some(&device), Some(&zeros), &Controls::default(), None);
    assert_ne!(unacquired, acquired);
    let decoded = decode_image(acquired.words()).expect("decode");
    assert_eq!(decoded.ac_voltage, Some(0.0));
}

#[test]
fn controls_are_reflected_in_the_image() {
    let controls = Controls {
        w_max_lim_pct: 60,
        w_max_lim_rvrt_tms: 30,
        w_max_lim_ena: true,
    };
    let device = sample_device();
    let image = build_image(Some(&device), None, &controls, None);
    assert_eq!(image.get(reg::W_MAX_LIM_PCT), Some(60));
    assert_eq!(image.get(reg::W_MAX_LIM_PCT_RVRT_TMS), Some(30));
    assert_eq!(image.get(reg::W_MAX_LIM_ENA), Some(1));
    assert_eq!(controls.active_limit_pct(), Some(60));
    assert_eq!(Controls::default().active_limit_pct(), None);
}

#[test]
fn reads_outside_the_image_are_rejected() {
    let image = build_image(None, None, &Controls::default(), None);
    assert!(image.read(40_000, 178).is_some());
    assert!(image.read(40_000, 179).is_none());
    assert!(image.read(40_177, 2).is_none());
    assert!(image.read(39_999, 1).is_none());
    assert!(image.read(50_000, 1).is_none());
}

#[test]
fn layout_marks_only_control_points_writable() {
    assert!(layout::writable(reg::W_MAX_LIM_PCT));
    assert!(layout::writable(reg::W_MAX_LIM_ENA));
    assert!(layout::writable(reg::W_MAX_LIM_PCT_RVRT_TMS));
    assert!(!layout::writable(reg::W));
    assert!(!layout::writable(reg::MN));
    assert!(!layout::writable(reg::W_MAX_LIM_PCT_SF));

    let point = layout::point_at(reg::WH + 1).expect("point");
    assert_eq!(point.name, "WH");
}

#[test]
fn vendor_word_orders_decode() {
    // Solis packs high word first.
    assert_eq!(vendor::u32_be(&[0x0001, 0x86A0], 0).expect("u32"), 100_000);
    // EM24 packs low word first; -2500 == 0xFFFF_F63C.
    assert_eq!(
        vendor::i32_word_swapped(&[0xF63C, 0xFFFF], 0).expect("i32"),
        -2500
    );
    assert_eq!(vendor::i32_word_swapped(&[2304, 0], 0).expect("i32"), 2304);
}

#[test]
fn vendor_short_buffers_report_offset() {
    let err = vendor::u32_be(&[1], 0).expect_err("short");
    assert_eq!(err, DecodeError::ShortBuffer { offset: 1 });
    let err = vendor::i32_word_swapped(&[], 4).expect_err("short");
    assert_eq!(err, DecodeError::ShortBuffer { offset: 4 });
    let err = decode_image(&[0; 10]).expect_err("short");
    assert_eq!(err, DecodeError::ShortBuffer { offset: 10 });
}

#[test]
fn vendor_strings_decode() {
    // "AA2" packed two ASCII chars per register.
    assert_eq!(vendor::ascii(&[0x4141, 0x3200, 0x0000]), "AA2");
    // Solis serial words come with reversed hex nibbles.
    assert_eq!(vendor::solis_serial(&[0x1234, 0xab9]), "43219ba");
}
