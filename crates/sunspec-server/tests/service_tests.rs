use std::sync::Arc;

use tokio_modbus::prelude::*;
use tokio_modbus::server::Service;

use model_store::ModelStore;
use sunspec_model::layout::{reg, BASE_ADDRESS, IMAGE_LENGTH};
use sunspec_server::SunspecService;
use types::{CanonicalMeasurements, DeviceInfo, OperatingState};

fn measurements(ts: u64) -> CanonicalMeasurements {
    CanonicalMeasurements {
        ac_voltage: 230.4,
        ac_current: 2.1,
        frequency: Some(50.02),
        active_power: 483.0,
        reactive_power: None,
        apparent_power: None,
        energy_wh: 12_345,
        dc_voltage: None,
        dc_current: None,
        operating_state: OperatingState::Mppt,
        acquired_at_ms: ts,
    }
}

fn populated_store() -> Arc<ModelStore> {
    let store = Arc::new(ModelStore::new(Some(3_000)));
    store.set_device_info(DeviceInfo::placeholder());
    store.update(measurements(1_000));
    store
}

#[tokio::test]
async fn in_range_reads_answer_from_the_snapshot() {
    let store = populated_store();
    let service = SunspecService::new(store.clone());
    let expected = store.current().image.read(BASE_ADDRESS, 70).expect("span").to_vec();

    let response = service
        .call(Request::ReadHoldingRegisters(BASE_ADDRESS, 70))
        .await
        .expect("response");
    match response {
        Response::ReadHoldingRegisters(words) => assert_eq!(words, expected),
        other => panic!("unexpected response: {other:?}"),
    }

    let response = service
        .call(Request::ReadInputRegisters(reg::PHV_A, 1))
        .await
        .expect("response");
    match response {
        Response::ReadInputRegisters(words) => assert_eq!(words, vec![2304]),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn out_of_range_reads_get_illegal_data_address() {
    let store = populated_store();
    let before = store.current().image.words().to_vec();
    let service = SunspecService::new(store.clone());

    let exception = service
        .call(Request::ReadHoldingRegisters(BASE_ADDRESS, IMAGE_LENGTH + 1))
        .await
        .expect_err("past the end");
    assert_eq!(exception, ExceptionCode::IllegalDataAddress);

    let exception = service
        .call(Request::ReadHoldingRegisters(50_000, 2))
        .await
        .expect_err("outside the model");
    assert_eq!(exception, ExceptionCode::IllegalDataAddress);

    // The store is untouched by rejected requests.
    assert_eq!(store.current().image.words(), &before[..]);
}

#[tokio::test]
async fn writes_to_read_only_points_are_rejected() {
    let store = populated_store();
    let before = store.current().image.words().to_vec();
    let service = SunspecService::new(store.clone());

    let exception = service
        .call(Request::WriteSingleRegister(reg::W, 0))
        .await
        .expect_err("read-only");
    assert_eq!(exception, ExceptionCode::IllegalDataAddress);

    let exception = service
        .call(Request::WriteSingleRegister(reg::W_MAX_LIM_PCT, 150))
        .await
        .expect_err("out of range");
    assert_eq!(exception, ExceptionCode::IllegalDataValue);

    assert_eq!(store.current().image.words(), &before[..]);
}

#[tokio::test]
async fn control_writes_apply_and_echo() {
    let store = populated_store();
    let service = SunspecService::new(store.clone());

    let response = service
        .call(Request::WriteSingleRegister(reg::W_MAX_LIM_PCT, 60))
        .await
        .expect("write");
    assert_eq!(response, Response::WriteSingleRegister(reg::W_MAX_LIM_PCT, 60));

    let response = service
        .call(Request::WriteMultipleRegisters(
            reg::W_MAX_LIM_ENA,
            vec![1].into(),
        ))
        .await
        .expect("write");
    assert_eq!(response, Response::WriteMultipleRegisters(reg::W_MAX_LIM_ENA, 1));

    let state = store.current();
    assert_eq!(state.controls.w_max_lim_pct, 60);
    assert!(state.controls.w_max_lim_ena);
    assert_eq!(state.controls.active_limit_pct(), Some(60));
    assert_eq!(state.image.get(reg::W_MAX_LIM_PCT), Some(60));
}

#[tokio::test]
async fn unsupported_function_codes_get_illegal_function() {
    let store = populated_store();
    let service = SunspecService::new(store);

    let exception = service
        .call(Request::ReadCoils(0, 1))
        .await
        .expect_err("coils are not served");
    assert_eq!(exception, ExceptionCode::IllegalFunction);
}

#[tokio::test]
async fn each_request_sees_exactly_one_generation() {
    let store = populated_store();
    let service = SunspecService::new(store.clone());
    let image_before = store.current().image.words().to_vec();

    let first = service
        .call(Request::ReadHoldingRegisters(BASE_ADDRESS, IMAGE_LENGTH))
        .await
        .expect("read");

    // A poll lands between the two requests.
    store.update(CanonicalMeasurements {
        active_power: 1_000.0,
        ..measurements(2_000)
    });
    let image_after = store.current().image.words().to_vec();
    assert_ne!(image_before, image_after);

    let second = service
        .call(Request::ReadHoldingRegisters(BASE_ADDRESS, IMAGE_LENGTH))
        .await
        .expect("read");

    match (first, second) {
        (Response::ReadHoldingRegisters(a), Response::ReadHoldingRegisters(b)) => {
            assert_eq!(a, image_before);
            assert_eq!(b, image_after);
        }
        other => panic!("unexpected responses: {other:?}"),
    }
}
