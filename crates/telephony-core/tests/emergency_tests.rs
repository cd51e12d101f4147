//! End-to-end emergency radio-on, fan-out and dialing behaviour

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use common::{TestRadio, TestSettings};
use telephony_core::emergency::selector::RadioSnapshot;
use telephony_core::emergency::{EmergencyDialer, EmergencyFanoutCoordinator, PhoneSelector, RadioRetryController};
use telephony_core::radio::RadioAccessFamily;
use telephony_core::{
    CallDirection, CallState, Connection, DisconnectCause, RadioId, RadioRef, RadioTechnology, RetryPolicy,
    ServiceState, SimState, TelephonyError,
};

#[tokio::test(start_paused = true)]
async fn retry_gives_up_after_bounded_power_ons() -> anyhow::Result<()> {
    let radio = TestRadio::broken(0);
    let controller = RadioRetryController::new(RetryPolicy::default());
    let (tx, rx) = oneshot::channel();
    let started = Instant::now();

    assert!(controller.start(radio.clone(), Box::new(move |ready| {
        let _ = tx.send(ready);
    })));

    assert!(!rx.await?);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31), "{elapsed:?}");
    assert_eq!(radio.power_on_count(), 5);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_callback_fires_exactly_once() {
    let radio = TestRadio::broken(0);
    let controller = RadioRetryController::new(RetryPolicy::quick());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    controller.start(radio.clone(), Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    tokio::time::sleep(Duration::from_millis(700)).await;
    radio.bring_up();
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.cleanup();
    tokio::time::sleep(Duration::from_secs(10)).await;
    drop(controller);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn fanout_reports_ready_once_every_radio_settled() {
    let quick = TestRadio::off(0);
    let broken = TestRadio::broken(1);
    let radios: Vec<RadioRef> = vec![quick.clone() as RadioRef, broken.clone() as RadioRef];
    let fanout = EmergencyFanoutCoordinator::new(radios, TestSettings::new(), RetryPolicy::quick());
    let started = Instant::now();

    assert!(fanout.enable_emergency_calling_async().await);

    // The broken radio runs its full sequence before the aggregate fires.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100), "{elapsed:?}");
    assert_eq!(quick.power_on_count(), 1);
    assert_eq!(broken.power_on_count(), 1 + 5);
    assert!(!fanout.is_in_progress());
}

#[tokio::test(start_paused = true)]
async fn fanout_fires_at_last_completion_with_any_ready() -> anyhow::Result<()> {
    // Slot 0 becomes usable at 1s on its own; slot 1 never does and gives up at 3s.
    let late = TestRadio::broken(0);
    let dead = TestRadio::broken(1);
    let radios: Vec<RadioRef> = vec![late.clone() as RadioRef, dead.clone() as RadioRef];
    let fanout = EmergencyFanoutCoordinator::new(radios, TestSettings::new(), RetryPolicy::quick());
    let (tx, mut rx) = oneshot::channel();
    let started = Instant::now();

    fanout.enable_emergency_calling(Box::new(move |ready| {
        let _ = tx.send(ready);
    }));
    tokio::time::sleep(Duration::from_secs(1)).await;
    late.bring_up();

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert!(rx.try_recv().is_err());
    assert!(fanout.is_in_progress());

    assert!(rx.await?);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100), "{elapsed:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fanout_reports_false_when_no_radio_comes_up() {
    let radios: Vec<RadioRef> = vec![TestRadio::broken(0) as RadioRef, TestRadio::broken(1) as RadioRef];
    let fanout = EmergencyFanoutCoordinator::new(radios, TestSettings::new(), RetryPolicy::quick());
    let started = Instant::now();

    assert!(!fanout.enable_emergency_calling_async().await);
    assert!(started.elapsed() < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn fanout_without_radios_fails_immediately() {
    let fanout = EmergencyFanoutCoordinator::new(Vec::new(), TestSettings::new(), RetryPolicy::quick());
    let started = Instant::now();
    assert!(!fanout.enable_emergency_calling_async().await);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[test]
fn selector_order_is_deterministic() {
    let snapshot = |slot: usize, service, sim, has_sim, raf| RadioSnapshot {
        id: RadioId(slot),
        service_state: service,
        sim_state: sim,
        has_sim,
        raf,
    };
    let radios = vec![
        snapshot(0, ServiceState::OutOfService, SimState::PinRequired, true, RadioAccessFamily::LTE),
        snapshot(1, ServiceState::OutOfService, SimState::Ready, true, RadioAccessFamily::GSM),
        snapshot(
            2,
            ServiceState::OutOfService,
            SimState::Absent,
            false,
            RadioAccessFamily::LTE | RadioAccessFamily::GSM,
        ),
        snapshot(3, ServiceState::EmergencyOnly, SimState::Absent, false, RadioAccessFamily::GSM),
    ];
    let selector = PhoneSelector::new(None, RadioId(0));

    let first = selector.rank(&radios);
    let mut reversed = radios.clone();
    reversed.reverse();
    assert_eq!(first, selector.rank(&reversed));
    assert_eq!(first, vec![RadioId(3), RadioId(2), RadioId(1), RadioId(0)]);
    assert_eq!(selector.select(&radios, &[RadioId(3)]), Some(RadioId(2)));
    assert_eq!(PhoneSelector::new(None, RadioId(1)).rank(&[]), vec![RadioId(1)]);
}

#[tokio::test(start_paused = true)]
async fn dialer_brings_radio_up_then_dials() -> anyhow::Result<()> {
    let radio = TestRadio::off(0);
    let radios: Vec<RadioRef> = vec![radio.clone() as RadioRef];
    let settings = TestSettings::new();
    let fanout = EmergencyFanoutCoordinator::new(radios.clone(), settings.clone(), RetryPolicy::quick());
    let dialer = EmergencyDialer::new(radios, settings, fanout, PhoneSelector::new(None, RadioId(0)));

    let call = Connection::new(CallDirection::Outgoing, None, RadioTechnology::Gsm).into_shared();
    assert!(dialer.needs_radio_on());
    let chosen = dialer.place_emergency_call(&call).await?;

    assert_eq!(chosen, RadioId(0));
    assert_eq!(call.radio(), Some(RadioId(0)));
    assert_eq!(call.state(), CallState::Dialing);
    assert_eq!(*radio.dialed.lock(), vec![call.id()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dialer_fails_call_when_no_radio_comes_up() {
    let radios: Vec<RadioRef> = vec![TestRadio::broken(0) as RadioRef];
    let settings = TestSettings::new();
    let fanout = EmergencyFanoutCoordinator::new(radios.clone(), settings.clone(), RetryPolicy::quick());
    let dialer = EmergencyDialer::new(radios, settings, fanout, PhoneSelector::new(None, RadioId(0)));

    let call = Connection::new(CallDirection::Outgoing, None, RadioTechnology::Gsm).into_shared();
    let result = dialer.place_emergency_call(&call).await;

    assert!(matches!(
        result,
        Err(TelephonyError::RadioUnavailable { cause: DisconnectCause::PowerOff })
    ));
    assert_eq!(call.disconnect_cause(), Some(DisconnectCause::PowerOff));
}

#[tokio::test]
async fn redial_walks_remaining_radios() {
    let first = TestRadio::in_service(0);
    let second = TestRadio::in_service(1).with_sim(SimState::Absent, false);
    let radios: Vec<RadioRef> = vec![first.clone() as RadioRef, second.clone() as RadioRef];
    let settings = TestSettings::new();
    let fanout = EmergencyFanoutCoordinator::new(radios.clone(), settings.clone(), RetryPolicy::quick());
    let dialer = EmergencyDialer::new(radios, settings, fanout, PhoneSelector::new(Some(RadioId(0)), RadioId(0)));

    let call = Connection::new(CallDirection::Outgoing, None, RadioTechnology::Gsm).into_shared();
    assert_eq!(dialer.place_emergency_call(&call).await.unwrap(), RadioId(0));
    assert_eq!(dialer.redial(&call, RadioId(0)).unwrap(), RadioId(1));
    assert!(matches!(
        dialer.redial(&call, RadioId(1)),
        Err(TelephonyError::NoRadioAvailable(_))
    ));
    assert_eq!(call.disconnect_cause(), Some(DisconnectCause::Error));
    assert_eq!(second.dialed.lock().len(), 1);
}
