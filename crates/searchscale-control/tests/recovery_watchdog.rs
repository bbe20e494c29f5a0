//! Recovery watchdog behaviour across mastership changes.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use searchscale_control::{
    ControlLoop, HandoffOutcome, ProvisionOutcome, RecoveryWatchdog, TickOutcome, WatchdogOutcome,
};
use searchscale_state::{Family, Phase};
use tokio::sync::watch;

use common::{Harness, UnreachableState, recommend};

#[tokio::test]
async fn acquiring_mastership_resumes_the_recorded_direction_once() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleUpInProgress);
    h.executor.set_succeed(false);
    h.mastership.set(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false);

    assert_eq!(
        watchdog.tick().await,
        WatchdogOutcome::Resumed {
            direction: Family::ScaleUp,
            outcome: ProvisionOutcome::Failed,
        }
    );
    assert_eq!(h.executor.scale_out_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.executor.scale_in_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.phase(), Phase::ScaleUpInProgress);

    // Still master: no second attempt.
    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert_eq!(h.provision_calls(), 1);
}

#[tokio::test]
async fn continuing_master_does_not_resume() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleDownInProgress);
    h.mastership.set(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), true);

    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert_eq!(h.provision_calls(), 0);
    assert_eq!(h.phase(), Phase::ScaleDownInProgress);
}

#[tokio::test]
async fn pending_scale_down_resumes_as_scale_in() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleDownPending);
    h.mastership.set(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false);

    assert_eq!(
        watchdog.tick().await,
        WatchdogOutcome::Resumed {
            direction: Family::ScaleDown,
            outcome: ProvisionOutcome::Succeeded,
        }
    );
    assert_eq!(h.executor.scale_in_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.executor.scale_out_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        *h.executor.seen_phases.lock().unwrap(),
        vec![Phase::ScaleDownPending]
    );
    assert_eq!(h.phase(), Phase::Idle);
}

#[tokio::test]
async fn idle_cluster_needs_no_recovery() {
    let h = Harness::new();
    h.mastership.set(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false);

    assert_eq!(watchdog.tick().await, WatchdogOutcome::Idle);
    assert_eq!(h.provision_calls(), 0);
    assert!(watchdog.previous_master());
}

#[tokio::test]
async fn edge_is_remembered_while_not_master() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleUpPending);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), true);

    h.mastership.set(false);
    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert!(!watchdog.previous_master());

    h.mastership.set(true);
    assert!(matches!(
        watchdog.tick().await,
        WatchdogOutcome::Resumed {
            direction: Family::ScaleUp,
            ..
        }
    ));
    assert_eq!(h.provision_calls(), 1);
}

#[tokio::test]
async fn oracle_error_then_success_is_an_edge() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleDownInProgress);
    h.mastership.set(true);
    h.mastership.set_broken(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), true);

    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert!(!watchdog.previous_master());

    h.mastership.set_broken(false);
    assert!(matches!(
        watchdog.tick().await,
        WatchdogOutcome::Resumed {
            direction: Family::ScaleDown,
            ..
        }
    ));
}

#[tokio::test]
async fn invalid_policy_prevents_resumption() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleUpInProgress);
    h.mastership.set(true);
    h.policy.set_valid(false);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false);

    assert_eq!(watchdog.tick().await, WatchdogOutcome::PolicyInvalid);
    assert_eq!(h.provision_calls(), 0);
    assert_eq!(h.phase(), Phase::ScaleUpInProgress);
}

#[tokio::test]
async fn unreachable_state_still_tracks_mastership() {
    let h = Harness::new();
    h.mastership.set(true);
    let mut watchdog =
        RecoveryWatchdog::new(h.collaborators_with_state(Arc::new(UnreachableState)), false);

    assert_eq!(watchdog.tick().await, WatchdogOutcome::StateUnavailable);
    assert!(watchdog.previous_master());
    assert_eq!(h.provision_calls(), 0);
}

#[tokio::test]
async fn prime_seeds_previous_master_from_the_oracle() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleUpInProgress);
    h.mastership.set(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false);

    watchdog.prime().await;
    assert!(watchdog.previous_master());

    // Master at boot is not a leadership change.
    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert_eq!(h.provision_calls(), 0);
}

#[tokio::test]
async fn hung_resumption_times_out_and_keeps_the_phase() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleUpInProgress);
    h.mastership.set(true);
    h.executor.set_hang(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false)
        .with_provision_timeout(Duration::from_millis(50));

    let outcome = tokio::time::timeout(Duration::from_secs(5), watchdog.tick())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WatchdogOutcome::Resumed {
            direction: Family::ScaleUp,
            outcome: ProvisionOutcome::TimedOut,
        }
    );
    assert_eq!(h.phase(), Phase::ScaleUpInProgress);
}

#[tokio::test]
async fn run_primes_then_stops_on_shutdown() {
    let h = Harness::new();
    h.force_phase(Phase::ScaleUpInProgress);
    h.mastership.set(true);
    let watchdog = RecoveryWatchdog::new(h.collaborators(), false);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(watchdog.run(Duration::from_millis(10), rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    // Primed as master, so the in-flight operation is left alone.
    assert_eq!(h.provision_calls(), 0);
    assert!(h.mastership.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn operation_in_flight_from_own_control_loop_is_not_resumed() {
    let h = Harness::new();
    h.executor.set_hang(true);
    h.recommender.set(vec![recommend(Family::ScaleUp, 1)]);
    // Not master when the watchdog starts; mastership arrives before its
    // first tick, and the control loop gets there first.
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false);
    h.mastership.set(true);

    let control = ControlLoop::new(h.collaborators());
    let in_flight = tokio::spawn(async move { control.tick().await });
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.provision_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(watchdog.tick().await, WatchdogOutcome::OwnTenure);
    assert_eq!(h.provision_calls(), 1);
    assert_eq!(h.phase(), Phase::ScaleUpPending);

    in_flight.abort();
}

#[tokio::test]
async fn failed_operation_is_not_retried_in_the_same_tenure() {
    let h = Harness::new();
    h.executor.set_succeed(false);
    h.recommender.set(vec![recommend(Family::ScaleUp, 1)]);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), false);
    h.mastership.set(true);

    let control = ControlLoop::new(h.collaborators());
    assert!(matches!(
        control.tick().await,
        TickOutcome::Handoff(HandoffOutcome::Provisioned {
            outcome: ProvisionOutcome::Failed,
            ..
        })
    ));

    assert_eq!(watchdog.tick().await, WatchdogOutcome::OwnTenure);
    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert_eq!(h.provision_calls(), 1);
    assert_eq!(h.phase(), Phase::ScaleUpPending);
}

#[tokio::test]
async fn own_operation_is_resumed_after_mastership_is_lost_and_regained() {
    let h = Harness::new();
    h.executor.set_succeed(false);
    h.recommender.set(vec![recommend(Family::ScaleDown, 1)]);
    h.mastership.set(true);
    let mut watchdog = RecoveryWatchdog::new(h.collaborators(), true);

    let control = ControlLoop::new(h.collaborators());
    control.tick().await;
    assert!(h.tenure.started());

    h.mastership.set(false);
    assert_eq!(watchdog.tick().await, WatchdogOutcome::NoEdge);
    assert!(!h.tenure.started());

    h.executor.set_succeed(true);
    h.mastership.set(true);
    assert_eq!(
        watchdog.tick().await,
        WatchdogOutcome::Resumed {
            direction: Family::ScaleDown,
            outcome: ProvisionOutcome::Succeeded,
        }
    );
    assert_eq!(h.executor.scale_in_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.phase(), Phase::Idle);
}
