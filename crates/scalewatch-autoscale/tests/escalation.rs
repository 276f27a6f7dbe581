//! Multi-cycle scaling against the redb-backed local target.

use std::sync::Arc;

use scalewatch_autoscale::{ScalingController, StoreTarget};
use scalewatch_core::{AnomalyVerdict, MetricSample, ResourceReadings, ScalingBounds, Window};
use scalewatch_state::StateStore;

fn verdict(anomalous: bool, severity: u32) -> AnomalyVerdict {
    let sample = MetricSample::new(
        "checkout",
        Window { start: 0, end: 300 },
        ResourceReadings::new(90.0, 70.0, 10.0),
    )
    .unwrap();
    if anomalous {
        AnomalyVerdict::anomalous(sample, severity)
    } else {
        AnomalyVerdict::normal(sample)
    }
}

#[tokio::test]
async fn escalates_then_holds_at_ceiling() {
    let store = StateStore::open_in_memory().unwrap();
    let controller = ScalingController::new(
        Arc::new(StoreTarget::new(store.clone())),
        ScalingBounds::new(1, 8).unwrap(),
    );

    let steps = [
        (true, 1, 2),
        (true, 1, 3),
        (false, 0, 3),
        (true, 2, 6),
        (true, 4, 8),
        (true, 1, 8),
        (false, 0, 8),
    ];
    for (anomalous, severity, expected) in steps {
        let d = controller
            .decide("checkout", &verdict(anomalous, severity))
            .await
            .unwrap();
        assert_eq!(d.new_count, expected);
    }

    let record = store.get_desired_count("checkout").unwrap().unwrap();
    assert_eq!(record.desired_count, 8);
}

#[tokio::test]
async fn counts_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.redb");

    {
        let store = StateStore::open(&path).unwrap();
        let controller =
            ScalingController::new(Arc::new(StoreTarget::new(store)), ScalingBounds::default());
        controller.decide("checkout", &verdict(true, 3)).await.unwrap();
    }

    let store = StateStore::open(&path).unwrap();
    let controller =
        ScalingController::new(Arc::new(StoreTarget::new(store)), ScalingBounds::default());
    let d = controller.decide("checkout", &verdict(false, 0)).await.unwrap();
    assert_eq!(d.previous_count, 2);
    assert!(d.is_noop());
}
