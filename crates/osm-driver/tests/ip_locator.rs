mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeCloud, fixed, floating};
use osm_driver::address::locate_ip;
use osm_driver::types::AddressKind;
use osm_driver::{Error, MachineId, PollPolicy};
use tokio::time::Instant;

fn id() -> MachineId {
    MachineId("srv-0001".into())
}

#[tokio::test(start_paused = true)]
async fn match_on_the_last_attempt_is_returned() {
    let cloud = Arc::new(FakeCloud::default());
    let mut script = vec![Vec::new(); 199];
    script.push(vec![fixed("10.0.0.7", 4)]);
    cloud.script_addresses(script);

    let started = Instant::now();
    let ip = locate_ip(cloud.as_ref(), &id(), AddressKind::Fixed, 4, PollPolicy::default())
        .await
        .unwrap();

    assert_eq!(ip, "10.0.0.7");
    assert_eq!(cloud.count("instance_addresses"), 200);
    assert_eq!(started.elapsed(), Duration::from_secs(398));
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_is_no_ip_found() {
    let cloud = Arc::new(FakeCloud::default());
    cloud.script_addresses(vec![Vec::new()]);

    let started = Instant::now();
    let err = locate_ip(cloud.as_ref(), &id(), AddressKind::Fixed, 4, PollPolicy::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoIpFound));
    assert_eq!(cloud.count("instance_addresses"), 200);
    assert_eq!(started.elapsed(), PollPolicy::default().max_wait());
}

#[tokio::test(start_paused = true)]
async fn kind_and_version_both_filter() {
    let cloud = Arc::new(FakeCloud::default());
    cloud.script_addresses(vec![vec![
        fixed("10.0.0.7", 4),
        fixed("fd00::7", 6),
        floating("203.0.113.7"),
    ]]);

    let policy = PollPolicy {
        attempts: 3,
        interval: Duration::from_secs(2),
    };

    let ip = locate_ip(cloud.as_ref(), &id(), AddressKind::Floating, 4, policy)
        .await
        .unwrap();
    assert_eq!(ip, "203.0.113.7");

    let ip = locate_ip(cloud.as_ref(), &id(), AddressKind::Fixed, 6, policy)
        .await
        .unwrap();
    assert_eq!(ip, "fd00::7");

    let err = locate_ip(cloud.as_ref(), &id(), AddressKind::Floating, 6, policy)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoIpFound));
}

#[tokio::test(start_paused = true)]
async fn first_hit_stops_polling() {
    let cloud = Arc::new(FakeCloud::default());
    cloud.script_addresses(vec![
        Vec::new(),
        Vec::new(),
        vec![fixed("10.0.0.8", 4)],
        vec![fixed("10.0.0.9", 4)],
    ]);

    let ip = locate_ip(cloud.as_ref(), &id(), AddressKind::Fixed, 4, PollPolicy::default())
        .await
        .unwrap();

    assert_eq!(ip, "10.0.0.8");
    assert_eq!(cloud.count("instance_addresses"), 3);
}
