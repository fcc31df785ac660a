//! End-to-end provisioning and masking against the simulated provider

use assert_matches::assert_matches;
use smis_array_client::{
    ArrayClient, ArraySnapshot, ClientConfig, Error, GroupKind, HardwareIdKey, JobState,
    ServiceKind, ServiceSelection, SimulatedArray, TargetEndpoint,
};
use std::sync::Arc;

const SID: &str = "000196701380";
const HOST_WWN: &str = "10000000C94E5D22";
const GIB: u64 = 1 << 30;

fn fast_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.poll.interval_ms = 1;
    config.poll.max_attempts = Some(50);
    config
}

#[tokio::test]
async fn test_export_volume_to_host() {
    let array = Arc::new(SimulatedArray::new());
    let seeded = array.add_system(SID, 5978);
    array.add_srp(&seeded, "SRP_1");
    let fa = array.add_front_end_port(&seeded, "FA-1D", "4", "5000097308012C10");
    let client = ArrayClient::new(array.clone(), fast_config()).unwrap();

    let system = client.resolver().resolve_system(SID).await.unwrap();
    assert_eq!(system, seeded);
    assert!(client.resolver().is_generation_v3(&system).await);

    let pool = client.resolver().resolve_pools(&system).await.unwrap().remove(0);
    let volume = client
        .provisioning()
        .create_volume(&system, &pool, "oradata", 20 * GIB)
        .await
        .unwrap();

    let masking = client.masking();
    let hardware_id = masking.register_hardware_id(&system, HOST_WWN, 2).await.unwrap();
    array.record_login(HOST_WWN, &fa);

    let sg = masking.create_group(&system, "sg_ora", GroupKind::Storage).await.unwrap();
    let ig = masking.create_group(&system, "ig_host1", GroupKind::Initiator).await.unwrap();
    let pg = masking.create_group(&system, "pg_fa1d", GroupKind::Port).await.unwrap();
    masking.add_members(&system, &sg, &[volume.clone()]).await.unwrap();
    masking.add_members(&system, &ig, &[hardware_id.clone()]).await.unwrap();
    masking.add_members(&system, &pg, &[fa]).await.unwrap();

    let views = masking
        .create_masking_view(&system, "mv_ora", &sg, &ig, &pg)
        .await
        .unwrap();
    assert_eq!(views.len(), 1);

    let inventory = client.inventory();
    assert_eq!(inventory.masking_views(&system).await.unwrap(), views);
    assert_eq!(inventory.volume_by_name(&system, "oradata").await.unwrap(), volume);

    let endpoints = client
        .provisioning()
        .target_endpoints(&system, &hardware_id)
        .await
        .unwrap();
    assert_eq!(
        endpoints,
        vec![TargetEndpoint {
            wwn: "5000097308012C10".into(),
            director: "FA-1D".into(),
            port: "4".into(),
        }]
    );

    // Tear down in reverse
    masking.delete_masking_view(&system, &views[0]).await.unwrap();
    assert_eq!(inventory.storage_groups(&system).await.unwrap(), vec![sg.clone()]);
    masking.remove_members(&system, &sg, &[volume.clone()]).await.unwrap();
    masking.delete_group(&system, &sg, false).await.unwrap();
    masking.delete_group(&system, &ig, true).await.unwrap();
    masking.delete_group(&system, &pg, true).await.unwrap();
    masking.unregister_hardware_id(&system, &hardware_id).await.unwrap();
    client.provisioning().delete_volume(&system, &volume).await.unwrap();

    assert!(inventory.masking_views(&system).await.unwrap().is_empty());
    assert!(inventory.hardware_ids(&system).await.unwrap().is_empty());
    assert!(inventory.volumes(&system).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registered_identity_round_trips_through_key() {
    let array = Arc::new(SimulatedArray::new());
    array.add_system(SID, 5978);
    let client = ArrayClient::new(array.clone(), fast_config()).unwrap();
    let system = client.resolver().resolve_system(SID).await.unwrap();

    let path = client
        .masking()
        .register_hardware_id(&system, "iqn.1993-08.org.debian:01:host1", 5)
        .await
        .unwrap();
    let key: HardwareIdKey = path.key("InstanceID").unwrap().parse().unwrap();
    assert_eq!(key.iqn(), Some("iqn.1993-08.org.debian:01:host1"));
    assert_eq!(key.wwn(), None);
}

#[tokio::test]
async fn test_snapshot_array_refuses_busy_deletes() {
    let snapshot = r#"
systems:
  - id: "000196701380"
    microcode_family: 5978
    srps: [{ name: SRP_1 }]
    volumes:
      - { device_id: "00123", name: oradata, pool: SRP_1 }
    directors:
      - name: FA-1D
        ports: [{ port: "4", wwn: "5000097308012C10" }]
    hardware_ids:
      - { id_type: wwn, value: "10000000C94E5D22", logged_in_to: ["FA-1D-4"] }
    groups:
      - { name: sg_ora, kind: storage, members: ["00123"] }
      - { name: ig_host1, kind: initiator, members: ["10000000C94E5D22"] }
      - { name: pg_fa1d, kind: port, members: ["FA-1D-4"] }
    masking_views:
      - { name: mv_ora, storage_group: sg_ora, initiator_group: ig_host1, port_group: pg_fa1d }
"#;
    let array = ArraySnapshot::from_yaml(snapshot).unwrap().build().unwrap();
    let client = ArrayClient::new(Arc::new(array), fast_config()).unwrap();
    let system = client.resolver().resolve_system(SID).await.unwrap();
    let inventory = client.inventory();

    let volume = inventory.volume_by_id(&system, "00123").await.unwrap();
    assert_matches!(
        client.provisioning().delete_volume(&system, &volume).await,
        Err(Error::JobFailed {
            state: JobState::Exception,
            ..
        })
    );

    let sg = inventory.storage_groups(&system).await.unwrap().remove(0);
    let result = client.masking().delete_group(&system, &sg, true).await;
    assert_matches!(result, Err(Error::JobFailed { description: Some(_), .. }));
}

#[tokio::test]
async fn test_duplicate_service_policy() {
    let array = Arc::new(SimulatedArray::new());
    let system = array.add_system(SID, 5978);
    array.add_service(&system, ServiceKind::ControllerConfiguration, "Standby");

    let strict = ArrayClient::new(array.clone(), fast_config()).unwrap();
    assert_matches!(
        strict.masking().create_group(&system, "sg1", GroupKind::Storage).await,
        Err(Error::AmbiguousService { count: 2, .. })
    );

    let mut config = fast_config();
    config.service_selection = ServiceSelection::FirstMatch;
    let lenient = ArrayClient::new(array.clone(), config).unwrap();
    lenient
        .masking()
        .create_group(&system, "sg1", GroupKind::Storage)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_provider() {
    let array = Arc::new(SimulatedArray::new());
    array.add_system(SID, 5978);
    array.set_offline(true);
    let client = ArrayClient::new(array, fast_config()).unwrap();

    let err = client.resolver().resolve_system(SID).await.unwrap_err();
    assert!(err.is_transient());
}
