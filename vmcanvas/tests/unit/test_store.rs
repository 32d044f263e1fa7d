//! Machine store tests

use tempfile::TempDir;
use vmcanvas::deploy::fsm::DeploymentState;
use vmcanvas::errors::AppError;
use vmcanvas::filesys::file::File;
use vmcanvas::models::deployment::{DeploymentResult, DeploymentSuccess};
use vmcanvas::models::machine::{Application, InstanceSize, MachineUpdate, NewMachine, Region};
use vmcanvas::storage::machines::MachineStore;

fn store(dir: &TempDir) -> MachineStore {
    MachineStore::new(File::new(dir.path().join("machines.json")))
}

fn new_machine(id: &str, region: Region) -> NewMachine {
    NewMachine {
        id: Some(id.to_string()),
        name: Some("A".to_string()),
        region: Some(region),
        instance_size: Some(InstanceSize::T2Micro),
        application: Some(Application::None),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_defaults_to_pending() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let created = store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();
    assert_eq!(created.deployment_status, DeploymentState::Pending);
    assert!(!created.is_deployed);

    let fetched = store.get("vm-1").await.unwrap().unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    assert!(store.list().await.unwrap().is_empty());
    assert!(store.get("vm-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_rejects_missing_fields() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let record = NewMachine {
        id: Some("vm-1".to_string()),
        ..Default::default()
    };
    let err = store.create(record).await.unwrap_err();
    match err {
        AppError::ValidationError(msg) => {
            assert!(msg.contains("name"));
            assert!(msg.contains("instanceSize"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!store.file().exists().await);
}

#[tokio::test]
async fn test_create_rejects_duplicate_id() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();
    let err = store.create(new_machine("vm-1", Region::EuWest1)).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_merges_only_given_fields() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();

    let update = MachineUpdate {
        instance_size: Some(InstanceSize::T3Large),
        ..Default::default()
    };
    let updated = store.update("vm-1", update).await.unwrap().unwrap();
    assert_eq!(updated.instance_size, InstanceSize::T3Large);
    assert_eq!(updated.region, Region::UsWest1);
    assert_eq!(updated.name, "A");

    let fetched = store.get("vm-1").await.unwrap().unwrap();
    assert_eq!(fetched.instance_size, InstanceSize::T3Large);
}

#[tokio::test]
async fn test_update_missing_is_none() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let result = store.update("missing", MachineUpdate::default()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_update_rejects_invalid_status_transition() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();

    let update = MachineUpdate {
        deployment_status: Some(DeploymentState::Deployed),
        ..Default::default()
    };
    let err = store.update("vm-1", update).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let fetched = store.get("vm-1").await.unwrap().unwrap();
    assert_eq!(fetched.deployment_status, DeploymentState::Pending);
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();

    assert!(store.delete("vm-1").await.unwrap());
    assert!(store.get("vm-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_missing_leaves_store_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();
    let before = store.file().read_string().await.unwrap();

    assert!(!store.delete("missing-id").await.unwrap());

    let after = store.file().read_string().await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_queries_by_status_and_region() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();
    store.create(new_machine("vm-2", Region::EuWest1)).await.unwrap();
    store.create(new_machine("vm-3", Region::EuWest1)).await.unwrap();
    store.mark_deploying("vm-3").await.unwrap();

    let eu = store.list_by_region(Region::EuWest1).await.unwrap();
    assert_eq!(eu.len(), 2);

    let deploying = store.list_by_status(DeploymentState::Deploying).await.unwrap();
    assert_eq!(deploying.len(), 1);
    assert_eq!(deploying[0].id, "vm-3");

    store.clear().await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_record_deployment_success_sets_connection_fields() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();
    store.mark_deploying("vm-1").await.unwrap();

    let result = DeploymentResult::Success(DeploymentSuccess {
        public_ip: "1.2.3.4".to_string(),
        ssh_key_name: "vm-key-vm-1".to_string(),
        deployment_dir: "/data/deployments/d".to_string(),
        ssh_command: "ssh -i /data/deployments/d/vm-key-vm-1 ubuntu@1.2.3.4".to_string(),
        bootstrap_warning: None,
    });
    let machine = store.record_deployment("vm-1", &result).await.unwrap().unwrap();

    assert!(machine.is_deployed);
    assert_eq!(machine.deployment_status, DeploymentState::Deployed);
    assert_eq!(machine.public_ip.as_deref(), Some("1.2.3.4"));
    assert_eq!(machine.ssh_key_name.as_deref(), Some("vm-key-vm-1"));
    machine.check_invariants().unwrap();
}

#[tokio::test]
async fn test_record_deployment_failure_sets_failed() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();
    store.mark_deploying("vm-1").await.unwrap();

    let machine = store
        .record_deployment("vm-1", &DeploymentResult::failure("Terraform apply failed"))
        .await
        .unwrap()
        .unwrap();
    assert!(!machine.is_deployed);
    assert_eq!(machine.deployment_status, DeploymentState::Failed);
    assert!(machine.public_ip.is_none());
}

#[tokio::test]
async fn test_record_deployment_ignores_machine_not_deploying() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.create(new_machine("vm-1", Region::UsWest1)).await.unwrap();

    let recorded = store
        .record_deployment("vm-1", &DeploymentResult::failure("Terraform apply failed"))
        .await
        .unwrap();
    assert!(recorded.is_none());

    let machine = store.get("vm-1").await.unwrap().unwrap();
    assert_eq!(machine.deployment_status, DeploymentState::Pending);
    assert!(store.record_deployment("nope", &DeploymentResult::failure("x")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_file_is_storage_error() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.file().write_string("not json").await.unwrap();

    let err = store.list().await.unwrap_err();
    assert!(matches!(err, AppError::StorageError(_)));
}

#[tokio::test]
async fn test_concurrent_creates_are_all_kept() {
    let dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(store(&dir));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create(new_machine(&format!("vm-{i}"), Region::UsEast1))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.list().await.unwrap().len(), 8);
}
