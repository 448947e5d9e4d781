use std::time::Duration;

use chrono::{
    Duration as ChronoDuration,
    Utc,
};
use hetzmetal_commons::models::conditions::{
    ConditionType,
    get_condition,
};
use hetzmetal_commons::models::hardware::{
    HardwareDetails,
    StorageDevice,
};
use hetzmetal_commons::models::host::{
    BARE_METAL_HOST_FINALIZER,
    BareMetalHost,
    ErrorType,
    HostSpec,
    ProvisioningState as State,
    REBOOT_ANNOTATION,
    RebootType,
    RootDeviceHints,
};
use hetzmetal_commons::models::install_image::{
    Image,
    InstallImage,
    Partition,
};
use hetzmetal_commons::models::ssh::{
    SecretStatus,
    SshSecret,
};
use hetzmetal_robot::RobotError;
use hetzmetal_robot::mock::{
    MockRobotClient,
    RobotCall,
};
use hetzmetal_robot::models::{
    Server,
    SshKey,
};
use hetzmetal_ssh::mock::{
    MockSshClient,
    MockSshFactory,
};
use hetzmetal_ssh::{
    SshOutput,
    SshTransportError,
};

use crate::host::{
    HostSecrets,
    HostStateMachine,
};
use crate::reconcile::ActionResult;

const SERVER_ID: i64 = 42;
const INSTALL_PORT: u16 = 24;
const CLOUD_INIT_PORT: u16 = 2222;

fn secrets() -> HostSecrets {
    HostSecrets {
        rescue: SshSecret {
            name: "rescue-sshkey".to_string(),
            public_key: "ssh-ed25519 AAAA rescue".to_string(),
            private_key: "rescue-private".to_string(),
        },
        os: SshSecret {
            name: "os-sshkey".to_string(),
            public_key: "ssh-ed25519 BBBB os".to_string(),
            private_key: "os-private".to_string(),
        },
    }
}

fn install_image() -> InstallImage {
    InstallImage {
        image: Image {
            name: "ubuntu-24.04".to_string(),
            url: "https://images.example.com/ubuntu-24.04.tar.gz".to_string(),
            path: String::new(),
        },
        partitions: vec![Partition {
            mount: "/".to_string(),
            file_system: "ext4".to_string(),
            size: "all".to_string(),
        }],
        ..Default::default()
    }
}

fn hardware_details() -> HardwareDetails {
    HardwareDetails {
        ram_mebibytes: 2048,
        storage: vec![StorageDevice {
            name: "nvme0n1".to_string(),
            wwn: "eui.AAA".to_string(),
            size_bytes: 512_110_190_592,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn host_in_state(state: State) -> BareMetalHost {
    let mut host = BareMetalHost {
        name: "host-0".to_string(),
        finalizers: vec![BARE_METAL_HOST_FINALIZER.to_string()],
        spec: HostSpec {
            server_id: SERVER_ID,
            root_device_hints: Some(RootDeviceHints {
                wwn: "eui.AAA".to_string(),
            }),
            install_image: Some(install_image()),
            user_data: Some("#cloud-config\n".to_string()),
            consumer_ref: Some("worker-3".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    host.spec.ssh_spec.secret_ref.name = "robot-ssh".to_string();
    host.spec.ssh_spec.port_after_install_image = INSTALL_PORT;
    host.spec.ssh_spec.port_after_cloud_init = CLOUD_INIT_PORT;

    host.status.provisioning_state = state;
    if state != State::None {
        host.status.ip = Some("192.0.2.10".to_string());
        host.status.reboot_types = vec![RebootType::Software, RebootType::Hardware];
        host.status.ssh_status.rescue_key_fingerprint = Some("fp1".to_string());
    }
    if matches!(
        state,
        State::ImageInstalling
            | State::Provisioning
            | State::EnsureProvisioned
            | State::Provisioned
    ) {
        host.status.hardware_details = Some(hardware_details());
    }
    host
}

fn robot_with_server() -> MockRobotClient {
    MockRobotClient::new()
        .with_server(Server {
            server_number: SERVER_ID,
            server_ip: "192.0.2.10".to_string(),
            rescue: true,
            ..Default::default()
        })
        .with_ssh_key(SshKey {
            name: "rescue-sshkey".to_string(),
            fingerprint: "fp1".to_string(),
            ..Default::default()
        })
}

fn script_rescue_inventory(rescue: &MockSshClient) {
    rescue.push("get_hostname", SshOutput::ok("rescue\n"));
    rescue.push("get_hardware_details_ram", SshOutput::ok("2097152\n"));
    rescue.push(
        "get_hardware_details_nics",
        SshOutput::ok(
            "name=\"eth0\" model=\"Intel I210\" mac=\"aa:bb:cc:dd:ee:ff\" \
             ip=\"192.0.2.10/24\" speedMbps=\"1000\"\n",
        ),
    );
    rescue.push(
        "get_hardware_details_storage",
        SshOutput::ok(
            "NAME=\"nvme0n1\" TYPE=\"disk\" SIZE=\"512110190592\" VENDOR=\"\" MODEL=\"X\" \
             SERIAL=\"S\" WWN=\"eui.AAA\" HCTL=\"\" ROTA=\"0\"\n",
        ),
    );
    rescue.push("get_hardware_details_cpu_arch", SshOutput::ok("x86_64\n"));
    rescue.push(
        "get_hardware_details_cpu_model",
        SshOutput::ok("AMD Ryzen 5 3600\n"),
    );
    rescue.push(
        "get_hardware_details_cpu_clock_gigahertz",
        SshOutput::ok("4.2\n"),
    );
    rescue.push("get_hardware_details_cpu_threads", SshOutput::ok("12\n"));
    rescue.push("get_hardware_details_cpu_flags", SshOutput::ok("fpu vme\n"));
}

async fn reconcile_once(
    host: &mut BareMetalHost, robot: &MockRobotClient, factory: &MockSshFactory,
) -> ActionResult {
    let mut machine = HostStateMachine::new(host, robot, factory, secrets());
    machine.reconcile().await
}

fn assert_continue(result: &ActionResult, secs: u64) {
    match result {
        ActionResult::Continue { requeue_after } => {
            assert_eq!(*requeue_after, Duration::from_secs(secs));
        }
        other => panic!("expected Continue, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_provisioning_walk() {
    let mut host = host_in_state(State::None);
    let robot = robot_with_server();
    let factory = MockSshFactory::new();

    let rescue = factory.client_for_port(22);
    script_rescue_inventory(&rescue);

    let os_install = factory.client_for_port(INSTALL_PORT);
    os_install.push("get_hostname", SshOutput::ok("bm-worker-3\n"));
    os_install.push("ensure_cloud_init", SshOutput::ok("/usr/bin/cloud-init\n"));

    let os_final = factory.client_for_port(CLOUD_INIT_PORT);
    os_final.push("cloud_init_status", SshOutput::ok("status: done\n"));

    let mut visited = vec![host.status.provisioning_state];
    for _ in 0..12 {
        let result = reconcile_once(&mut host, &robot, &factory).await;
        assert!(
            !matches!(result, ActionResult::Error(_) | ActionResult::Failed { .. }),
            "unexpected failure in {:?}: {result:?}",
            visited.last()
        );
        visited.push(host.status.provisioning_state);
        if host.status.provisioning_state == State::Provisioned {
            break;
        }
    }

    assert_eq!(host.status.provisioning_state, State::Provisioned);
    assert_eq!(
        visited,
        vec![
            State::None,
            State::Registering,
            State::Available,
            State::ImageInstalling,
            State::Provisioning,
            State::EnsureProvisioned,
            State::Provisioned,
        ]
    );
    assert_eq!(host.status.error_count, 0);
    assert_eq!(host.status.error_type, None);
    assert_eq!(
        host.status.hardware_details.as_ref().unwrap().ram_mebibytes,
        2048
    );
    assert_eq!(
        host.status.ssh_status.rescue_key_fingerprint.as_deref(),
        Some("fp1")
    );

    // Exactly one API reboot (leaving None) and one server rename.
    assert_eq!(robot.reboots(), vec![(SERVER_ID, RebootType::Software)]);
    let renames: Vec<_> = robot
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RobotCall::SetServerName { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(renames, vec!["bm-worker-3".to_string()]);

    // The OS key was uploaded exactly once; the rescue key was already there.
    let uploads: Vec<_> = robot
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RobotCall::SetSshKey { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(uploads, vec!["os-sshkey".to_string()]);
}

#[tokio::test]
async fn test_registering_escalates_on_ssh_timeout() {
    let mut host = host_in_state(State::Registering);
    host.status.error_type = Some(ErrorType::SshRebootTriggered);
    host.status.error_message = "ssh reboot triggered".to_string();
    host.status.error_count = 1;
    host.status.last_updated = Some(Utc::now() - ChronoDuration::minutes(6));

    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    factory.client_for_port(22).push(
        "get_hostname",
        SshOutput::transport_error(SshTransportError::Timeout),
    );
    // The secondary probe on the install port stays silent as well.
    factory.client_for_port(INSTALL_PORT).push(
        "get_hostname",
        SshOutput::transport_error(SshTransportError::Timeout),
    );

    let result = reconcile_once(&mut host, &robot, &factory).await;

    assert_continue(&result, 5);
    assert_eq!(
        host.status.error_type,
        Some(ErrorType::SoftwareRebootTriggered)
    );
    assert_eq!(robot.reboots(), vec![(SERVER_ID, RebootType::Software)]);
    assert_eq!(host.status.provisioning_state, State::Registering);
}

#[tokio::test]
async fn test_registering_wrong_boot_rearms_rescue() {
    let mut host = host_in_state(State::Registering);
    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    factory
        .client_for_port(22)
        .push("get_hostname", SshOutput::ok("some-machine\n"));

    let result = reconcile_once(&mut host, &robot, &factory).await;

    assert_continue(&result, 5);
    assert_eq!(
        host.status.error_type,
        Some(ErrorType::SoftwareRebootTriggered)
    );
    assert_eq!(robot.reboots(), vec![(SERVER_ID, RebootType::Software)]);
    assert!(robot.calls().contains(&RobotCall::SetBootRescue {
        server_id: SERVER_ID,
        fingerprint: "fp1".to_string()
    }));
}

#[tokio::test]
async fn test_ssh_key_collision_is_fatal() {
    let mut host = host_in_state(State::None);
    let robot = MockRobotClient::new()
        .with_server(Server {
            server_number: SERVER_ID,
            server_ip: "192.0.2.10".to_string(),
            rescue: true,
            ..Default::default()
        })
        .fail_set_ssh_key(RobotError::KeyAlreadyExists);
    let factory = MockSshFactory::new();

    let result = reconcile_once(&mut host, &robot, &factory).await;

    match result {
        ActionResult::Failed { error_type, .. } => {
            assert_eq!(error_type, ErrorType::FatalError);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    let condition = get_condition(
        &host.status.conditions,
        ConditionType::SshKeyAlreadyExists,
    )
    .unwrap();
    assert!(condition.status);

    // No further vendor calls after the failing upload.
    assert!(matches!(
        robot.calls().last(),
        Some(RobotCall::SetSshKey { .. })
    ));
}

#[tokio::test]
async fn test_available_waits_for_claim() {
    let mut host = host_in_state(State::Available);
    host.spec.install_image = None;
    host.spec.consumer_ref = None;

    let robot = robot_with_server();
    let factory = MockSshFactory::new();

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert_continue(&result, 10);
    assert_eq!(host.status.provisioning_state, State::Available);

    host.spec.install_image = Some(install_image());
    host.spec.consumer_ref = Some("worker-3".to_string());

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert!(result.is_complete());
    assert_eq!(host.status.provisioning_state, State::ImageInstalling);
}

#[tokio::test]
async fn test_registering_requires_root_device_hints() {
    let mut host = host_in_state(State::Registering);
    host.spec.root_device_hints = None;

    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    script_rescue_inventory(&factory.client_for_port(22));

    let result = reconcile_once(&mut host, &robot, &factory).await;
    match result {
        ActionResult::Failed { error_type, .. } => {
            assert_eq!(error_type, ErrorType::RegistrationError);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(host.status.error_message, "no root device hints specified yet");
}

#[tokio::test]
async fn test_registering_requires_matching_storage_device() {
    let mut host = host_in_state(State::Registering);
    host.spec.root_device_hints = Some(RootDeviceHints {
        wwn: "eui.OTHER".to_string(),
    });

    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    script_rescue_inventory(&factory.client_for_port(22));

    let result = reconcile_once(&mut host, &robot, &factory).await;
    match result {
        ActionResult::Failed { error_type, .. } => {
            assert_eq!(error_type, ErrorType::RegistrationError);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(
        host.status.error_message,
        "no storage device found with root device hints"
    );
}

#[tokio::test]
async fn test_image_installing_rejects_bad_suffix() {
    let mut host = host_in_state(State::ImageInstalling);
    if let Some(install_image) = &mut host.spec.install_image {
        install_image.image.url = "https://images.example.com/ubuntu.qcow2".to_string();
    }

    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    factory
        .client_for_port(22)
        .push("get_hostname", SshOutput::ok("rescue\n"));

    let result = reconcile_once(&mut host, &robot, &factory).await;
    match result {
        ActionResult::Failed { error_type, .. } => {
            assert_eq!(error_type, ErrorType::ProvisioningError);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(host.status.error_message, "wrong image url suffix");
}

#[tokio::test]
async fn test_repeated_failure_increments_error_count() {
    let mut host = host_in_state(State::Registering);
    host.spec.root_device_hints = None;

    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    script_rescue_inventory(&factory.client_for_port(22));

    for expected_count in 1..=3u32 {
        let result = reconcile_once(&mut host, &robot, &factory).await;
        match result {
            ActionResult::Failed { error_count, .. } => {
                assert_eq!(error_count, expected_count);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_cancellation_moves_to_deprovisioning() {
    let mut host = host_in_state(State::Provisioning);
    host.spec.install_image = None;

    let robot = robot_with_server();
    let factory = MockSshFactory::new();

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert!(result.is_complete());
    assert_eq!(host.status.provisioning_state, State::Available);
    assert_eq!(host.spec.consumer_ref, None);
    assert_eq!(host.spec.user_data, None);

    // The machine-name prefix was dropped at the vendor.
    assert!(robot.calls().contains(&RobotCall::SetServerName {
        server_id: SERVER_ID,
        name: "host-0".to_string()
    }));
}

#[tokio::test]
async fn test_os_secret_rotation_while_provisioned_is_fatal() {
    let mut host = host_in_state(State::Provisioned);
    let rotated = SshSecret {
        name: "os-sshkey".to_string(),
        public_key: "ssh-ed25519 OLD os".to_string(),
        private_key: "old-private".to_string(),
    };
    host.status.ssh_status.current_os = Some(SecretStatus::from_secret("robot-ssh", &rotated));

    let robot = robot_with_server();
    let factory = MockSshFactory::new();

    let result = reconcile_once(&mut host, &robot, &factory).await;
    match result {
        ActionResult::Failed { error_type, .. } => {
            assert_eq!(error_type, ErrorType::RegistrationError);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(host.status.provisioning_state, State::Provisioned);
}

#[tokio::test]
async fn test_os_secret_rotation_during_provisioning_reinstalls() {
    let mut host = host_in_state(State::Provisioning);
    let rotated = SshSecret {
        name: "os-sshkey".to_string(),
        public_key: "ssh-ed25519 OLD os".to_string(),
        private_key: "old-private".to_string(),
    };
    host.status.ssh_status.current_os = Some(SecretStatus::from_secret("robot-ssh", &rotated));

    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    // The server is still in the installed OS, so the rescue probe times out
    // and the machine stays in ImageInstalling waiting for the reboot.
    factory.client_for_port(22).push(
        "get_hostname",
        SshOutput::transport_error(SshTransportError::Timeout),
    );

    let _ = reconcile_once(&mut host, &robot, &factory).await;
    // The rotation rolled the machine back to image installation.
    assert_eq!(host.status.provisioning_state, State::ImageInstalling);
}

#[tokio::test]
async fn test_rescue_secret_rotation_resets_host() {
    let mut host = host_in_state(State::Available);
    let rotated = SshSecret {
        name: "rescue-sshkey".to_string(),
        public_key: "ssh-ed25519 OLD rescue".to_string(),
        private_key: "old-private".to_string(),
    };
    host.status.ssh_status.current_rescue =
        Some(SecretStatus::from_secret("rescue-sshkey", &rotated));
    host.status.hardware_details = Some(hardware_details());

    let robot = robot_with_server();
    let factory = MockSshFactory::new();

    let _ = reconcile_once(&mut host, &robot, &factory).await;
    // The host restarted its lifetime: state came out of the None handler
    // and the previously collected hardware details were dropped.
    assert_eq!(host.status.hardware_details, None);
    assert_eq!(host.status.provisioning_state, State::Registering);
}

#[tokio::test]
async fn test_ensure_provisioned_cloud_init_error_is_fatal() {
    let mut host = host_in_state(State::EnsureProvisioned);
    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    factory
        .client_for_port(CLOUD_INIT_PORT)
        .push("cloud_init_status", SshOutput::ok("status: error\n"));

    let result = reconcile_once(&mut host, &robot, &factory).await;
    match result {
        ActionResult::Failed { error_type, .. } => {
            assert_eq!(error_type, ErrorType::FatalError);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ensure_provisioned_sigterm_triggers_rerun() {
    let mut host = host_in_state(State::EnsureProvisioned);
    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    let os_final = factory.client_for_port(CLOUD_INIT_PORT);
    os_final.push("cloud_init_status", SshOutput::ok("status: done\n"));
    os_final.push(
        "check_cloud_init_logs_for_sigterm",
        SshOutput::ok("2024-01-01 cloud-init received SIGTERM\n"),
    );

    let result = reconcile_once(&mut host, &robot, &factory).await;

    assert_continue(&result, 5);
    assert_eq!(host.status.provisioning_state, State::EnsureProvisioned);
    assert_eq!(host.status.error_type, Some(ErrorType::SshRebootTriggered));
    assert_eq!(os_final.call_count("clean_cloud_init_logs"), 1);
    assert_eq!(os_final.call_count("clean_cloud_init_instances"), 1);
    assert_eq!(os_final.call_count("reboot"), 1);
}

#[tokio::test]
async fn test_ensure_provisioned_falls_back_to_old_port() {
    let mut host = host_in_state(State::EnsureProvisioned);
    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    factory.client_for_port(CLOUD_INIT_PORT).push(
        "cloud_init_status",
        SshOutput::transport_error(SshTransportError::ConnectionRefused),
    );
    let os_install = factory.client_for_port(INSTALL_PORT);
    os_install.push("cloud_init_status", SshOutput::ok("status: running\n"));

    let result = reconcile_once(&mut host, &robot, &factory).await;

    assert_continue(&result, 5);
    assert_eq!(os_install.call_count("cloud_init_status"), 1);
    assert_eq!(host.status.provisioning_state, State::EnsureProvisioned);
}

#[tokio::test]
async fn test_provisioned_reboot_annotation_flow() {
    let mut host = host_in_state(State::Provisioned);
    host.annotations
        .insert(REBOOT_ANNOTATION.to_string(), "".to_string());

    let robot = robot_with_server();
    let factory = MockSshFactory::new();
    let os_final = factory.client_for_port(CLOUD_INIT_PORT);
    os_final.push("get_hostname", SshOutput::ok("bm-worker-3\n"));

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert_continue(&result, 5);
    assert!(host.status.rebooted);
    assert_eq!(os_final.call_count("reboot"), 1);
    assert!(host.has_reboot_annotation());

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert_continue(&result, 180);
    assert!(!host.status.rebooted);
    assert!(!host.has_reboot_annotation());
    // The reboot was issued exactly once.
    assert_eq!(os_final.call_count("reboot"), 1);
}

#[tokio::test]
async fn test_deletion_deprovisions_then_deletes() {
    let mut host = host_in_state(State::Provisioned);
    host.deletion_timestamp = Some(Utc::now());

    let robot = robot_with_server();
    let factory = MockSshFactory::new();

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert!(result.is_complete());
    assert_eq!(host.status.provisioning_state, State::Available);

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert!(matches!(result, ActionResult::DeleteComplete));
    assert!(host.finalizers.is_empty());
}

#[tokio::test]
async fn test_rate_limit_marks_condition() {
    let mut host = host_in_state(State::ImageInstalling);
    let robot = MockRobotClient::new()
        .fail_set_ssh_key(RobotError::RateLimitExceeded("limit reached".to_string()));
    let factory = MockSshFactory::new();

    let result = reconcile_once(&mut host, &robot, &factory).await;
    assert!(matches!(result, ActionResult::Error(_)));
    let condition = get_condition(&host.status.conditions, ConditionType::RateLimited).unwrap();
    assert!(condition.status);
    assert!(condition.message.contains("limit reached"));
}
