/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::sync::Arc;

use test_log::test;

use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MbaAllocation;
use rdt_shared::types::MonEvent;
use rdt_shared::types::Pid;
use rdt_shared::types::Technology;

use rdt_config::InterfaceChoice;
use rdt_config::RdtConfig;
use rdt_test_utils::two_socket_cpu_info;
use rdt_test_utils::FakeResctrl;
use rdt_test_utils::FakeResctrlLayout;

use super::spy::CallLog;
use super::spy::Origin;
use super::spy::SpyBackend;
use super::spy::SpyPidMonitor;
use super::spy::SwitchSelector;
use super::RdtApi;
use crate::monitoring::GroupState;
use crate::monitoring::MonGroup;
use crate::monitoring::MonTarget;
use crate::BackendError;
use crate::Backends;
use crate::ErrorKind;
use crate::Interface;
use crate::RdtError;
use crate::StaticSelector;

fn spy_api(interface: Interface) -> (RdtApi, CallLog) {
    let log = CallLog::default();
    let backends = Backends::new(
        StaticSelector::new(interface),
        SpyBackend::new(Origin::Hardware, log.clone()),
        SpyBackend::new(Origin::Os, log.clone()),
    );
    let api = RdtApi::new();
    api.init(backends).unwrap();
    (api, log)
}

fn spy_api_with_pid_monitor() -> (RdtApi, CallLog) {
    let log = CallLog::default();
    let backends = Backends::new(
        StaticSelector::new(Interface::Msr),
        SpyBackend::new(Origin::Hardware, log.clone()),
        SpyBackend::new(Origin::Os, log.clone()),
    )
    .with_pid_monitor(SpyPidMonitor::new(log.clone()));
    let api = RdtApi::new();
    api.init(backends).unwrap();
    (api, log)
}

fn started_group(api: &RdtApi, core_id: u32) -> MonGroup {
    let mut group = MonGroup::new();
    api.mon_start(&[core_id.into()], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();
    group
}

#[test]
fn operations_before_init_fail_without_backend_calls() {
    let (api, log) = spy_api(Interface::Msr);
    api.fini().unwrap();

    let mut group = MonGroup::new();
    let results = [
        api.alloc_assoc_set(0.into(), ClassId::new(1)).map(|_| ()),
        api.alloc_assoc_get(0.into()).map(|_| ()),
        api.alloc_assign(Technology::L3CA, &[0.into()]).map(|_| ()),
        api.alloc_release(&[0.into()]),
        api.alloc_reset(CdpConfig::Any),
        api.l3ca_set(0.into(), &[L3Allocation::new(1, 0xF)]),
        api.l3ca_get(0.into(), 16).map(|_| ()),
        api.l2ca_set(0.into(), &[L2Allocation::new(1, 0xF)]),
        api.l2ca_get(0.into(), 16).map(|_| ()),
        api.mba_set(0.into(), &[MbaAllocation::new(1, 50)]).map(|_| ()),
        api.mba_get(0.into(), 16).map(|_| ()),
        // MBA requests are only checked by the backend.
        api.mba_set(0.into(), &[]).map(|_| ()),
        api.mba_get(0.into(), 0).map(|_| ()),
        api.mon_reset(),
        api.mon_assoc_get(0.into()).map(|_| ()),
        api.mon_start(&[0.into()], MonEvent::L3_OCCUP, None, &mut group),
        api.mon_start_pid(Pid::new(1), MonEvent::L3_OCCUP, None, &mut group),
    ];

    for result in results {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Init);
    }
    assert!(log.is_empty());
    assert_eq!(group.state(), GroupState::Inactive);
}

#[test]
fn init_and_fini_are_checked() {
    let (api, log) = spy_api(Interface::Msr);
    assert!(api.is_initialized());

    let second = Backends::new(
        StaticSelector::new(Interface::Os),
        SpyBackend::new(Origin::Hardware, log.clone()),
        SpyBackend::new(Origin::Os, log.clone()),
    );
    assert!(matches!(
        api.init(second),
        Err(RdtError::AlreadyInitialized)
    ));

    api.fini().unwrap();
    assert!(!api.is_initialized());
    assert!(matches!(api.fini(), Err(RdtError::NotInitialized)));
}

#[test]
fn empty_inputs_are_rejected_before_the_gate() {
    // Not initialized, so anything that passes the gate would fail with an Init error.
    let api = RdtApi::new();
    let mut group = MonGroup::new();

    let results = [
        api.alloc_assign(Technology::empty(), &[0.into()]).map(|_| ()),
        api.alloc_assign(Technology::from_bits_retain(1), &[0.into()])
            .map(|_| ()),
        api.alloc_assign(Technology::L3CA, &[]).map(|_| ()),
        api.alloc_release(&[]),
        api.alloc_reset_raw(3),
        api.l3ca_set(0.into(), &[]),
        api.l3ca_get(0.into(), 0).map(|_| ()),
        api.l2ca_set(0.into(), &[]),
        api.l2ca_get(0.into(), 0).map(|_| ()),
        api.mon_start(&[], MonEvent::L3_OCCUP, None, &mut group),
        api.mon_start(&[0.into()], MonEvent::empty(), None, &mut group),
        api.mon_start_pid(Pid::new(-1), MonEvent::L3_OCCUP, None, &mut group),
        api.mon_stop(&mut group),
        api.mon_poll(&mut []),
    ];

    for result in results {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Param);
    }
}

#[test]
fn raw_cdp_config_is_validated() {
    let (api, log) = spy_api(Interface::Msr);

    let error = api.alloc_reset_raw(7).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(log.is_empty());

    api.alloc_reset_raw(CdpConfig::On.as_raw()).unwrap();
    assert_eq!(log.calls(), vec![(Origin::Hardware, "alloc_reset")]);
}

#[test]
fn non_contiguous_l3_entry_is_rejected_without_backend_call() {
    let (api, log) = spy_api(Interface::Msr);
    let allocations = [
        L3Allocation::new(1, 0x0F),
        L3Allocation::new(2, 0b1010),
        L3Allocation::new(3, 0xF0),
    ];

    let error = api.l3ca_set(0.into(), &allocations).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(log.is_empty());
}

#[test]
fn cdp_masks_are_checked_independently() {
    let (api, log) = spy_api(Interface::Msr);

    let bad_code = [L3Allocation::with_cdp(1, 0b101, 0b11)];
    let bad_data = [L3Allocation::with_cdp(1, 0b11, 0)];
    assert_eq!(
        api.l3ca_set(0.into(), &bad_code).unwrap_err().kind(),
        ErrorKind::Param
    );
    assert_eq!(
        api.l3ca_set(0.into(), &bad_data).unwrap_err().kind(),
        ErrorKind::Param
    );
    assert!(log.is_empty());

    api.l3ca_set(0.into(), &[L3Allocation::with_cdp(1, 0b110, 0b11)])
        .unwrap();
    assert_eq!(log.calls(), vec![(Origin::Hardware, "l3ca_set")]);
}

#[test]
fn non_contiguous_l2_entry_is_rejected_without_backend_call() {
    let (api, log) = spy_api(Interface::Os);
    let allocations = [L2Allocation::new(1, 0x3), L2Allocation::new(2, 0x9)];

    let error = api.l2ca_set(0.into(), &allocations).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(log.is_empty());
}

#[test]
fn allocation_goes_to_the_selected_backend() {
    let (api, log) = spy_api(Interface::Os);

    api.l3ca_set(1.into(), &[L3Allocation::new(1, 0xFF)]).unwrap();
    let class_id = api.alloc_assign(Technology::L3CA, &[2.into()]).unwrap();
    let l3 = api.l3ca_get(1.into(), 4).unwrap();

    assert_eq!(class_id, ClassId::new(3));
    assert_eq!(l3, vec![L3Allocation::new(0, 0xFF)]);
    assert_eq!(
        log.calls(),
        vec![
            (Origin::Os, "l3ca_set"),
            (Origin::Os, "alloc_assign"),
            (Origin::Os, "l3ca_get"),
        ]
    );
}

#[test]
fn mba_always_goes_to_hardware() {
    let (api, log) = spy_api(Interface::Os);

    let actual = api
        .mba_set(0.into(), &[MbaAllocation::new(1, 40)])
        .unwrap();
    let current = api.mba_get(0.into(), 8).unwrap();

    assert_eq!(actual, vec![MbaAllocation::new(1, 40)]);
    assert_eq!(current, vec![MbaAllocation::new(0, 100)]);
    assert_eq!(
        log.calls(),
        vec![(Origin::Hardware, "mba_set"), (Origin::Hardware, "mba_get")]
    );
}

#[test]
fn rmid_operations_go_to_hardware() {
    let (api, log) = spy_api(Interface::Os);

    api.mon_reset().unwrap();
    api.mon_assoc_get(3.into()).unwrap();

    assert_eq!(
        log.calls(),
        vec![
            (Origin::Hardware, "mon_reset"),
            (Origin::Hardware, "mon_assoc_get")
        ]
    );
}

#[test]
fn selector_is_asked_on_every_call() {
    let log = CallLog::default();
    let selector = SwitchSelector::default();
    let backends = Backends::new(
        selector.clone(),
        SpyBackend::new(Origin::Hardware, log.clone()),
        SpyBackend::new(Origin::Os, log.clone()),
    );
    let api = RdtApi::new();
    api.init(backends).unwrap();

    selector.set_hardware(true);
    api.alloc_assoc_get(0.into()).unwrap();
    selector.set_hardware(false);
    api.alloc_assoc_get(0.into()).unwrap();
    api.mba_get(0.into(), 4).unwrap();

    assert_eq!(selector.queries(), 2);
    assert_eq!(
        log.calls(),
        vec![
            (Origin::Hardware, "alloc_assoc_get"),
            (Origin::Os, "alloc_assoc_get"),
            (Origin::Hardware, "mba_get"),
        ]
    );
}

#[test]
fn backend_errors_are_forwarded() {
    let log = CallLog::default();
    let backends = Backends::new(
        StaticSelector::new(Interface::Msr),
        SpyBackend::failing(Origin::Hardware, log.clone()),
        SpyBackend::new(Origin::Os, log.clone()),
    );
    let api = RdtApi::new();
    api.init(backends).unwrap();

    let error = api.alloc_release(&[1.into()]).unwrap_err();
    assert!(matches!(
        error,
        RdtError::Backend(BackendError::Unsupported { .. })
    ));

    let mut group = MonGroup::new();
    let error = api
        .mon_start(&[1.into()], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Error);
    assert!(!group.is_active());

    // The gate is released after a failure.
    assert!(api.is_initialized());
}

#[test]
fn group_lifecycle_is_enforced() {
    let (api, log) = spy_api(Interface::Msr);
    let context: Arc<dyn std::any::Any + Send + Sync> = Arc::new(7u8);
    let mut group = MonGroup::new();

    api.mon_start(
        &[1.into(), 2.into()],
        MonEvent::L3_OCCUP | MonEvent::PERF_LLC_MISS,
        Some(context),
        &mut group,
    )
    .unwrap();
    assert_eq!(group.state(), GroupState::Active);
    assert_eq!(
        group.cores().to_vec(),
        vec![LogicalCoreId::new(1), LogicalCoreId::new(2)]
    );
    assert_eq!(
        group.context().and_then(|context| context.downcast_ref::<u8>()),
        Some(&7)
    );

    let error = api
        .mon_start(&[3.into()], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);

    api.mon_poll(&mut [&mut group]).unwrap();
    assert_eq!(group.values().llc, 1);

    api.mon_stop(&mut group).unwrap();
    assert_eq!(group.state(), GroupState::Inactive);
    assert_eq!(
        api.mon_stop(&mut group).unwrap_err().kind(),
        ErrorKind::Param
    );
    assert_eq!(
        api.mon_poll(&mut [&mut group]).unwrap_err().kind(),
        ErrorKind::Param
    );

    // A stopped group can be started again.
    api.mon_start(&[3.into()], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();
    assert!(group.is_active());

    assert_eq!(
        log.calls(),
        vec![
            (Origin::Hardware, "mon_start"),
            (Origin::Hardware, "mon_poll"),
            (Origin::Hardware, "mon_stop"),
            (Origin::Hardware, "mon_start"),
        ]
    );
}

#[test]
fn auxiliary_only_events_are_rejected() {
    let (api, log) = spy_api(Interface::Msr);
    let mut group = MonGroup::new();

    for event in [
        MonEvent::PERF_IPC,
        MonEvent::PERF_LLC_MISS,
        MonEvent::PERF_IPC | MonEvent::PERF_LLC_MISS,
    ] {
        let error = api
            .mon_start(&[0.into()], event, None, &mut group)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Param);
    }
    assert!(log.is_empty());

    api.mon_start(&[0.into()], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();
    api.mon_stop(&mut group).unwrap();
    api.mon_start(
        &[0.into()],
        MonEvent::L3_OCCUP | MonEvent::PERF_LLC_MISS,
        None,
        &mut group,
    )
    .unwrap();
}

#[test]
fn batch_with_inactive_member_is_rejected_as_a_whole() {
    let (api, log) = spy_api(Interface::Msr);
    let mut first = started_group(&api, 0);
    let mut middle = MonGroup::new();
    let mut last = started_group(&api, 2);

    let error = api
        .mon_poll(&mut [&mut first, &mut middle, &mut last])
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Param);
    assert_eq!(first.values().llc, 0);
    assert_eq!(last.values().llc, 0);
    assert!(!log.calls().contains(&(Origin::Hardware, "mon_poll")));
}

#[test]
fn pid_start_without_pid_monitor_is_not_built() {
    let (api, log) = spy_api(Interface::Msr);
    let mut group = MonGroup::new();

    let error = api
        .mon_start_pid(Pid::new(1234), MonEvent::L3_OCCUP, None, &mut group)
        .unwrap_err();

    assert!(matches!(
        error,
        RdtError::Backend(BackendError::NotBuilt { .. })
    ));
    assert!(!group.is_active());
    // The request stays recorded in the group.
    assert_eq!(group.pid(), Some(Pid::new(1234)));
    assert_eq!(group.event(), MonEvent::L3_OCCUP);
    assert!(log.is_empty());

    // And the gate is not left locked.
    api.alloc_assoc_get(0.into()).unwrap();
}

#[test]
fn pid_groups_go_to_pid_monitor_in_hardware_mode() {
    let (api, log) = spy_api_with_pid_monitor();
    let mut pid_group = MonGroup::new();
    let mut core_group = started_group(&api, 1);

    api.mon_start_pid(Pid::new(42), MonEvent::L3_OCCUP, None, &mut pid_group)
        .unwrap();
    assert!(pid_group.is_active());
    assert_eq!(pid_group.target(), &MonTarget::Pid(Pid::new(42)));

    api.mon_poll(&mut [&mut pid_group, &mut core_group])
        .unwrap();
    assert_eq!(pid_group.values().llc, 10);
    assert_eq!(core_group.values().llc, 1);

    api.mon_stop(&mut pid_group).unwrap();
    api.mon_stop(&mut core_group).unwrap();

    assert_eq!(
        log.calls(),
        vec![
            (Origin::Hardware, "mon_start"),
            (Origin::PidMonitor, "pid_start"),
            (Origin::Hardware, "mon_poll"),
            (Origin::PidMonitor, "pid_poll"),
            (Origin::PidMonitor, "pid_stop"),
            (Origin::Hardware, "mon_stop"),
        ]
    );
}

#[test]
fn batch_is_not_polled_without_pid_monitor() {
    let (api, log) = spy_api_with_pid_monitor();
    let mut pid_group = MonGroup::new();
    api.mon_start_pid(Pid::new(42), MonEvent::L3_OCCUP, None, &mut pid_group)
        .unwrap();
    api.fini().unwrap();

    // Same groups, but this time the PID monitoring API isn't there.
    let (api, log_without) = spy_api(Interface::Msr);
    let mut core_group = started_group(&api, 1);

    let error = api
        .mon_poll(&mut [&mut core_group, &mut pid_group])
        .unwrap_err();

    assert!(matches!(
        error,
        RdtError::Backend(BackendError::NotBuilt { .. })
    ));
    assert_eq!(core_group.values().llc, 0);
    assert_eq!(pid_group.values().llc, 0);
    assert!(!log_without.calls().contains(&(Origin::Hardware, "mon_poll")));
    assert_eq!(log.calls(), vec![(Origin::PidMonitor, "pid_start")]);
}

#[test]
fn restarted_group_drops_previous_values() {
    let (api, _log) = spy_api(Interface::Msr);
    let mut group = started_group(&api, 0);
    api.mon_poll(&mut [&mut group]).unwrap();
    assert_eq!(group.values().llc, 1);
    api.mon_stop(&mut group).unwrap();

    api.mon_start(&[0.into()], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();

    assert_eq!(group.values().llc, 0);
}

#[test]
fn pid_start_goes_to_os_backend_in_os_mode() {
    let (api, log) = spy_api(Interface::Os);
    let mut group = started_group(&api, 0);
    api.mon_stop(&mut group).unwrap();

    api.mon_start_pid(Pid::new(42), MonEvent::MBM, None, &mut group)
        .unwrap();

    // The previous run is forgotten.
    assert!(group.cores().is_empty());
    assert_eq!(group.pid(), Some(Pid::new(42)));
    assert_eq!(log.calls().last(), Some(&(Origin::Os, "mon_start_pid")));
}

#[test]
fn init_with_cpu_info_uses_the_given_topology() {
    let fake = FakeResctrl::new(&FakeResctrlLayout::default()).unwrap();
    let config = RdtConfig {
        interface: InterfaceChoice::Os,
        resctrl_path: fake.path().to_path_buf(),
        ..RdtConfig::default()
    };
    let api = RdtApi::new();

    api.init_with_cpu_info(&config, two_socket_cpu_info())
        .unwrap();

    assert!(!api.l3ca_get(1.into(), 16).unwrap().is_empty());
    let error = api.l3ca_get(2.into(), 16).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(matches!(
        api.init_with_cpu_info(&config, two_socket_cpu_info()),
        Err(RdtError::AlreadyInitialized)
    ));
}

#[test]
fn api_is_shared_between_threads() {
    let (api, log) = spy_api(Interface::Msr);

    std::thread::scope(|scope| {
        for core_id in 0..4u32 {
            let api = &api;
            scope.spawn(move || {
                for _ in 0..25 {
                    api.alloc_assoc_set(core_id.into(), ClassId::new(1))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(log.calls().len(), 100);
}

#[test]
fn global_instance_is_unique() {
    assert!(std::ptr::eq(super::global(), super::global()));
}
