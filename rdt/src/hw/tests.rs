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

use test_log::test;

use rdt_msr::registers::*;
use rdt_msr::CatFeatures;
use rdt_msr::MbaFeatures;
use rdt_msr::MonFeatures;
use rdt_msr::RdtFeatures;
use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MbaAllocation;
use rdt_shared::types::MonEvent;
use rdt_shared::types::Rmid;
use rdt_shared::types::Technology;
use rdt_test_utils::two_socket_cpu_info;
use rdt_test_utils::FakeMsr;

use super::HwCapability;
use super::MsrBackend;
use crate::monitoring::MonGroup;
use crate::BackendError;
use crate::ErrorKind;
use crate::HwBackend;
use crate::RdtBackend;
use crate::RdtError;

const UPSCALING_FACTOR: u64 = 64;

fn test_features() -> RdtFeatures {
    RdtFeatures {
        l3ca: Some(CatFeatures {
            num_classes: 8,
            num_ways: 11,
            cdp_supported: true,
        }),
        l2ca: Some(CatFeatures {
            num_classes: 4,
            num_ways: 8,
            cdp_supported: false,
        }),
        mba: Some(MbaFeatures::new(8, 90, true)),
        mon: Some(MonFeatures {
            max_rmid: 4,
            upscaling_factor: UPSCALING_FACTOR,
            events: MonEvent::all(),
        }),
    }
}

fn backend_with(capability: HwCapability) -> (MsrBackend<FakeMsr>, FakeMsr) {
    let msr = FakeMsr::new();
    let backend = MsrBackend::new(msr.clone(), two_socket_cpu_info(), capability);
    (backend, msr)
}

fn backend() -> (MsrBackend<FakeMsr>, FakeMsr) {
    backend_with(HwCapability::new(test_features()))
}

fn core(core_id: u32) -> LogicalCoreId {
    LogicalCoreId::new(core_id)
}

fn assoc(class_id: u32, rmid: u32) -> u64 {
    pqr_assoc_class_bits(ClassId::new(class_id)) | pqr_assoc_rmid_bits(Rmid::new(rmid))
}

#[test]
fn assoc_set_keeps_rmid() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 1, assoc(0, 3));

    backend.alloc_assoc_set(core(1), ClassId::new(5)).unwrap();

    assert_eq!(msr.get(IA32_PQR_ASSOC, 1), assoc(5, 3));
    assert_eq!(backend.alloc_assoc_get(core(1)).unwrap(), ClassId::new(5));
}

#[test]
fn assoc_set_checks_class_and_core() {
    let (mut backend, msr) = backend();

    let error = backend.alloc_assoc_set(core(1), ClassId::new(8)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);
    let error = backend.alloc_assoc_set(core(8), ClassId::new(1)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(msr.writes().is_empty());
}

#[test]
fn assign_takes_highest_free_class_of_the_socket() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 0, assoc(7, 0));
    // Another socket has its own classes of service.
    msr.set(IA32_PQR_ASSOC, 4, assoc(6, 0));

    let class_id = backend
        .alloc_assign(Technology::L3CA, &[core(1), core(2)])
        .unwrap();

    assert_eq!(class_id, ClassId::new(6));
    assert_eq!(msr.get(IA32_PQR_ASSOC, 1), assoc(6, 0));
    assert_eq!(msr.get(IA32_PQR_ASSOC, 2), assoc(6, 0));
    assert_eq!(backend.alloc_assoc_get(core(0)).unwrap(), ClassId::new(7));
}

#[test]
fn assign_is_limited_by_every_requested_technology() {
    let (mut backend, _msr) = backend();

    // L2 has only 4 classes.
    let class_id = backend
        .alloc_assign(Technology::L3CA | Technology::L2CA, &[core(0)])
        .unwrap();

    assert_eq!(class_id, ClassId::new(3));
}

#[test]
fn assign_fails_when_no_class_is_left() {
    let mut features = test_features();
    features.l3ca = features.l3ca.map(|l3| CatFeatures {
        num_classes: 2,
        ..l3
    });
    let (mut backend, msr) = backend_with(HwCapability::new(features));
    msr.set(IA32_PQR_ASSOC, 3, assoc(1, 0));

    let error = backend
        .alloc_assign(Technology::L3CA, &[core(0)])
        .unwrap_err();

    assert!(matches!(
        error,
        RdtError::Backend(BackendError::ResourceExhausted { .. })
    ));
}

#[test]
fn assign_rejects_cores_of_different_sockets() {
    let (mut backend, msr) = backend();

    let error = backend
        .alloc_assign(Technology::MBA, &[core(3), core(4)])
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(msr.writes().is_empty());
}

#[test]
fn release_moves_cores_to_default_class() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 5, assoc(3, 2));

    backend.alloc_release(&[core(5)]).unwrap();

    assert_eq!(msr.get(IA32_PQR_ASSOC, 5), assoc(0, 2));
}

#[test]
fn reset_restores_defaults() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 6, assoc(4, 1));
    msr.set(IA32_L3_MASK_0 + 2, 4, 0x3);
    msr.set(IA32_MBA_THRTL_0 + 1, 0, 50);

    backend.alloc_reset(CdpConfig::Any).unwrap();

    for socket_core in [0, 4] {
        for register_id in IA32_L3_MASK_0..IA32_L3_MASK_0 + 8 {
            assert_eq!(msr.get(register_id, socket_core), 0x7FF);
        }
        for register_id in IA32_MBA_THRTL_0..IA32_MBA_THRTL_0 + 8 {
            assert_eq!(msr.get(register_id, socket_core), 0);
        }
    }
    for l2_core in [0, 2, 4, 6] {
        for register_id in IA32_L2_MASK_0..IA32_L2_MASK_0 + 4 {
            assert_eq!(msr.get(register_id, l2_core), 0xFF);
        }
    }
    assert_eq!(msr.get(IA32_PQR_ASSOC, 6), assoc(0, 1));
    assert!(msr.writes_to(IA32_L3_QOS_CFG).is_empty());
}

#[test]
fn reset_enables_cdp_on_every_socket() {
    let (mut backend, msr) = backend();

    backend.alloc_reset(CdpConfig::On).unwrap();

    assert_eq!(msr.get(IA32_L3_QOS_CFG, 0), L3_QOS_CFG_CDP_ENABLE);
    assert_eq!(msr.get(IA32_L3_QOS_CFG, 4), L3_QOS_CFG_CDP_ENABLE);
    assert!(backend.capability().l3_cdp_enabled);

    // Under CDP half as many classes are available.
    let allocations = backend.l3ca_get(0.into(), 4).unwrap();
    assert_eq!(allocations.len(), 4);
    assert_eq!(allocations[0], L3Allocation::with_cdp(0, 0x7FF, 0x7FF));

    backend.alloc_reset(CdpConfig::Off).unwrap();
    assert_eq!(msr.get(IA32_L3_QOS_CFG, 0), 0);
    assert!(!backend.capability().l3_cdp_enabled);
}

#[test]
fn reset_rejects_unsupported_cdp() {
    let mut features = test_features();
    features.l3ca = features.l3ca.map(|l3| CatFeatures {
        cdp_supported: false,
        ..l3
    });
    let (mut backend, msr) = backend_with(HwCapability::new(features));

    let error = backend.alloc_reset(CdpConfig::On).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(msr.writes().is_empty());
}

#[test]
fn l3_masks_are_written_per_socket() {
    let (mut backend, msr) = backend();

    backend
        .l3ca_set(1.into(), &[L3Allocation::new(1, 0xF), L3Allocation::new(2, 0x7F0)])
        .unwrap();

    assert_eq!(msr.get(IA32_L3_MASK_0 + 1, 4), 0xF);
    assert_eq!(msr.get(IA32_L3_MASK_0 + 2, 4), 0x7F0);
    assert_eq!(msr.get(IA32_L3_MASK_0 + 1, 0), 0);

    let allocations = backend.l3ca_get(1.into(), 8).unwrap();
    assert_eq!(allocations[1], L3Allocation::new(1, 0xF));
    assert_eq!(allocations.len(), 8);
}

#[test]
fn cdp_masks_go_to_register_pairs() {
    let (mut backend, msr) = backend_with(HwCapability::new(test_features()).with_l3_cdp(true));

    backend
        .l3ca_set(0.into(), &[L3Allocation::with_cdp(1, 0x0F, 0xF0)])
        .unwrap();

    assert_eq!(msr.get(IA32_L3_MASK_0 + 2, 0), 0xF0);
    assert_eq!(msr.get(IA32_L3_MASK_0 + 3, 0), 0x0F);
    assert_eq!(
        backend.l3ca_get(0.into(), 4).unwrap()[1],
        L3Allocation::with_cdp(1, 0x0F, 0xF0)
    );

    let error = backend.l3ca_get(0.into(), 3).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);
}

#[test]
fn invalid_l3_entries_are_not_applied() {
    let (mut backend, msr) = backend();

    let results = [
        backend.l3ca_set(0.into(), &[L3Allocation::new(1, 0xF), L3Allocation::new(8, 0xF)]),
        backend.l3ca_set(0.into(), &[L3Allocation::new(1, 0xF000)]),
        backend.l3ca_set(0.into(), &[L3Allocation::with_cdp(1, 0x3, 0xC)]),
        backend.l3ca_set(2.into(), &[L3Allocation::new(1, 0xF)]),
    ];

    for result in results {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Param);
    }
    assert!(msr.writes().is_empty());
}

#[test]
fn l2_masks_are_written_per_cluster() {
    let (mut backend, msr) = backend();

    backend
        .l2ca_set(3.into(), &[L2Allocation::new(2, 0x3C)])
        .unwrap();

    assert_eq!(msr.get(IA32_L2_MASK_0 + 2, 6), 0x3C);
    assert_eq!(
        backend.l2ca_get(3.into(), 4).unwrap()[2],
        L2Allocation::new(2, 0x3C)
    );
    assert_eq!(
        backend.l2ca_get(3.into(), 2).unwrap_err().kind(),
        ErrorKind::Param
    );
}

#[test]
fn mba_rate_is_rounded_to_throttle_step() {
    let (mut backend, msr) = backend();

    let actual = backend
        .mba_set(
            1.into(),
            &[
                MbaAllocation::new(1, 45),
                MbaAllocation::new(2, 5),
                MbaAllocation::new(3, 100),
            ],
        )
        .unwrap();

    assert_eq!(
        actual,
        vec![
            MbaAllocation::new(1, 50),
            MbaAllocation::new(2, 10),
            MbaAllocation::new(3, 100),
        ]
    );
    assert_eq!(msr.get(IA32_MBA_THRTL_0 + 1, 4), 50);
    assert_eq!(msr.get(IA32_MBA_THRTL_0 + 2, 4), 90);
    assert_eq!(msr.get(IA32_MBA_THRTL_0 + 3, 4), 0);

    let current = backend.mba_get(1.into(), 8).unwrap();
    assert_eq!(current[1], MbaAllocation::new(1, 50));
    assert_eq!(current[0], MbaAllocation::new(0, 100));
}

#[test]
fn mba_rate_out_of_range_is_rejected() {
    let (mut backend, msr) = backend();

    for rate in [0, 101] {
        let error = backend
            .mba_set(0.into(), &[MbaAllocation::new(1, rate)])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Param);
    }
    assert!(msr.writes().is_empty());
}

#[test]
fn empty_mba_requests_are_rejected() {
    let (mut backend, msr) = backend();

    let error = backend.mba_set(0.into(), &[]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);
    let error = backend.mba_get(0.into(), 0).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Param);
    assert!(msr.writes().is_empty());
}

#[test]
fn monitoring_takes_lowest_free_rmid() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 5, assoc(2, 1));
    let mut group = MonGroup::new();

    backend
        .mon_start(&[core(1), core(2)], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();

    assert_eq!(group.rmid(), Some(Rmid::new(2)));
    assert_eq!(msr.get(IA32_PQR_ASSOC, 1), assoc(0, 2));
    assert_eq!(msr.get(IA32_PQR_ASSOC, 2), assoc(0, 2));
    assert_eq!(backend.mon_assoc_get(core(5)).unwrap(), Rmid::new(1));
}

#[test]
fn monitoring_busy_core_is_refused() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 3, assoc(0, 1));
    let mut group = MonGroup::new();

    let error = backend
        .mon_start(&[core(2), core(3)], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap_err();

    assert!(matches!(
        error,
        RdtError::Backend(BackendError::CoreBusy { .. })
    ));
    assert_eq!(msr.get(IA32_PQR_ASSOC, 2), 0);
}

#[test]
fn unsupported_event_is_refused() {
    let mut features = test_features();
    features.mon = features.mon.map(|mon| MonFeatures {
        events: MonEvent::L3_OCCUP,
        ..mon
    });
    let (mut backend, _msr) = backend_with(HwCapability::new(features));
    let mut group = MonGroup::new();

    let error = backend
        .mon_start(&[core(0)], MonEvent::TMEM_BW, None, &mut group)
        .unwrap_err();

    assert!(matches!(
        error,
        RdtError::Backend(BackendError::Unsupported { .. })
    ));
}

#[test]
fn occupancy_is_summed_over_sockets() {
    let (mut backend, msr) = backend();
    let mut group = MonGroup::new();
    backend
        .mon_start(&[core(1), core(2), core(5)], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();
    msr.set(IA32_QM_CTR, 1, 10);
    msr.set(IA32_QM_CTR, 5, 20);

    backend.mon_poll(&mut [&mut group]).unwrap();

    assert_eq!(group.values().llc, 30 * UPSCALING_FACTOR);
    let evtsel = qm_evtsel(Rmid::new(1), QmEvent::LlcOccupancy);
    assert_eq!(msr.get(IA32_QM_EVTSEL, 1), evtsel);
    assert_eq!(msr.get(IA32_QM_EVTSEL, 5), evtsel);
    // Core 2 shares the socket of core 1.
    assert!(msr
        .writes_to(IA32_QM_EVTSEL)
        .iter()
        .all(|write| write.core_id != core(2)));
}

#[test]
fn bandwidth_deltas_survive_counter_wrap() {
    let (mut backend, msr) = backend();
    let mut group = MonGroup::new();
    msr.set(IA32_QM_CTR, 0, (1 << 24) - 10);
    backend
        .mon_start(&[core(0)], MonEvent::TMEM_BW, None, &mut group)
        .unwrap();

    msr.set(IA32_QM_CTR, 0, 5);
    backend.mon_poll(&mut [&mut group]).unwrap();

    assert_eq!(group.values().mbm_total_delta, 15 * UPSCALING_FACTOR);
    assert_eq!(group.values().mbm_total, 15 * UPSCALING_FACTOR);

    msr.set(IA32_QM_CTR, 0, 25);
    backend.mon_poll(&mut [&mut group]).unwrap();

    assert_eq!(group.values().mbm_total_delta, 20 * UPSCALING_FACTOR);
    assert_eq!(group.values().mbm_total, 35 * UPSCALING_FACTOR);
}

#[test]
fn restarted_group_counts_from_the_new_start() {
    let (mut backend, msr) = backend();
    let mut group = MonGroup::new();
    backend
        .mon_start(&[core(0)], MonEvent::TMEM_BW, None, &mut group)
        .unwrap();
    msr.set(IA32_QM_CTR, 0, 100);
    backend.mon_poll(&mut [&mut group]).unwrap();
    assert_eq!(group.values().mbm_total, 100 * UPSCALING_FACTOR);
    backend.mon_stop(&mut group).unwrap();

    backend
        .mon_start(&[core(0)], MonEvent::TMEM_BW, None, &mut group)
        .unwrap();
    assert_eq!(group.values().mbm_total, 0);
    msr.set(IA32_QM_CTR, 0, 101);
    backend.mon_poll(&mut [&mut group]).unwrap();

    assert_eq!(group.values().mbm_total, UPSCALING_FACTOR);
    assert_eq!(group.values().mbm_total_delta, UPSCALING_FACTOR);
}

#[test]
fn unavailable_counter_is_an_error() {
    let (mut backend, msr) = backend();
    let mut group = MonGroup::new();
    backend
        .mon_start(&[core(0)], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();
    msr.set(IA32_QM_CTR, 0, QM_CTR_UNAVAILABLE);

    let error = backend.mon_poll(&mut [&mut group]).unwrap_err();

    assert!(matches!(
        error,
        RdtError::Backend(BackendError::CounterUnavailable { .. })
    ));
}

#[test]
fn perf_counters_give_ipc_and_misses() {
    let (mut backend, msr) = backend();
    let mut group = MonGroup::new();
    backend
        .mon_start(
            &[core(3)],
            MonEvent::L3_OCCUP | MonEvent::PERF_IPC | MonEvent::PERF_LLC_MISS,
            None,
            &mut group,
        )
        .unwrap();

    assert_eq!(msr.get(IA32_FIXED_CTR_CTRL, 3), FIXED_CTR_CTRL_ENABLE);
    assert_eq!(msr.get(IA32_PERFEVTSEL0, 3), PERFEVTSEL_LLC_MISS);
    assert_eq!(msr.get(IA32_PERF_GLOBAL_CTRL, 3), PERF_GLOBAL_CTRL_ENABLE);

    msr.set(IA32_FIXED_CTR0, 3, 3000);
    msr.set(IA32_FIXED_CTR1, 3, 1500);
    msr.set(IA32_PMC0, 3, 42);
    backend.mon_poll(&mut [&mut group]).unwrap();

    assert_eq!(group.values().ipc, 2.0);
    assert_eq!(group.values().llc_misses, 42);

    backend.mon_stop(&mut group).unwrap();
    assert_eq!(msr.get(IA32_PERF_GLOBAL_CTRL, 3), 0);
}

#[test]
fn failed_start_restores_rmid() {
    let (mut backend, msr) = backend();
    msr.break_register(IA32_PERFEVTSEL0);
    let mut group = MonGroup::new();

    let result = backend.mon_start(
        &[core(1), core(2)],
        MonEvent::L3_OCCUP | MonEvent::PERF_IPC,
        None,
        &mut group,
    );

    assert!(result.is_err());
    assert_eq!(msr.get(IA32_PQR_ASSOC, 1), 0);
    assert_eq!(msr.get(IA32_PQR_ASSOC, 2), 0);
    assert_eq!(group.rmid(), None);
}

#[test]
fn stop_frees_the_rmid() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 1, assoc(3, 0));
    let mut group = MonGroup::new();
    backend
        .mon_start(&[core(1)], MonEvent::L3_OCCUP, None, &mut group)
        .unwrap();

    backend.mon_stop(&mut group).unwrap();

    assert_eq!(msr.get(IA32_PQR_ASSOC, 1), assoc(3, 0));
    assert_eq!(group.rmid(), None);

    let mut next = MonGroup::new();
    backend
        .mon_start(&[core(2)], MonEvent::L3_OCCUP, None, &mut next)
        .unwrap();
    assert_eq!(next.rmid(), Some(Rmid::new(1)));
}

#[test]
fn mon_reset_clears_every_core() {
    let (mut backend, msr) = backend();
    msr.set(IA32_PQR_ASSOC, 2, assoc(1, 3));
    msr.set(IA32_PQR_ASSOC, 7, assoc(0, 4));

    backend.mon_reset().unwrap();

    assert_eq!(msr.get(IA32_PQR_ASSOC, 2), assoc(1, 0));
    assert_eq!(msr.get(IA32_PQR_ASSOC, 7), 0);
}
