// SPDX-FileCopyrightText: 2025-2026 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests exercising Instance -> Writer -> Reader, covering the
//! scenarios in `spec.md` §8.

use std::time::Duration;

use mxl::{Error, Instance, InstanceOptions};

static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// RAII guard for test domain directories on tmpfs.
struct TestDomainGuard {
    dir: std::path::PathBuf,
}

impl TestDomainGuard {
    fn new(test: &str) -> Self {
        let dir = std::path::PathBuf::from(format!(
            "/dev/shm/mxl_rust_unit_tests_domain_{}_{}",
            test,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap_or_else(|_| {
            panic!("failed to create test domain directory \"{}\"", dir.display())
        });
        Self { dir }
    }

    fn path(&self) -> &std::path::Path {
        &self.dir
    }
}

impl Drop for TestDomainGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn setup_test(test: &str) -> (Instance, TestDomainGuard) {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });

    let domain_guard = TestDomainGuard::new(test);
    let instance = Instance::new(domain_guard.path(), InstanceOptions::default()).unwrap();
    (instance, domain_guard)
}

fn video_flow_def(id: uuid::Uuid, grain_size: u64, ring_size: u64) -> String {
    format!(
        r#"{{
            "id": "{id}",
            "format": "urn:x-nmos:format:video",
            "grain_rate": {{"numerator": 30000, "denominator": 1001}},
            "grain_size": {grain_size},
            "ring_size": {ring_size}
        }}"#
    )
}

fn audio_flow_def(id: uuid::Uuid, channel_count: u64, sample_width: u64, buffer_length: u64) -> String {
    format!(
        r#"{{
            "id": "{id}",
            "format": "urn:x-nmos:format:audio",
            "sample_rate": {{"numerator": 48000, "denominator": 1}},
            "channel_count": {channel_count},
            "sample_width": {sample_width},
            "buffer_length": {buffer_length}
        }}"#
    )
}

/// Scenario 1: single writer, single reader, discrete, 30000/1001.
#[test]
fn single_writer_single_reader_discrete_roundtrip() {
    let (instance, _guard) = setup_test("discrete_roundtrip");
    let id = uuid::Uuid::new_v4();
    let grain_size = 256usize;
    let def = video_flow_def(id, grain_size as u64, 512);

    let (writer, _config, created) = instance.create_flow_writer(&def).unwrap();
    assert!(created);
    let grain_writer = writer.to_grain_writer().unwrap();

    let (reader, _) = instance.create_flow_reader(id).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();

    for i in 0..300u64 {
        let mut access = grain_writer.open_grain(i).unwrap();
        {
            let payload = access.payload_mut();
            for (k, byte) in payload.iter_mut().enumerate() {
                *byte = ((i.wrapping_mul(31) + k as u64) % 256) as u8;
            }
        }
        access.commit_complete(grain_size).unwrap();

        let view = grain_reader.get_grain(i, Duration::from_millis(100)).unwrap();
        let payload = view.payload();
        for (k, byte) in payload.iter().enumerate() {
            assert_eq!(*byte, ((i.wrapping_mul(31) + k as u64) % 256) as u8);
        }
    }
}

/// Scenario 2: partial commit wakes a waiting reader twice.
#[test]
fn partial_commit_wakes_reader_twice() {
    let (instance, _guard) = setup_test("partial_commit");
    let id = uuid::Uuid::new_v4();
    let def = video_flow_def(id, 1024, 64);

    let (writer, _config, _) = instance.create_flow_writer(&def).unwrap();
    let grain_writer = writer.to_grain_writer().unwrap();
    let (reader, _) = instance.create_flow_reader(id).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();

    let mut access = grain_writer.open_grain(5).unwrap();
    access.payload_mut()[..512].fill(7);
    access
        .commit(mxl::CommitInfo {
            committed_size: 512,
            valid_slices: 2,
            total_slices: 4,
            flags: 0,
        })
        .unwrap();

    let partial = grain_reader.try_get_grain(5).unwrap();
    assert!(!partial.is_complete());
    assert_eq!(partial.committed_size(), 512);
    assert_eq!(partial.valid_slices(), 2);
    assert_eq!(partial.total_slices(), 4);
    assert!(partial.payload().iter().all(|&b| b == 7));

    let mut access = grain_writer.open_grain(5).unwrap();
    access.payload_mut().fill(9);
    access
        .commit(mxl::CommitInfo {
            committed_size: 1024,
            valid_slices: 4,
            total_slices: 4,
            flags: 0,
        })
        .unwrap();

    let view = grain_reader.get_grain(5, Duration::from_secs(1)).unwrap();
    assert!(view.is_complete());
    assert_eq!(view.committed_size(), 1024);
    assert!(view.payload().iter().all(|&b| b == 9));
}

/// Scenario 3: overwrite eviction returns `OutOfRangeTooLate`.
#[test]
fn overwrite_eviction_returns_too_late() {
    let (instance, _guard) = setup_test("overwrite_eviction");
    let id = uuid::Uuid::new_v4();
    let def = video_flow_def(id, 64, 8);

    let (writer, _config, _) = instance.create_flow_writer(&def).unwrap();
    let grain_writer = writer.to_grain_writer().unwrap();
    let (reader, _) = instance.create_flow_reader(id).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();

    for i in 0..=20u64 {
        let access = grain_writer.open_grain(i).unwrap();
        access.commit_complete(64).unwrap();
    }

    let err = grain_reader.try_get_grain(5).unwrap_err();
    assert!(matches!(err, Error::OutOfRangeTooLate));
}

/// Scenario 4: continuous flow wrap, matching the spec's worked example.
#[test]
fn continuous_flow_wrap_fragment_lengths() {
    let (instance, _guard) = setup_test("continuous_wrap");
    let id = uuid::Uuid::new_v4();
    let def = audio_flow_def(id, 2, 4, 1024);

    let (writer, _config, created) = instance.create_flow_writer(&def).unwrap();
    assert!(created);
    let samples_writer = writer.to_samples_writer().unwrap();
    let (reader, _) = instance.create_flow_reader(id).unwrap();
    let samples_reader = reader.to_samples_reader().unwrap();

    // Advance the aggregate head to 1000 first: batches must start where
    // the previous one left off (see `SamplesWriter::open_samples`).
    let mut access = samples_writer.open_samples(0, 1000).unwrap();
    for ch in 0..2 {
        let (head, _tail) = access.channel_mut(ch).unwrap();
        head.fill(1);
    }
    access.commit().unwrap();

    let mut access = samples_writer.open_samples(1000, 100).unwrap();
    for ch in 0..2 {
        let (head, tail) = access.channel_mut(ch).unwrap();
        assert_eq!(head.len(), 96);
        assert_eq!(tail.len(), 304);
        head.fill(2);
        tail.fill(3);
    }
    access.commit().unwrap();

    let view = samples_reader
        .get_samples(1000, 100, Duration::from_millis(100))
        .unwrap();
    for ch in 0..2 {
        let (head, tail) = view.channel_data(ch).unwrap();
        assert_eq!(head.len(), 96);
        assert_eq!(tail.len(), 304);
        assert!(head.iter().all(|&b| b == 2));
        assert!(tail.iter().all(|&b| b == 3));
    }
}

/// Scenario 5: GC reclaims an abandoned flow after the idle window.
#[test]
fn garbage_collects_abandoned_flow_after_idle_window() {
    let (instance, _guard) = setup_test("gc_abandoned");
    let id = uuid::Uuid::new_v4();
    let def = video_flow_def(id, 64, 16);

    {
        let (writer, _config, _) = instance.create_flow_writer(&def).unwrap();
        let grain_writer = writer.to_grain_writer().unwrap();
        for i in 0..10u64 {
            let access = grain_writer.open_grain(i).unwrap();
            access.commit_complete(64).unwrap();
        }
        // Writer handle drops here without an explicit release call,
        // simulating a crashed producer: `writer_ref_count` still drops to
        // zero via `Drop for GrainWriter`.
    }

    std::thread::sleep(Duration::from_millis(60));
    let removed = instance.garbage_collect(Duration::from_millis(50)).unwrap();
    assert_eq!(removed, 1);

    let err = instance.create_flow_reader(id).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

/// Scenario 6: two instances attach to the same flow; reference counting
/// keeps the directory alive until both release.
#[test]
fn two_instances_share_writer_reference_count() {
    let (instance_a, guard) = setup_test("two_writers");
    let domain = guard.path().to_path_buf();
    let instance_b = Instance::new(&domain, InstanceOptions::default()).unwrap();

    let id = uuid::Uuid::new_v4();
    let def = video_flow_def(id, 64, 16);

    let (writer_a, _, created_a) = instance_a.create_flow_writer(&def).unwrap();
    assert!(created_a);
    let (writer_b, _, created_b) = instance_b.create_flow_writer(&def).unwrap();
    assert!(!created_b);

    let flow_dir = domain.join(format!("{id}.mxl-flow"));
    assert!(flow_dir.is_dir());

    drop(writer_a);
    assert!(flow_dir.is_dir(), "flow must persist while B still holds it");

    drop(writer_b);
    // Eligible for GC now that no writer remains; a zero idle window
    // collects it immediately regardless of `access` mtime.
    let removed = instance_a.garbage_collect(Duration::from_secs(0)).unwrap();
    assert_eq!(removed, 1);
}
