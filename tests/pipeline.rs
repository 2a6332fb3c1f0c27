mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::{driver_tree, listing, test_context, write_wim, Call, CountingPayload, FakeDism};
use winiso_virtio_lib::drivers::MissingSegment;
use winiso_virtio_lib::error::AppError;
use winiso_virtio_lib::models::{Channel, DriverVersion, ImageKind, WindowsVersion};
use winiso_virtio_lib::mount::MountState;
use winiso_virtio_lib::payload::ExtractedPayload;
use winiso_virtio_lib::pipeline::{add_virtio_drivers, wim_path, SkipReason};

struct Media {
    tmp: tempfile::TempDir,
}

impl Media {
    fn new() -> Self {
        Self {
            tmp: tempfile::tempdir().unwrap(),
        }
    }

    fn root(&self) -> PathBuf {
        self.tmp.path().join("iso")
    }

    fn payload(&self) -> PathBuf {
        self.tmp.path().join("virtio-win")
    }

    fn wim(&self, kind: ImageKind) -> PathBuf {
        let path = wim_path(&self.root(), kind);
        write_wim(&path);
        path
    }
}

fn mounts(calls: &[Call]) -> Vec<(PathBuf, u32)> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::Mount(wim, index, _) => Some((wim.clone(), *index)),
            _ => None,
        })
        .collect()
}

#[test]
fn install_only_media_gets_three_drivers() {
    let media = Media::new();
    let install = media.wim(ImageKind::Install);
    driver_tree(&media.payload(), "w10", "x64");
    let dism = FakeDism::default()
        .with_mounted_content()
        .with_listing(&install, listing(&[(1, "Windows 10 Pro", "x64")]));
    let ctx = test_context(media.tmp.path());

    let report = add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind, ImageKind::Boot);
    assert_eq!(report.skipped[0].reason, SkipReason::Missing);

    assert_eq!(report.images.len(), 1);
    let outcome = &report.images[0];
    assert_eq!(outcome.plan.version, WindowsVersion::Ten);
    assert_eq!(outcome.plan.driver_version, DriverVersion::W10);
    assert_eq!(outcome.summary.state, MountState::Committed);
    let expected: Vec<PathBuf> = ["viostor", "vioscsi", "NetKVM"]
        .iter()
        .map(|c| media.payload().join(c).join("w10").join("x64"))
        .collect();
    assert_eq!(outcome.summary.drivers_added, expected);

    let calls = dism.calls();
    assert_eq!(mounts(&calls), vec![(install.clone(), 1)]);
    let unmounts: Vec<_> = calls
        .iter()
        .filter(|c| matches!(c, Call::Unmount(_, true)))
        .collect();
    assert_eq!(unmounts.len(), 1);
    assert!(!outcome.summary.mount_dir.exists());
}

#[test]
fn boot_and_install_are_both_serviced_boot_first() {
    let media = Media::new();
    let boot = media.wim(ImageKind::Boot);
    let install = media.wim(ImageKind::Install);
    driver_tree(&media.payload(), "w11", "x64");
    let dism = FakeDism::default()
        .with_listing(&boot, listing(&[(1, "Microsoft Windows Setup (x64)", "x64")]))
        .with_listing(&install, listing(&[(1, "Windows 11 Pro", "x64")]));
    let payload = CountingPayload::new(media.payload());
    let ctx = test_context(media.tmp.path());

    let report = add_virtio_drivers(&ctx, &dism, &payload, &media.root(), Channel::Latest).unwrap();

    assert!(report.skipped.is_empty());
    assert_eq!(report.images.len(), 2);
    for outcome in &report.images {
        assert_eq!(outcome.plan.version, WindowsVersion::Eleven);
        assert_eq!(outcome.plan.driver_version, DriverVersion::W11);
        assert_eq!(outcome.summary.state, MountState::Committed);
    }
    assert_eq!(payload.requests.get(), 1);

    let calls = dism.calls();
    assert_eq!(mounts(&calls), vec![(boot.clone(), 1), (install.clone(), 1)]);
    let first_mount = calls
        .iter()
        .position(|c| matches!(c, Call::Mount(..)))
        .unwrap();
    let last_info = calls
        .iter()
        .rposition(|c| matches!(c, Call::Info(..)))
        .unwrap();
    assert!(last_info < first_mount, "metadata must be read before mounting");
}

#[test]
fn multi_index_install_wim_is_serviced_in_index_order() {
    let media = Media::new();
    let install = media.wim(ImageKind::Install);
    driver_tree(&media.payload(), "w10", "x64");
    let dism = FakeDism::default().with_listing(
        &install,
        listing(&[
            (3, "Windows 10 Pro", "x64"),
            (1, "Windows 10 Home", "x64"),
            (2, "Windows 10 Education", "x64"),
        ]),
    );
    let ctx = test_context(media.tmp.path());

    add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap();

    let indexes: Vec<u32> = mounts(&dism.calls()).into_iter().map(|(_, i)| i).collect();
    assert_eq!(indexes, vec![1, 2, 3]);
}

#[test]
fn unrecognized_version_stops_before_any_mount() {
    let media = Media::new();
    let install = media.wim(ImageKind::Install);
    let before = fs::read(&install).unwrap();
    driver_tree(&media.payload(), "w10", "x64");
    let dism = FakeDism::default().with_listing(&install, listing(&[(1, "Windows ME", "x86")]));
    let payload = CountingPayload::new(media.payload());
    let ctx = test_context(media.tmp.path());

    let err = add_virtio_drivers(&ctx, &dism, &payload, &media.root(), Channel::Stable).unwrap_err();

    match &err {
        AppError::UnrecognizedVersion(name) => assert_eq!(name, "Windows ME"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Windows ME"));
    assert_eq!(dism.mount_count(), 0);
    assert_eq!(payload.requests.get(), 0);
    assert_eq!(fs::read(&install).unwrap(), before);
}

#[test]
fn boot_without_install_has_no_reference_version() {
    let media = Media::new();
    let boot = media.wim(ImageKind::Boot);
    let dism = FakeDism::default()
        .with_listing(&boot, listing(&[(1, "Microsoft Windows PE (x64)", "x64")]));
    let ctx = test_context(media.tmp.path());

    let err = add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap_err();

    assert!(matches!(err, AppError::NoReferenceImage(path) if path == boot));
    assert_eq!(dism.mount_count(), 0);
}

#[test]
fn legacy_windows_is_unsupported() {
    let media = Media::new();
    let install = media.wim(ImageKind::Install);
    let dism =
        FakeDism::default().with_listing(&install, listing(&[(1, "Windows Vista Ultimate", "x86")]));
    let ctx = test_context(media.tmp.path());

    let err = add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap_err();

    assert!(matches!(err, AppError::UnsupportedVersion(_)));
    assert_eq!(dism.mount_count(), 0);
}

#[test]
fn unknown_architecture_is_fatal() {
    let media = Media::new();
    let install = media.wim(ImageKind::Install);
    let dism = FakeDism::default().with_listing(&install, listing(&[(1, "Windows 10 Pro", "ia64")]));
    let ctx = test_context(media.tmp.path());

    let err = add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap_err();

    assert!(matches!(err, AppError::UnsupportedArchitecture(arch) if arch == "ia64"));
    assert_eq!(dism.mount_count(), 0);
}

#[test]
fn missing_driver_directory_stops_before_any_mount() {
    let media = Media::new();
    let boot = media.wim(ImageKind::Boot);
    let install = media.wim(ImageKind::Install);
    driver_tree(&media.payload(), "w10", "x64");
    let dism = FakeDism::default()
        .with_listing(&boot, listing(&[(1, "Microsoft Windows Setup (x64)", "x64")]))
        .with_listing(
            &install,
            listing(&[(1, "Windows 10 Pro", "x64"), (2, "Windows 10 Pro", "ARM64")]),
        );
    let ctx = test_context(media.tmp.path());

    let err = add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap_err();

    match err {
        AppError::DriverNotFound { segment, path } => {
            assert_eq!(segment, MissingSegment::Architecture);
            assert_eq!(path, media.payload().join("viostor").join("w10").join("ARM64"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(dism.mount_count(), 0);
}

#[test]
fn unreadable_boot_wim_is_skipped() {
    let media = Media::new();
    media.wim(ImageKind::Boot);
    let install = media.wim(ImageKind::Install);
    driver_tree(&media.payload(), "w10", "x64");
    let dism = FakeDism::default().with_listing(&install, listing(&[(1, "Windows 10 Pro", "x64")]));
    let ctx = test_context(media.tmp.path());

    let report = add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::Unreadable);
    assert_eq!(report.images.len(), 1);
    assert_eq!(report.images[0].plan.record.kind, ImageKind::Install);
}

#[test]
fn empty_tree_is_a_no_op() {
    let media = Media::new();
    fs::create_dir_all(media.root().join("sources")).unwrap();
    let dism = FakeDism::default();
    let payload = CountingPayload::new(Path::new("unused"));
    let ctx = test_context(media.tmp.path());

    let report = add_virtio_drivers(&ctx, &dism, &payload, &media.root(), Channel::Stable).unwrap();

    assert!(report.images.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert!(dism.calls().is_empty());
    assert_eq!(payload.requests.get(), 0);
}

#[test]
fn failure_on_second_image_keeps_first_committed() {
    let media = Media::new();
    let boot = media.wim(ImageKind::Boot);
    let install = media.wim(ImageKind::Install);
    driver_tree(&media.payload(), "w11", "x64");
    // Three drivers per image: position 4 is the second driver of install.wim.
    let dism = FakeDism::default()
        .failing_driver_at(4)
        .with_listing(&boot, listing(&[(1, "Microsoft Windows Setup (x64)", "x64")]))
        .with_listing(&install, listing(&[(1, "Windows 11 Pro", "x64")]));
    let ctx = test_context(media.tmp.path());

    let err = add_virtio_drivers(
        &ctx,
        &dism,
        &ExtractedPayload::new(media.payload()),
        &media.root(),
        Channel::Stable,
    )
    .unwrap_err();

    assert!(matches!(err, AppError::DriverInjection { ref wim, .. } if wim == &install));
    let unmounts: Vec<bool> = dism
        .calls()
        .iter()
        .filter_map(|c| match c {
            Call::Unmount(_, commit) => Some(*commit),
            _ => None,
        })
        .collect();
    assert_eq!(unmounts, vec![true, false]);
}
