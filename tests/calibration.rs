//! Calibration persistence and learning flows

use std::path::PathBuf;
use std::sync::Arc;

use fishsight::{
    CalibrationProfile, CalibrationStore, ColorSpec, Detection, FrameBuffer, PixelRect,
    RecognitionSession, Rgb, ScanArea, Tolerance, MAX_PROFILE_CONFIDENCE,
};

const WATER: Rgb = Rgb::new(40, 130, 150);
const SHADOW: Rgb = Rgb::new(20, 90, 100);

fn temp_store_path(name: &str) -> PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut path = std::env::temp_dir();
    path.push(format!("fishsight-{}-{}.json", name, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn pond(shadow: PixelRect) -> FrameBuffer {
    FrameBuffer::from_fn(400, 300, |x, y| {
        if shadow.contains(x, y) {
            SHADOW
        } else {
            WATER
        }
    })
    .unwrap()
}

#[test]
fn test_profiles_survive_reopen() {
    let path = temp_store_path("reopen");
    let spec = ColorSpec::new(SHADOW, Tolerance::uniform(8));

    {
        let store = CalibrationStore::open(&path).unwrap();
        store
            .save("Toontown Central Punchline Place", CalibrationProfile::new("Toontown Central Punchline Place", spec))
            .unwrap();
    }

    let reopened = CalibrationStore::open(&path).unwrap();
    let profile = reopened
        .get("toontown central punchline place")
        .expect("profile should survive reopen under a normalized key");
    assert_eq!(profile.color.target, SHADOW);
    assert_eq!(profile.confidence, 1);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_confirmation_learning_improves_later_runs() {
    let path = temp_store_path("learning");
    let shadow = PixelRect::new(150, 120, 12, 12);
    let frame = pond(shadow);

    // First run: no profile for this pond, explicit settings supplied
    // by the caller. The user then confirms the hit.
    {
        let store = Arc::new(CalibrationStore::open(&path).unwrap());
        let session = RecognitionSession::new(store);
        let spec = ColorSpec::new(SHADOW, Tolerance::uniform(6));

        let outcome = session
            .detect_shadow_with(&frame, ScanArea::full(&frame), &spec)
            .unwrap();
        let best = match outcome {
            Detection::Shadow { best, .. } => best,
            other => panic!("expected shadow detection, got {:?}", other),
        };

        session
            .confirm_candidate(&frame, "My Pond", &best, Some(ScanArea::new(100, 80, 200, 150)))
            .unwrap();
    }

    // Second run: a fresh session over the reopened store finds the
    // shadow from the learned profile alone.
    let store = Arc::new(CalibrationStore::open(&path).unwrap());
    let profile = store.get("MY POND").expect("learned profile persisted");
    assert_eq!(profile.color.target, SHADOW);

    let session = RecognitionSession::new(store);
    let outcome = session.detect_shadow(&frame, "My Pond").unwrap();
    match outcome {
        Detection::Shadow { best, .. } => assert_eq!(best.blob.pixel_count(), 144),
        other => panic!("expected shadow detection, got {:?}", other),
    }

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_repeated_confirmation_caps_confidence() {
    let shadow = PixelRect::new(150, 120, 12, 12);
    let frame = pond(shadow);
    let store = Arc::new(CalibrationStore::in_memory());
    let session = RecognitionSession::new(store.clone());
    let spec = ColorSpec::new(SHADOW, Tolerance::uniform(6));

    let outcome = session
        .detect_shadow_with(&frame, ScanArea::full(&frame), &spec)
        .unwrap();
    let best = match outcome {
        Detection::Shadow { best, .. } => best,
        other => panic!("expected shadow detection, got {:?}", other),
    };

    for _ in 0..(MAX_PROFILE_CONFIDENCE as usize + 3) {
        session.confirm_candidate(&frame, "My Pond", &best, None).unwrap();
    }

    let profile = store.get("MY POND").unwrap();
    assert_eq!(profile.confidence, MAX_PROFILE_CONFIDENCE);
    // Averaging identical confirmations must not drift the target.
    assert_eq!(profile.color.target, SHADOW);
}

#[test]
fn test_learned_scan_area_scales_with_window_size() {
    let spec = ColorSpec::new(SHADOW, Tolerance::uniform(6));
    let profile = CalibrationProfile::new("My Pond", spec)
        .with_scan_area(ScanArea::new(100, 80, 200, 160), 400, 320);

    // Same window resolves back exactly.
    assert_eq!(
        profile.scan_area_for(400, 320),
        Some(ScanArea::new(100, 80, 200, 160))
    );
    // Doubled window scales proportionally.
    assert_eq!(
        profile.scan_area_for(800, 640),
        Some(ScanArea::new(200, 160, 400, 320))
    );
}

#[test]
fn test_removed_profile_is_gone() {
    let store = CalibrationStore::in_memory();
    let spec = ColorSpec::new(SHADOW, Tolerance::uniform(6));
    store
        .save("My Pond", CalibrationProfile::new("My Pond", spec))
        .unwrap();

    assert!(store.remove("my pond").unwrap());
    assert!(store.get("MY POND").is_none());
    // Removing again reports that nothing was there.
    assert!(!store.remove("my pond").unwrap());
}
