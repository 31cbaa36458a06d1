//! Environment layering. Kept to one test: the process environment is shared
//! by every test in this binary.

use casebase::Settings;
use tempfile::tempdir;

#[test]
fn test_environment_overrides_and_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(
        &path,
        "[decision]\nsame_threshold = 0.9\n\n[orchestrator]\nworkers = 8\n",
    )
    .unwrap();

    unsafe {
        std::env::set_var("CB_DECISION__SAME_THRESHOLD", "0.8");
        std::env::set_var("CB_ORCHESTRATOR__UNIT_TIMEOUT_SECS", "15");
        std::env::set_var("CB_EMBEDDING__PROVIDER", "hashed");
    }
    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.decision.same_threshold, 0.8);
    assert_eq!(settings.orchestrator.workers, 8);
    assert_eq!(settings.orchestrator.unit_timeout_secs, 15);
    assert_eq!(settings.embedding.provider, "hashed");
    assert!(settings.validate().is_ok());

    // Parses fine, but the add-on floor now exceeds the SAME threshold
    unsafe {
        std::env::set_var("CB_DECISION__ADDON_MIN_THRESHOLD", "0.95");
    }
    let settings = Settings::load_from(&path).unwrap();
    assert!(settings.validate().is_err());

    unsafe {
        std::env::set_var("CB_DECISION__ADDON_MIN_THRESHOLD", "not-a-number");
    }
    assert!(Settings::load_from(&path).is_err());

    unsafe {
        std::env::remove_var("CB_DECISION__SAME_THRESHOLD");
        std::env::remove_var("CB_ORCHESTRATOR__UNIT_TIMEOUT_SECS");
        std::env::remove_var("CB_EMBEDDING__PROVIDER");
        std::env::remove_var("CB_DECISION__ADDON_MIN_THRESHOLD");
    }
    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.decision.same_threshold, 0.9);
    assert_eq!(settings.embedding.provider, "openai");
}
