#![no_main]
use libfuzzer_sys::fuzz_target;
use modgate::module::registry::parse_markers;
use modgate::module::validation::is_valid_name;

fuzz_target!(|data: &[u8]| {
    // Module files are untrusted text; marker extraction must never panic
    let text = String::from_utf8_lossy(data);
    let metadata = parse_markers(&text);

    // Dependencies come back deduplicated
    let mut seen = std::collections::HashSet::new();
    for dep in &metadata.dependencies {
        assert!(!dep.is_empty());
        assert!(seen.insert(dep.as_str()));
        let _ = is_valid_name(dep);
    }

    // Parsing is deterministic
    assert_eq!(parse_markers(&text), metadata);
});
