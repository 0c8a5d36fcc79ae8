use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        PipelineError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        PipelineError::initialization("x")
            .to_string()
            .contains("initialization error:")
    );
    assert!(
        PipelineError::contract("x")
            .to_string()
            .contains("contract violation:")
    );
    assert!(PipelineError::sink("x").to_string().contains("sink error:"));
    assert!(
        PipelineError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn initialization_failures_are_fatal() {
    assert!(PipelineError::AlreadyInitialized.is_fatal_at_initialization());
    assert!(PipelineError::MissingSequence("Master".to_owned()).is_fatal_at_initialization());
    assert!(PipelineError::initialization("no config").is_fatal_at_initialization());
    assert!(!PipelineError::validation("bad range").is_fatal_at_initialization());
    assert!(!PipelineError::contract("unqueued").is_fatal_at_initialization());
}

#[test]
fn json_errors_convert_to_serde() {
    let err = serde_json::from_str::<u32>("nope").unwrap_err();
    let err = PipelineError::from(err);
    assert!(matches!(err, PipelineError::Serde(_)));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = PipelineError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
