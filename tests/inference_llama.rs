//! Integration test for real llama.cpp generation.
//! Requires MODEL_PATH env var pointing to a local GGUF and `--features llama`.
#![cfg(feature = "llama")]

#[test]
fn real_generation_streams_growing_text() -> anyhow::Result<()> {
    use sentinel_chat::agent::Agent;
    use sentinel_chat::generate::{Generation, GenerationParams};
    use sentinel_chat::model::llama::LlamaBackend;
    use std::{env, fs, path::PathBuf};
    use walkdir::WalkDir;

    // Resolve model path: prefer $MODEL_PATH, else search ./models for any .gguf
    let model_path: PathBuf = env::var("MODEL_PATH")
        .ok()
        .map(PathBuf::from)
        .filter(|p| fs::metadata(p).is_ok())
        .or_else(|| {
            let root = PathBuf::from("./models");
            if fs::metadata(&root).is_ok() {
                for entry in WalkDir::new(&root).into_iter().filter_map(Result::ok) {
                    let p = entry.into_path();
                    if p.extension().and_then(|s| s.to_str()) == Some("gguf") {
                        return Some(p);
                    }
                }
            }
            None
        })
        .expect("No model found. Set MODEL_PATH or place a .gguf under ./models");

    // Conservative params to keep the test reasonably fast and deterministic
    let backend = LlamaBackend::new(model_path, 2048, 0)?;
    let params = GenerationParams { max_length: 512, do_sample: false, ..GenerationParams::default() };
    let mut agent = Agent::new("You are a terse assistant.", params.clone(), 64);
    let prompt = agent.open_turn(&backend, "Say hello.")?;

    let yields: Vec<String> = Generation::start(&backend, &prompt, &params)?.collect::<Result<_, _>>()?;
    assert!(!yields.is_empty(), "no tokens generated");
    for pair in yields.windows(2) {
        assert!(pair[1].starts_with(&pair[0]) || pair[1].len() <= pair[0].len());
    }
    assert!(!yields.last().unwrap().trim().is_empty(), "empty reply");
    Ok(())
}
