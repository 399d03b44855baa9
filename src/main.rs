use std::panic;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sandbox_judge::{
    config::{Backend, JudgeConfig},
    core::{
        domain::{Challenge, Language, TestCase},
        pipeline::evaluating::TestSuiteEvaluator,
        traits::sandbox::Sandbox,
    },
    sandbox::{docker::DockerSandbox, local::LocalSandbox, runner::SandboxRunner},
    service::{JudgeService, Judgement},
    stubs::store::InMemoryChallengeStore,
};

const DEMO_CHALLENGE: &str = "echo";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let config = JudgeConfig::from_env()?;
    tracing::info!(?config, "Starting judge");

    let sandbox: Arc<dyn Sandbox> = match config.backend {
        Backend::Docker => Arc::new(DockerSandbox::new(&config.docker_path)),
        Backend::Local => Arc::new(LocalSandbox::new()),
    };
    let runner = Arc::new(SandboxRunner::new(sandbox, &config.workspace_root));
    let evaluator = Arc::new(TestSuiteEvaluator::new(runner, config.limits.clone()));
    let store = Arc::new(InMemoryChallengeStore::new());
    store.insert(demo_challenge());
    let service = JudgeService::new(store, Arc::new(config.limiter()), evaluator);

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        tracing::warn!("No source files given, usage: sandbox-judge <file.py>...");
        return Ok(());
    }

    let judgements = paths.iter().map(|path| judge_file(&service, path));
    for (path, result) in paths.iter().zip(futures::future::join_all(judgements).await) {
        match result {
            Ok(judgement) => tracing::info!(path = %path, verdict = ?judgement.verdict, "Done"),
            Err(e) => tracing::error!(path = %path, error = %e, "Failed to judge"),
        }
    }

    Ok(())
}

async fn judge_file(
    service: &JudgeService,
    path: &str,
) -> Result<Judgement, Box<dyn std::error::Error + Send + Sync>> {
    let code = tokio::fs::read_to_string(path).await?;
    Ok(service.judge(DEMO_CHALLENGE, &code).await?)
}

fn demo_challenge() -> Challenge {
    Challenge {
        id: DEMO_CHALLENGE.to_string(),
        language: Language::Python,
        test_cases: vec![
            TestCase::new("hi\n", "hi"),
            TestCase::new("hello world\n", "hello world"),
        ],
        base_code: "print(input())".to_string(),
        similarity_threshold: 50.0,
        anchors: Vec::new(),
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
