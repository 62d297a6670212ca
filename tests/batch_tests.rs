//! End-to-end batch tests over mock providers and a temp output tree.

use std::sync::Arc;

use tempfile::TempDir;

use doi_harvest::batch::{BatchOptions, BatchRunner};
use doi_harvest::checkpoint::CheckpointStore;
use doi_harvest::config::RateLimitConfig;
use doi_harvest::providers::mock::MockProvider;
use doi_harvest::providers::ProviderRegistry;
use doi_harvest::resolve::ResolutionChain;
use doi_harvest::supplements::SupplementScraper;
use doi_harvest::throttle::RateLimiter;
use doi_harvest::utils::HttpClient;

fn runner_with(
    providers: Vec<Arc<MockProvider>>,
    options: BatchOptions,
) -> BatchRunner {
    let mut registry = ProviderRegistry::empty();
    for provider in providers {
        registry.register(provider);
    }
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), None));
    let chain = ResolutionChain::new(registry, limiter);
    // Point the scraper at a dead port so SI lookups fail fast and cleanly.
    let scraper =
        SupplementScraper::new(HttpClient::new(), 5).with_doi_base("http://127.0.0.1:9");
    BatchRunner::with_parts(chain, scraper, options)
}

fn options_in(dir: &TempDir) -> BatchOptions {
    BatchOptions {
        output_dir: dir.path().to_path_buf(),
        ..BatchOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn success_writes_pdf_under_slug_directory() {
    let dir = TempDir::new().unwrap();
    let wiley = Arc::new(MockProvider::new("wiley").respond_pdf());
    let mut runner = runner_with(vec![Arc::clone(&wiley)], options_in(&dir));

    let summary = runner
        .run(&["10.1002/anie.202100001".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.successes.len(), 1);
    assert_eq!(summary.providers["wiley"].succeeded, 1);

    let pdf_path = dir
        .path()
        .join("10.1002_anie.202100001")
        .join("10.1002_anie.202100001.pdf");
    let bytes = std::fs::read(&pdf_path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test(start_paused = true)]
async fn resume_skips_checkpointed_success_without_provider_calls() {
    let dir = TempDir::new().unwrap();
    let doi = "10.1002/anie.202100001".to_string();

    {
        let wiley = Arc::new(MockProvider::new("wiley").respond_pdf());
        let mut runner = runner_with(vec![wiley], options_in(&dir));
        let summary = runner.run(std::slice::from_ref(&doi)).await.unwrap();
        assert_eq!(summary.successes.len(), 1);
    }

    // Second run, fresh providers with an empty script: nothing may be called.
    let wiley = Arc::new(MockProvider::new("wiley"));
    let openalex = Arc::new(MockProvider::new("openalex"));
    let mut runner = runner_with(
        vec![Arc::clone(&wiley), Arc::clone(&openalex)],
        options_in(&dir),
    );
    let summary = runner.run(std::slice::from_ref(&doi)).await.unwrap();

    assert_eq!(summary.skipped_resume, 1);
    assert_eq!(wiley.calls(), 0);
    assert_eq!(openalex.calls(), 0);
    // The prior success is still reported.
    assert!(summary.successes.contains_key(doi.as_str()));
}

#[tokio::test(start_paused = true)]
async fn overwrite_reattempts_and_checkpoint_keeps_latest_outcome() {
    let dir = TempDir::new().unwrap();
    let doi = "10.1038/s41586-020-2649-2".to_string();

    {
        let springer = Arc::new(MockProvider::new("springer").respond_pdf());
        let mut runner = runner_with(vec![springer], options_in(&dir));
        runner.run(std::slice::from_ref(&doi)).await.unwrap();
    }

    // Overwrite run where every provider comes up empty.
    let springer = Arc::new(MockProvider::new("springer"));
    let options = BatchOptions {
        overwrite: true,
        ..options_in(&dir)
    };
    let mut runner = runner_with(vec![Arc::clone(&springer)], options);
    let summary = runner.run(std::slice::from_ref(&doi)).await.unwrap();

    assert_eq!(springer.calls(), 1);
    assert!(summary.failures.contains_key(doi.as_str()));

    // Later lines win: the checkpoint now carries the failure.
    let store = CheckpointStore::for_input(dir.path(), "dois").unwrap();
    assert!(!store.is_done(&doi));
}

#[tokio::test(start_paused = true)]
async fn skip_failed_leaves_prior_failures_alone() {
    let dir = TempDir::new().unwrap();
    let doi = "10.1016/j.cell.2020.01.001".to_string();

    {
        let elsevier = Arc::new(MockProvider::new("elsevier"));
        let mut runner = runner_with(vec![elsevier], options_in(&dir));
        runner.run(std::slice::from_ref(&doi)).await.unwrap();
    }

    let elsevier = Arc::new(MockProvider::new("elsevier").respond_pdf());
    let options = BatchOptions {
        skip_failed: true,
        ..options_in(&dir)
    };
    let mut runner = runner_with(vec![Arc::clone(&elsevier)], options);
    let summary = runner.run(std::slice::from_ref(&doi)).await.unwrap();

    assert_eq!(elsevier.calls(), 0);
    assert!(summary.failures.contains_key(doi.as_str()));
}

#[tokio::test(start_paused = true)]
async fn max_per_publisher_routes_overflow_to_the_oa_tail() {
    let dir = TempDir::new().unwrap();
    let wiley = Arc::new(MockProvider::new("wiley").respond_pdf().respond_pdf());
    let openalex = Arc::new(MockProvider::new("openalex").respond_pdf().respond_pdf());
    let options = BatchOptions {
        max_per_publisher: Some(1),
        ..options_in(&dir)
    };
    let mut runner = runner_with(
        vec![Arc::clone(&wiley), Arc::clone(&openalex)],
        options,
    );

    let dois = vec![
        "10.1002/anie.202100001".to_string(),
        "10.1002/anie.202100002".to_string(),
    ];
    let summary = runner.run(&dois).await.unwrap();

    assert_eq!(summary.successes.len(), 2);
    assert_eq!(wiley.calls(), 1);
    assert_eq!(summary.providers["wiley"].succeeded, 1);
    assert_eq!(summary.providers["openalex"].succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_doi_is_recorded_and_never_attempted() {
    let dir = TempDir::new().unwrap();
    let wiley = Arc::new(MockProvider::new("wiley").respond_pdf());
    let mut runner = runner_with(vec![Arc::clone(&wiley)], options_in(&dir));

    let summary = runner
        .run(&["definitely not a doi".to_string()])
        .await
        .unwrap();

    assert_eq!(wiley.calls(), 0);
    assert_eq!(summary.failures.len(), 1);

    let store = CheckpointStore::for_input(dir.path(), "dois").unwrap();
    assert_eq!(store.len(), 1);
    assert!(!store.is_done("definitely not a doi"));
}

#[tokio::test(start_paused = true)]
async fn dry_run_does_no_io_and_no_network() {
    let dir = TempDir::new().unwrap();
    let wiley = Arc::new(MockProvider::new("wiley").respond_pdf());
    let options = BatchOptions {
        dry_run: true,
        ..options_in(&dir)
    };
    let mut runner = runner_with(vec![Arc::clone(&wiley)], options);

    let summary = runner
        .run(&["10.1002/anie.202100001".to_string()])
        .await
        .unwrap();

    assert_eq!(wiley.calls(), 0);
    assert_eq!(summary.total_processed(), 0);
    assert!(!dir.path().join("dois.checkpoint.jsonl").exists());
}

#[tokio::test(start_paused = true)]
async fn duplicate_inputs_collapse_to_one_download() {
    let dir = TempDir::new().unwrap();
    let wiley = Arc::new(MockProvider::new("wiley").respond_pdf().respond_pdf());
    let mut runner = runner_with(vec![Arc::clone(&wiley)], options_in(&dir));

    let dois = vec![
        "10.1002/anie.202100001".to_string(),
        "https://doi.org/10.1002/anie.202100001".to_string(),
    ];
    let summary = runner.run(&dois).await.unwrap();

    assert_eq!(wiley.calls(), 1);
    assert_eq!(summary.successes.len(), 1);
}
