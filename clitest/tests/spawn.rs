//! Interactive tests against the fixture CLI.

mod common;

use std::time::{Duration, Instant};

use clitest::{Error, Key, Signal, SpawnOptions, WaitForTextOptions};
use common::*;
use pretty_assertions::assert_eq;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread")]
async fn test_text_prompt() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "text", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        process
            .wait_for_text("Give me a number", WaitForTextOptions::new())
            .await
            .unwrap()
            .assert_found();
        process.write_text("15").await;
        process.press_key("enter").await.unwrap();

        process.wait_for_finish(None).await.assert_exit_code(0);
        assert_eq!(
            process.stdout(),
            vec![
                "? Give me a number: ›",
                "✔ Give me a number: … 15",
                "Answered: 15",
            ]
        );
        assert_eq!(process.exit_code(), Some(0));

        env.cleanup().await.expect("Failed to clean up");
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_for_finish_can_time_out_and_be_repeated() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "wait", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        let early = process
            .wait_for_finish(Some(Duration::from_millis(100)))
            .await;
        assert_eq!(early.exit_code, None);
        assert!(early.stdout.is_empty());
        assert!(!process.has_exited());

        let done = process.wait_for_finish(None).await;
        done.assert_exit_code(0);
        assert_eq!(done.stdout, vec!["Done waiting"]);
        assert!(process.has_exited());

        env.cleanup().await.expect("Failed to clean up");
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_select_prompt() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "select", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        process
            .wait_for_text("Pick option", WaitForTextOptions::new())
            .await
            .unwrap()
            .assert_found();
        process.press_key("arrowDown").await.unwrap();
        process.press(Key::Enter).await;

        process.wait_for_finish(None).await.assert_exit_code(0);
        insta::assert_debug_snapshot!(process.stdout(), @r#"
        [
            "? Pick option: › - Use arrow-keys. Return to submit.",
            "❯   First",
            "Second",
            "? Pick option: › - Use arrow-keys. Return to submit.",
            "First",
            "❯   Second",
            "✔ Pick option: › Second",
            "Picked: second option",
        ]
        "#);
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_kill_process() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "select", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        process
            .wait_for_text("Pick option", WaitForTextOptions::new())
            .await
            .unwrap()
            .assert_found();
        process.kill(Signal::SIGINT);

        process
            .wait_for_text("Picked", WaitForTextOptions::new().timeout(Duration::from_secs(10)))
            .await
            .unwrap()
            .assert_exited();
        assert!(process.has_exited());
        assert_eq!(process.exit_code(), None);
        assert!(process.stderr().is_empty());
        assert_eq!(
            process.stdout(),
            vec![
                "? Pick option: › - Use arrow-keys. Return to submit.",
                "❯   First",
                "Second",
            ]
        );

        // No live process left: these are no-ops.
        process.kill(Signal::SIGTERM);
        process.write_text("ignored").await;
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_regex_wait() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "random", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        process
            .wait_for_text(
                r"\d+ dogs, \d+ cats, and \d+ birds",
                WaitForTextOptions::new().use_regex(true),
            )
            .await
            .unwrap()
            .assert_found();
        process.wait_for_finish(None).await.assert_exit_code(0);

        let err = process
            .wait_for_text("(dogs", WaitForTextOptions::new().use_regex(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_early_exit() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "error", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        process
            .wait_for_text("An error occurred", WaitForTextOptions::new())
            .await
            .unwrap()
            .assert_found();
        process.write_text("input").await;
        process.wait_for_finish(None).await.assert_exit_code(1);

        let start = Instant::now();
        process
            .wait_for_text("Missing Text", WaitForTextOptions::new().timeout(Duration::from_secs(10)))
            .await
            .unwrap()
            .assert_exited();
        assert!(start.elapsed() < Duration::from_secs(5));

        process
            .wait_for_text("An error occurred", WaitForTextOptions::new().check_history(true))
            .await
            .unwrap()
            .assert_found();
        assert_eq!(process.stderr(), vec!["An error occurred"]);
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_text_times_out() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "wait", SpawnOptions::new())
            .await
            .expect("Failed to spawn");
        assert_eq!(process.exit_code(), None);
        assert!(!process.has_exited());

        let start = Instant::now();
        let outcome = process
            .wait_for_text("Missing Text", WaitForTextOptions::new().timeout(Duration::from_millis(100)))
            .await
            .unwrap();
        outcome.assert_timed_out();
        outcome.assert_not_found();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!process.has_exited());

        env.cleanup().await.expect("Failed to clean up");
        assert!(process.has_exited());
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pure_wait() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "select", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        let start = Instant::now();
        process.wait(Duration::from_millis(500)).await;
        assert!(start.elapsed() >= Duration::from_millis(500));

        // Closing stdin ends the prompt without an answer.
        process.wait_for_finish(None).await.assert_exit_code(0);
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spawn_env() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(
                FIXTURE,
                "env",
                SpawnOptions::new()
                    .env("HELLO", "UNIVERSE")
                    .env("NODE_ENV", "Yes"),
            )
            .await
            .expect("Failed to spawn");

        process
            .wait_for_text("- HELLO: UNIVERSE", WaitForTextOptions::new())
            .await
            .unwrap()
            .assert_found();
        process
            .wait_for_text("- NODE_ENV: Yes", WaitForTextOptions::new())
            .await
            .unwrap()
            .assert_found();
        process.wait_for_finish(None).await.assert_exit_code(0);
        assert_eq!(process.job_id(), env.id());
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_debug_mirrors_output() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "print mirrored", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        // Mirrors are plain subscribers; attaching twice is allowed.
        process.debug();
        process.debug();

        process.wait_for_finish(None).await.assert_exit_code(0);
        assert_eq!(process.stdout(), vec!["cli:print: mirrored"]);
    })
    .await
    .expect("Test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_key() {
    timeout(TEST_TIMEOUT, async {
        let ctx = TestContext::new();
        let env = ctx.environment();
        let process = env
            .spawn(FIXTURE, "select", SpawnOptions::new())
            .await
            .expect("Failed to spawn");

        let err = process.press_key("hyper").await.unwrap_err();
        assert!(matches!(err, Error::UnknownKey(ref name) if name == "hyper"));

        env.cleanup().await.expect("Failed to clean up");
    })
    .await
    .expect("Test timed out");
}
