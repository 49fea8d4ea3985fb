mod mocks;

use std::{sync::Arc, time::Duration};

use mocks::{MockChannel, MockExporter, MockNotifier, MockStreamer};
use summary_pulse::{
    channel::LogLevel, templates::find_template, ChannelEvent, OutboundMessage,
    SummaryOrchestrator, SummaryOrchestratorBuilder, SummaryTemplate,
};
use task_ledger::{Task, TaskKind, TaskLedger, TaskPatch, TaskStatus};

type TestOrchestrator = SummaryOrchestrator<MockChannel, MockStreamer, MockExporter, MockNotifier>;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn harness(
    streamer: MockStreamer,
    exporter: MockExporter,
) -> (TestOrchestrator, Arc<TaskLedger>, MockChannel, MockNotifier) {
    let ledger = Arc::new(TaskLedger::new());
    let channel = MockChannel::new();
    let notifier = MockNotifier::new();
    let orchestrator = SummaryOrchestratorBuilder::new(ledger.clone())
        .channel(channel.clone())
        .streamer(streamer)
        .exporter(exporter)
        .notifier(notifier.clone())
        .build();
    (orchestrator, ledger, channel, notifier)
}

async fn spawn_run(orchestrator: &TestOrchestrator) {
    let runner = orchestrator.clone();
    tokio::spawn(async move { runner.run().await });
    tokio::task::yield_now().await;
}

fn enqueue(ledger: &TaskLedger, source: &str) -> Task {
    ledger
        .enqueue(TaskKind::Url, source, None)
        .expect("source is not blank")
}

fn template() -> SummaryTemplate {
    find_template("summary").expect("built-in template exists")
}

fn transcript_ready(task_id: &str, transcript: &str) -> ChannelEvent {
    ChannelEvent::TranscriptReady {
        task_id: task_id.to_string(),
        transcript: transcript.to_string(),
    }
}

/// Lets the spawned event loop and any summarization tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn wait_for_terminal(ledger: &TaskLedger, id: &str) -> Task {
    let mut events = ledger.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task) = ledger.get(id) {
                if task.status.is_terminal() {
                    return task;
                }
            }
            let _ = events.recv().await;
        }
    })
    .await
    .expect("task should settle before the timeout")
}

// ─── Transcript handling ────────────────────────────────────────────────────

#[tokio::test]
async fn test_transcript_ready_runs_summarization_to_completion() {
    let streamer = MockStreamer::new(&["Intro. ", "Body."]);
    let exporter = MockExporter::new();
    let (orchestrator, ledger, channel, notifier) = harness(streamer.clone(), exporter.clone());
    let task = enqueue(&ledger, "https://example.com/v/1");
    orchestrator.start_processing(Some(&template()));
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready(&task.id, "full transcript"));

    let settled = wait_for_terminal(&ledger, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Completed);
    assert_eq!(settled.progress, 100);
    assert_eq!(settled.output_path.as_deref(), Some("out/test-summary.md"));
    assert!(settled.error.is_none(), "completed task must carry no error");

    let requests = streamer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].transcript, "full transcript");
    assert_eq!(
        requests[0].instruction,
        template().instruction,
        "the instruction from start_processing must reach the streamer"
    );

    let exports = exporter.requests();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].summary, "Intro. Body.");
    assert_eq!(exports[0].task_id, task.id);

    let notices = notifier.notices();
    assert!(
        notices.iter().any(|(title, _)| title == "Summary ready"),
        "expected a success notice, got {notices:?}"
    );
}

#[tokio::test]
async fn test_duplicate_transcripts_run_one_summarization() {
    let streamer = MockStreamer::new(&["S"]).with_delay(Duration::from_millis(50));
    let (orchestrator, ledger, channel, _notifier) = harness(streamer.clone(), MockExporter::new());
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready(&task.id, "words"));
    channel.emit(transcript_ready(&task.id, "words"));

    let settled = wait_for_terminal(&ledger, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Completed);
    assert_eq!(
        streamer.calls(),
        1,
        "second transcript must be ignored while the first is in flight"
    );
}

#[tokio::test]
async fn test_empty_duplicate_cannot_fail_a_running_summarization() {
    let streamer = MockStreamer::new(&["S"]).with_delay(Duration::from_millis(100));
    let (orchestrator, ledger, channel, _notifier) = harness(streamer.clone(), MockExporter::new());
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready(&task.id, "words"));
    settle().await;
    channel.emit(transcript_ready(&task.id, "   "));
    settle().await;

    assert_ne!(
        ledger.get(&task.id).map(|t| t.status),
        Some(TaskStatus::Failed),
        "an empty duplicate must not fail the task mid-run"
    );

    let settled = wait_for_terminal(&ledger, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Completed);
    assert_eq!(streamer.calls(), 1);
}

#[tokio::test]
async fn test_transcript_after_completion_is_ignored() {
    let streamer = MockStreamer::new(&["S"]);
    let (orchestrator, ledger, channel, _notifier) = harness(streamer.clone(), MockExporter::new());
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready(&task.id, "words"));
    let settled = wait_for_terminal(&ledger, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Completed);

    channel.emit(transcript_ready(&task.id, "words again"));
    settle().await;

    assert_eq!(streamer.calls(), 1, "settled tasks are never re-summarized");
}

#[tokio::test]
async fn test_empty_transcript_fails_the_task_without_summarizing() {
    let streamer = MockStreamer::new(&["unused"]);
    let (orchestrator, ledger, channel, notifier) = harness(streamer.clone(), MockExporter::new());
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready(&task.id, "  \n "));

    let settled = wait_for_terminal(&ledger, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Failed);
    let error = settled.error.expect("failed task must carry an error");
    assert!(error.contains("transcript"), "got {error:?}");
    assert_eq!(streamer.calls(), 0);
    assert!(
        notifier
            .notices()
            .iter()
            .any(|(title, _)| title == "Summarization failed"),
        "user must be told the task failed"
    );
}

#[tokio::test]
async fn test_transcript_for_unknown_task_is_ignored() {
    let streamer = MockStreamer::new(&["unused"]);
    let (orchestrator, ledger, channel, _notifier) = harness(streamer.clone(), MockExporter::new());
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready("ghost", "words"));
    settle().await;

    assert_eq!(streamer.calls(), 0);
    assert!(
        ledger.list().is_empty(),
        "an unknown id must not create a task"
    );
}

// ─── Failure paths ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_streamer_failure_marks_the_task_failed() {
    let exporter = MockExporter::new();
    let (orchestrator, ledger, channel, notifier) =
        harness(MockStreamer::failing("model exploded"), exporter.clone());
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready(&task.id, "words"));

    let settled = wait_for_terminal(&ledger, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Failed);
    let error = settled.error.expect("failed task must carry an error");
    assert!(error.contains("model exploded"), "got {error:?}");
    assert!(
        exporter.requests().is_empty(),
        "failed summaries are not exported"
    );
    assert!(notifier
        .notices()
        .iter()
        .any(|(title, _)| title == "Summarization failed"));
}

#[tokio::test]
async fn test_exporter_failure_marks_the_task_failed() {
    let (orchestrator, ledger, channel, notifier) = harness(
        MockStreamer::new(&["S"]),
        MockExporter::failing("disk full"),
    );
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(transcript_ready(&task.id, "words"));

    let settled = wait_for_terminal(&ledger, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Failed);
    let error = settled.error.expect("failed task must carry an error");
    assert!(error.contains("Export failed"), "got {error:?}");
    assert!(error.contains("disk full"));
    assert!(
        settled.output_path.is_none(),
        "failed task must not claim an artifact"
    );
    assert!(notifier
        .notices()
        .iter()
        .any(|(title, _)| title == "Summarization failed"));
}

// ─── Start requests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_processing_without_template_sends_nothing() {
    let (orchestrator, ledger, channel, notifier) =
        harness(MockStreamer::new(&[]), MockExporter::new());
    let task = enqueue(&ledger, "https://example.com/v/1");

    let started = orchestrator.start_processing(None);

    assert_eq!(started, 0);
    assert!(channel.sent().is_empty(), "no send without a template");
    assert!(notifier
        .notices()
        .iter()
        .any(|(title, _)| title == "No template selected"));
    let task = ledger.get(&task.id).expect("task still queued");
    assert_eq!(task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_start_processing_batches_pending_into_one_message() {
    let (orchestrator, ledger, channel, _notifier) =
        harness(MockStreamer::new(&[]), MockExporter::new());
    let first = enqueue(&ledger, "https://example.com/v/1");
    let second = enqueue(&ledger, "https://example.com/v/2");
    let third = enqueue(&ledger, "https://example.com/v/3");

    let template = template();
    let started = orchestrator.start_processing(Some(&template));
    assert_eq!(started, 3);

    let sent = channel.sent();
    assert_eq!(sent.len(), 1, "one message carries the whole batch");
    let OutboundMessage::StartProcessing { tasks } = &sent[0];
    assert_eq!(
        tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
        vec![first.id.as_str(), second.id.as_str(), third.id.as_str()],
        "batch preserves insertion order"
    );
    assert!(tasks
        .iter()
        .all(|t| t.template_instruction == template.instruction));
}

#[tokio::test]
async fn test_start_processing_skips_settled_tasks() {
    let (orchestrator, ledger, channel, _notifier) =
        harness(MockStreamer::new(&[]), MockExporter::new());
    let done = enqueue(&ledger, "https://example.com/v/1");
    let queued = enqueue(&ledger, "https://example.com/v/2");
    ledger.apply(&done.id, TaskPatch::progress(TaskStatus::Processing, 60, "working"));
    ledger.apply(&done.id, TaskPatch::completed("out/earlier.md"));

    let started = orchestrator.start_processing(Some(&template()));

    assert_eq!(started, 1);
    let sent = channel.sent();
    let OutboundMessage::StartProcessing { tasks } = &sent[0];
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, queued.id);
}

#[tokio::test]
async fn test_start_processing_when_disconnected_drops_the_send() {
    let ledger = Arc::new(TaskLedger::new());
    let channel = MockChannel::disconnected();
    let orchestrator = SummaryOrchestratorBuilder::new(ledger.clone())
        .channel(channel.clone())
        .streamer(MockStreamer::new(&[]))
        .exporter(MockExporter::new())
        .notifier(MockNotifier::new())
        .build();
    enqueue(&ledger, "https://example.com/v/1");

    let started = orchestrator.start_processing(Some(&template()));

    assert_eq!(started, 1, "the batch is still reported");
    assert!(
        channel.sent().is_empty(),
        "nothing reaches a disconnected channel"
    );
}

// ─── Remote events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_progress_updates_the_ledger() {
    let (orchestrator, ledger, channel, _notifier) =
        harness(MockStreamer::new(&[]), MockExporter::new());
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(ChannelEvent::Progress {
        task_id: task.id.clone(),
        patch: TaskPatch::progress(TaskStatus::Downloading, 10, "Fetching audio"),
    });
    channel.emit(ChannelEvent::TaskUpdate {
        task_id: task.id.clone(),
        patch: TaskPatch::progress(TaskStatus::Processing, 40, "Transcribing"),
    });
    settle().await;

    let task = ledger.get(&task.id).expect("task exists");
    assert_eq!(task.status, TaskStatus::Processing);
    assert_eq!(task.progress, 40);
    assert_eq!(task.message, "Transcribing");
}

#[tokio::test]
async fn test_transport_events_leave_tasks_untouched() {
    let (orchestrator, ledger, channel, _notifier) =
        harness(MockStreamer::new(&[]), MockExporter::new());
    let task = enqueue(&ledger, "https://example.com/v/1");
    spawn_run(&orchestrator).await;

    channel.emit(ChannelEvent::Connected);
    channel.emit(ChannelEvent::TransportError {
        message: "connection reset".to_string(),
    });
    channel.emit(ChannelEvent::Closed { reconnecting: true });
    channel.emit(ChannelEvent::TaskLog {
        task_id: task.id.clone(),
        level: LogLevel::Info,
        message: "downloading audio".to_string(),
    });
    settle().await;

    let task = ledger.get(&task.id).expect("task exists");
    assert_eq!(
        task.status,
        TaskStatus::Pending,
        "log and transport events never change task state"
    );
    assert_eq!(task.progress, 0);
}
