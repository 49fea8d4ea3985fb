use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use task_ledger::TaskLedger;

use crate::{
    bridge::{OrchestratorInner, SummaryOrchestrator},
    channel::CommandChannel,
    export::Exporter,
    notify::Notifier,
    summary::SummaryStreamer,
};

/// Builder for [`SummaryOrchestrator`]. Each collaborator slot is tracked in
/// the type, so `build` only exists once all four have been supplied.
///
/// ```ignore
/// let orchestrator = SummaryOrchestratorBuilder::new(ledger)
///     .channel(client.clone())
///     .streamer(backend.clone())
///     .exporter(exporter)
///     .notifier(LogNotifier)
///     .build();
/// ```
pub struct SummaryOrchestratorBuilder<C = (), S = (), E = (), N = ()> {
    ledger: Arc<TaskLedger>,
    channel: C,
    streamer: S,
    exporter: E,
    notifier: N,
}

impl SummaryOrchestratorBuilder {
    pub fn new(ledger: Arc<TaskLedger>) -> Self {
        SummaryOrchestratorBuilder {
            ledger,
            channel: (),
            streamer: (),
            exporter: (),
            notifier: (),
        }
    }
}

impl<C, S, E, N> SummaryOrchestratorBuilder<C, S, E, N> {
    pub fn channel<C2>(self, channel: C2) -> SummaryOrchestratorBuilder<C2, S, E, N>
    where
        C2: CommandChannel + Send + Sync + 'static,
    {
        SummaryOrchestratorBuilder {
            ledger: self.ledger,
            channel,
            streamer: self.streamer,
            exporter: self.exporter,
            notifier: self.notifier,
        }
    }

    pub fn streamer<S2>(self, streamer: S2) -> SummaryOrchestratorBuilder<C, S2, E, N>
    where
        S2: SummaryStreamer + Send + Sync + 'static,
    {
        SummaryOrchestratorBuilder {
            ledger: self.ledger,
            channel: self.channel,
            streamer,
            exporter: self.exporter,
            notifier: self.notifier,
        }
    }

    pub fn exporter<E2>(self, exporter: E2) -> SummaryOrchestratorBuilder<C, S, E2, N>
    where
        E2: Exporter + Send + Sync + 'static,
    {
        SummaryOrchestratorBuilder {
            ledger: self.ledger,
            channel: self.channel,
            streamer: self.streamer,
            exporter,
            notifier: self.notifier,
        }
    }

    pub fn notifier<N2>(self, notifier: N2) -> SummaryOrchestratorBuilder<C, S, E, N2>
    where
        N2: Notifier + Send + Sync + 'static,
    {
        SummaryOrchestratorBuilder {
            ledger: self.ledger,
            channel: self.channel,
            streamer: self.streamer,
            exporter: self.exporter,
            notifier,
        }
    }
}

impl<C, S, E, N> SummaryOrchestratorBuilder<C, S, E, N>
where
    C: CommandChannel + Send + Sync + 'static,
    S: SummaryStreamer + Send + Sync + 'static,
    E: Exporter + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    pub fn build(self) -> SummaryOrchestrator<C, S, E, N> {
        SummaryOrchestrator {
            inner: Arc::new(OrchestratorInner {
                ledger: self.ledger,
                channel: self.channel,
                streamer: self.streamer,
                exporter: self.exporter,
                notifier: self.notifier,
                active: Arc::new(Mutex::new(HashSet::new())),
                template: Mutex::new(None),
            }),
        }
    }
}
