//! Conversation state machine
//!
//! `decide` is the pure core: given the stored conversation state and an
//! inbound message body it produces the next state and the outbound
//! actions to perform. `ReviewFlow` is the effectful driver that executes
//! those actions against the transport gateway and persists state, plus
//! the stateless post-call thank-you handler.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use solara_core::PhoneNumber;

use crate::catalog::{self, Substitutions, TemplateId};
use crate::metrics::ReviewMetrics;
use crate::state::{ConversationState, ConversationStore, Participation};
use crate::transport::{TransportError, TransportGateway};

/// One outbound effect requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    SendSms {
        template: TemplateId,
        name: Option<String>,
    },
    /// Place the review call (after the configured notification delay)
    PlaceCall,
}

/// What kind of transition a decision represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Greeted,
    Accepted,
    Declined,
    NameCollected,
    Fallback,
}

/// Outcome of one inbound message: the state to persist once the actions
/// succeed, and the actions themselves, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub next: ConversationState,
    pub actions: Vec<OutboundAction>,
    pub kind: TransitionKind,
}

/// Decide the next state and outbound actions for one inbound message.
///
/// Comparisons are case-insensitive over the whitespace-trimmed body;
/// anything other than an exact "yes"/"no" is invalid input. A stored
/// `Declined` participation never rests (decline resets the conversation
/// on emission), so it is treated as a fresh conversation here.
pub fn decide(state: &ConversationState, body: &str, caller_name: Option<&str>) -> Decision {
    let trimmed = body.trim();

    if state.is_fresh() || state.participation == Participation::Declined {
        return Decision {
            next: ConversationState {
                greeted: true,
                participation: Participation::Undecided,
                collected_name: None,
            },
            actions: vec![
                OutboundAction::SendSms {
                    template: TemplateId::Greeting,
                    name: caller_name.map(str::to_string),
                },
                OutboundAction::SendSms {
                    template: TemplateId::ParticipationInvite,
                    name: None,
                },
            ],
            kind: TransitionKind::Greeted,
        };
    }

    match state.participation {
        Participation::Undecided => {
            if trimmed.eq_ignore_ascii_case("yes") {
                Decision {
                    next: ConversationState {
                        greeted: true,
                        participation: Participation::Accepted,
                        collected_name: None,
                    },
                    actions: vec![
                        OutboundAction::SendSms {
                            template: TemplateId::AcceptConfirmation,
                            name: None,
                        },
                        OutboundAction::SendSms {
                            template: TemplateId::AskForName,
                            name: None,
                        },
                    ],
                    kind: TransitionKind::Accepted,
                }
            } else if trimmed.eq_ignore_ascii_case("no") {
                Decision {
                    next: ConversationState::fresh(),
                    actions: vec![OutboundAction::SendSms {
                        template: TemplateId::Goodbye,
                        name: None,
                    }],
                    kind: TransitionKind::Declined,
                }
            } else {
                Decision {
                    next: state.clone(),
                    actions: vec![OutboundAction::SendSms {
                        template: TemplateId::InviteFallback,
                        name: None,
                    }],
                    kind: TransitionKind::Fallback,
                }
            }
        }
        Participation::Accepted => {
            if trimmed.is_empty() {
                Decision {
                    next: state.clone(),
                    actions: vec![OutboundAction::SendSms {
                        template: TemplateId::AskForNameFallback,
                        name: None,
                    }],
                    kind: TransitionKind::Fallback,
                }
            } else {
                let name = title_case(trimmed);
                Decision {
                    next: ConversationState::fresh(),
                    actions: vec![
                        OutboundAction::SendSms {
                            template: TemplateId::NamedGreeting,
                            name: Some(name.clone()),
                        },
                        OutboundAction::SendSms {
                            template: TemplateId::CallNotification,
                            name: None,
                        },
                        OutboundAction::PlaceCall,
                    ],
                    kind: TransitionKind::NameCollected,
                }
            }
        }
        Participation::Declined => unreachable!("declined state handled as fresh"),
    }
}

/// Capitalize each whitespace-separated word.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Effectful driver for the conversation state machine.
///
/// State is persisted only after every SMS action of a step has
/// succeeded; the review call resets the conversation whether or not the
/// call itself could be placed.
pub struct ReviewFlow {
    transport: Arc<dyn TransportGateway>,
    metrics: ReviewMetrics,
    call_delay: Duration,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ReviewFlow {
    pub fn new(
        transport: Arc<dyn TransportGateway>,
        metrics: ReviewMetrics,
        call_delay: Duration,
    ) -> Self {
        Self {
            transport,
            metrics,
            call_delay,
            locks: DashMap::new(),
        }
    }

    /// Process one inbound SMS. Inbound webhooks for the same number are
    /// serialized; distinct numbers proceed independently.
    pub async fn handle_inbound_sms(
        &self,
        store: &dyn ConversationStore,
        from: &PhoneNumber,
        body: &str,
        caller_name: Option<&str>,
    ) -> Result<(), FlowError> {
        let lock = self
            .locks
            .entry(from.as_str().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let current = store.get(from).await;
        let decision = decide(&current, body, caller_name);
        debug!(from = %from, kind = ?decision.kind, "Conversation step decided");

        let mut persisted = false;
        for action in &decision.actions {
            match action {
                OutboundAction::SendSms { template, name } => {
                    let body = catalog::render(
                        *template,
                        Substitutions {
                            name: name.as_deref(),
                        },
                    );
                    self.transport.send_sms(from, &body).await?;
                }
                OutboundAction::PlaceCall => {
                    // Let the notification SMS arrive before the phone rings.
                    tokio::time::sleep(self.call_delay).await;
                    let result = self
                        .transport
                        .place_call(from, &catalog::review_call_twiml())
                        .await;
                    // Terminal outcome whether or not the call went out.
                    store.clear(from).await;
                    persisted = true;
                    result?;
                    self.metrics.calls_placed.inc();
                    info!(to = %from, "Review call placed");
                }
            }
        }

        if !persisted {
            if decision.next.is_fresh() {
                store.clear(from).await;
            } else {
                store.put(from, decision.next.clone()).await;
            }
        }

        match decision.kind {
            TransitionKind::Greeted => self.metrics.invites_sent.inc(),
            TransitionKind::Accepted => self.metrics.invites_accepted.inc(),
            TransitionKind::Declined => self.metrics.invites_declined.inc(),
            TransitionKind::NameCollected | TransitionKind::Fallback => {}
        }

        Ok(())
    }

    /// Post-call completion event: thank the reviewer.
    ///
    /// Reads and writes no conversation state; duplicate completion
    /// events produce duplicate thank-you messages, which is accepted.
    pub async fn handle_call_completed(&self, to: &PhoneNumber) -> Result<(), FlowError> {
        let body = catalog::render(TemplateId::ThankYou, Substitutions::default());
        self.transport.send_sms(to, &body).await?;
        self.metrics.thank_yous_sent.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryConversationStore;

    fn fresh() -> ConversationState {
        ConversationState::fresh()
    }

    fn awaiting_decision() -> ConversationState {
        ConversationState {
            greeted: true,
            participation: Participation::Undecided,
            collected_name: None,
        }
    }

    fn awaiting_name() -> ConversationState {
        ConversationState {
            greeted: true,
            participation: Participation::Accepted,
            collected_name: None,
        }
    }

    fn templates(decision: &Decision) -> Vec<TemplateId> {
        decision
            .actions
            .iter()
            .filter_map(|a| match a {
                OutboundAction::SendSms { template, .. } => Some(*template),
                OutboundAction::PlaceCall => None,
            })
            .collect()
    }

    #[test]
    fn test_first_message_greets_regardless_of_body() {
        for body in ["hi", "", "yes", "  no  ", "1234"] {
            let decision = decide(&fresh(), body, None);
            assert_eq!(decision.kind, TransitionKind::Greeted);
            assert_eq!(
                templates(&decision),
                vec![TemplateId::Greeting, TemplateId::ParticipationInvite]
            );
            assert!(decision.next.greeted);
            assert_eq!(decision.next.participation, Participation::Undecided);
        }
    }

    #[test]
    fn test_greeting_personalized_for_known_customer() {
        let decision = decide(&fresh(), "hello", Some("Ana"));
        match &decision.actions[0] {
            OutboundAction::SendSms { template, name } => {
                assert_eq!(*template, TemplateId::Greeting);
                assert_eq!(name.as_deref(), Some("Ana"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_yes_variants_accepted() {
        for body in ["yes", "YES", " yes ", "Yes"] {
            let decision = decide(&awaiting_decision(), body, None);
            assert_eq!(decision.kind, TransitionKind::Accepted);
            assert_eq!(decision.next.participation, Participation::Accepted);
            assert_eq!(
                templates(&decision),
                vec![TemplateId::AcceptConfirmation, TemplateId::AskForName]
            );
        }
    }

    #[test]
    fn test_fuzzy_tokens_rejected() {
        for body in ["yeah", "y", "", "yes please", "nope"] {
            let decision = decide(&awaiting_decision(), body, None);
            assert_eq!(decision.kind, TransitionKind::Fallback);
            assert_eq!(decision.next, awaiting_decision());
            assert_eq!(templates(&decision), vec![TemplateId::InviteFallback]);
        }
    }

    #[test]
    fn test_no_resets_to_fresh() {
        let decision = decide(&awaiting_decision(), " No ", None);
        assert_eq!(decision.kind, TransitionKind::Declined);
        assert!(decision.next.is_fresh());
        assert_eq!(templates(&decision), vec![TemplateId::Goodbye]);

        // A later message from the same number re-triggers the greeting.
        let again = decide(&decision.next, "hello again", None);
        assert_eq!(again.kind, TransitionKind::Greeted);
    }

    #[test]
    fn test_name_collection_title_cases_and_places_call() {
        let decision = decide(&awaiting_name(), "john smith", None);
        assert_eq!(decision.kind, TransitionKind::NameCollected);
        assert!(decision.next.is_fresh());
        assert_eq!(decision.actions.len(), 3);
        match &decision.actions[0] {
            OutboundAction::SendSms { template, name } => {
                assert_eq!(*template, TemplateId::NamedGreeting);
                assert_eq!(name.as_deref(), Some("John Smith"));
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(decision.actions[2], OutboundAction::PlaceCall);
    }

    #[test]
    fn test_blank_name_falls_back() {
        let decision = decide(&awaiting_name(), "   ", None);
        assert_eq!(decision.kind, TransitionKind::Fallback);
        assert_eq!(decision.next, awaiting_name());
        assert_eq!(templates(&decision), vec![TemplateId::AskForNameFallback]);
    }

    #[test]
    fn test_stale_declined_state_treated_as_fresh() {
        let declined = ConversationState {
            greeted: true,
            participation: Participation::Declined,
            collected_name: None,
        };
        let decision = decide(&declined, "hi", None);
        assert_eq!(decision.kind, TransitionKind::Greeted);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("john smith"), "John Smith");
        assert_eq!(title_case("  ANA  "), "Ana");
        assert_eq!(title_case("mary-jane o'brien"), "Mary-jane O'brien");
    }

    // Driver tests

    struct RecordingTransport {
        sms: parking_lot::Mutex<Vec<(String, String)>>,
        calls: parking_lot::Mutex<Vec<String>>,
        fail_sms: bool,
        fail_call: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sms: parking_lot::Mutex::new(Vec::new()),
                calls: parking_lot::Mutex::new(Vec::new()),
                fail_sms: false,
                fail_call: false,
            }
        }

        fn failing_sms() -> Self {
            Self {
                fail_sms: true,
                ..Self::new()
            }
        }

        fn failing_call() -> Self {
            Self {
                fail_call: true,
                ..Self::new()
            }
        }

        fn sms_bodies(&self) -> Vec<String> {
            self.sms.lock().iter().map(|(_, b)| b.clone()).collect()
        }
    }

    fn api_error() -> TransportError {
        TransportError::Api {
            code: 21211,
            message: "Invalid 'To' phone number".to_string(),
            status: 400,
            more_info: None,
            details: None,
        }
    }

    #[async_trait::async_trait]
    impl TransportGateway for RecordingTransport {
        async fn send_sms(
            &self,
            to: &PhoneNumber,
            body: &str,
        ) -> Result<(), TransportError> {
            if self.fail_sms {
                return Err(api_error());
            }
            self.sms
                .lock()
                .push((to.as_str().to_string(), body.to_string()));
            Ok(())
        }

        async fn place_call(&self, to: &PhoneNumber, _twiml: &str) -> Result<(), TransportError> {
            if self.fail_call {
                return Err(api_error());
            }
            self.calls.lock().push(to.as_str().to_string());
            Ok(())
        }

        async fn list_calls(&self) -> Result<Vec<crate::transport::CallRecord>, TransportError> {
            Ok(Vec::new())
        }
    }

    fn flow(transport: Arc<RecordingTransport>) -> (ReviewFlow, ReviewMetrics) {
        let metrics = ReviewMetrics::new();
        (
            ReviewFlow::new(transport, metrics.clone(), Duration::ZERO),
            metrics,
        )
    }

    fn number() -> PhoneNumber {
        PhoneNumber::new("+15551230010")
    }

    #[tokio::test]
    async fn test_full_conversation_walk() {
        let transport = Arc::new(RecordingTransport::new());
        let (flow, metrics) = flow(transport.clone());
        let store = MemoryConversationStore::new(Duration::from_secs(60));
        let from = number();

        flow.handle_inbound_sms(&store, &from, "hello", None)
            .await
            .unwrap();
        assert_eq!(transport.sms.lock().len(), 2);
        assert_eq!(store.get(&from).await.participation, Participation::Undecided);

        flow.handle_inbound_sms(&store, &from, "YES", None)
            .await
            .unwrap();
        assert_eq!(transport.sms.lock().len(), 4);
        assert_eq!(store.get(&from).await.participation, Participation::Accepted);

        flow.handle_inbound_sms(&store, &from, "john smith", None)
            .await
            .unwrap();
        assert_eq!(transport.sms.lock().len(), 6);
        assert_eq!(transport.calls.lock().len(), 1);
        assert!(transport
            .sms_bodies()
            .contains(&"Hello, John Smith!".to_string()));

        // Terminal outcome resets the conversation.
        assert!(store.get(&from).await.is_fresh());

        assert_eq!(metrics.invites_sent.get(), 1);
        assert_eq!(metrics.invites_accepted.get(), 1);
        assert_eq!(metrics.calls_placed.get(), 1);
    }

    #[tokio::test]
    async fn test_sms_failure_leaves_state_unchanged() {
        let transport = Arc::new(RecordingTransport::failing_sms());
        let (flow, metrics) = flow(transport.clone());
        let store = MemoryConversationStore::new(Duration::from_secs(60));
        let from = number();
        store.put(&from, awaiting_decision()).await;

        let err = flow
            .handle_inbound_sms(&store, &from, "yes", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Transport(_)));

        // Decision not persisted: the customer is not stuck mid-flow.
        assert_eq!(store.get(&from).await, awaiting_decision());
        assert_eq!(metrics.invites_accepted.get(), 0);
    }

    #[tokio::test]
    async fn test_call_failure_still_resets_conversation() {
        let transport = Arc::new(RecordingTransport::failing_call());
        let (flow, metrics) = flow(transport.clone());
        let store = MemoryConversationStore::new(Duration::from_secs(60));
        let from = number();
        store.put(&from, awaiting_name()).await;

        let err = flow
            .handle_inbound_sms(&store, &from, "ana", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Transport(_)));

        assert_eq!(transport.sms.lock().len(), 2);
        assert!(store.get(&from).await.is_fresh());
        assert_eq!(metrics.calls_placed.get(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_call_events_send_duplicate_thank_yous() {
        let transport = Arc::new(RecordingTransport::new());
        let (flow, metrics) = flow(transport.clone());
        let to = number();

        flow.handle_call_completed(&to).await.unwrap();
        flow.handle_call_completed(&to).await.unwrap();

        let bodies = transport.sms_bodies();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(metrics.thank_yous_sent.get(), 2);
    }
}
