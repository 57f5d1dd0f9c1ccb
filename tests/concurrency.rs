mod common;

use async_trait::async_trait;
use common::*;
use convo_sql::error::Result;
use convo_sql::schema::ParserContext;
use convo_sql::services::{Beam, SemanticParser};
use convo_sql::{Orchestrator, PipelinePolicy, Services, TurnRequest};
use convo_sql::analysis::LexiconNounFilter;
use convo_sql::cache::MemoryCacheStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

const SQL: &str = "SELECT count(*) FROM singer";

#[tokio::test]
async fn test_turns_in_one_session_are_serialized() {
    let harness = Arc::new(Harness::new(
        FakeParser::new(beams_with_top_probability(SQL, 0.95)).with_delay(Duration::from_millis(50)),
        FakeAttribution::new(AttributionBehaviour::FailUpstream),
    ));

    let first = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .orchestrator
                .handle_turn(&TurnRequest::new("How many singers", "concert_singer"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .orchestrator
                .handle_turn(&TurnRequest::new("Show their names", "concert_singer"))
                .await
        })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // The second turn saw the first one in its history.
    assert_eq!(
        harness.parser.questions(),
        vec![
            "<s> How many singers".to_string(),
            "<s> Show their names <s> How many singers".to_string(),
        ]
    );
}

/// Parser that only answers once two parses are in flight at the same time.
struct RendezvousParser {
    barrier: Barrier,
}

#[async_trait]
impl SemanticParser for RendezvousParser {
    async fn parse(&self, _context: &ParserContext) -> Result<Vec<Beam>> {
        self.barrier.wait().await;
        Ok(beams_with_top_probability(SQL, 0.95))
    }
}

#[tokio::test]
async fn test_sessions_do_not_block_each_other() {
    let services = Services {
        parser: Arc::new(RendezvousParser {
            barrier: Barrier::new(2),
        }),
        intent_classifier: Arc::new(FakeClassifier::new("query")),
        tuning_detector: Arc::new(KeywordTuningDetector::new()),
        attribution: Arc::new(FakeAttribution::new(AttributionBehaviour::FailUpstream)),
        text_generator: Arc::new(FakeGenerator::new("unused")),
        nouns: Arc::new(LexiconNounFilter::new()),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(MemoryCacheStore::new()),
        preprocessor(),
        services,
        PipelinePolicy::default(),
    ));

    let turn = |session: &'static str, text: &'static str| {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .handle_turn(&TurnRequest::new(text, "concert_singer").in_session(session))
                .await
        })
    };

    let both = async {
        let alice = turn("alice", "How many singers");
        let bob = turn("bob", "How many stadiums");
        (alice.await, bob.await)
    };

    // Serialized sessions would never reach the rendezvous.
    let (alice, bob) = tokio::time::timeout(Duration::from_secs(5), both)
        .await
        .expect("sessions blocked each other");
    assert_eq!(alice.unwrap().unwrap().pred_sql, SQL);
    assert_eq!(bob.unwrap().unwrap().pred_sql, SQL);
    assert_eq!(orchestrator.session_count(), 2);
}
