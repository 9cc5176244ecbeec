//! Property tests: arbitrary action sequences keep history and version in lockstep.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use request_desk_core::error::LifecycleError;
use request_desk_core::registry::TypeRegistry;
use request_desk_core::repository::RequestRepository;
use request_desk_core::state_machine::LifecycleAction;
use request_desk_runtime::{AttachmentStagingService, RequestEngine, StagingConfig};
use request_desk_testing::{
    InMemoryRequestRepository, MockObjectStorage, RecordingDispatcher, fixtures,
};
use std::sync::Arc;

fn engine(repository: &InMemoryRequestRepository) -> RequestEngine {
    RequestEngine::new(
        Arc::new(TypeRegistry::standard().expect("standard registry")),
        Arc::new(repository.clone()),
        AttachmentStagingService::new(Arc::new(MockObjectStorage::new()), StagingConfig::default()),
        Arc::new(RecordingDispatcher::new()),
    )
}

fn action_strategy() -> impl Strategy<Value = LifecycleAction> {
    prop::sample::select(LifecycleAction::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_success_writes_exactly_one_matching_entry(
        raw in fixtures::feedback_strategy(),
        actions in prop::collection::vec(action_strategy(), 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let repository = InMemoryRequestRepository::new();
            let engine = engine(&repository);
            let investor = fixtures::investor();
            let admin = fixtures::admin();

            let mut request = engine.create_draft(&investor, "feedback", &raw).await.unwrap();
            let mut successes = 1_u64;

            for action in actions {
                let before = request.clone();
                let result = match action {
                    LifecycleAction::Submit => engine.submit(request.id, &investor, request.version).await,
                    LifecycleAction::Withdraw => engine.withdraw(request.id, &investor, request.version).await,
                    _ => engine
                        .admin_transition(request.id, &admin, action, request.version, Some("notes".to_string()))
                        .await,
                };

                match result {
                    Ok(updated) => {
                        successes += 1;
                        prop_assert_eq!(updated.version, before.version.next());
                        request = updated;
                    }
                    Err(error) => {
                        let illegal = matches!(error, LifecycleError::IllegalTransition { .. });
                        prop_assert!(illegal, "unexpected error {:?}", error);
                        let stored = repository.get(request.id).await.unwrap().unwrap();
                        prop_assert_eq!(stored.status, before.status);
                        prop_assert_eq!(stored.version, before.version);
                    }
                }
            }

            let history = repository.history(request.id).await.unwrap();
            prop_assert_eq!(history.len() as u64, successes);
            prop_assert_eq!(request.version.value(), successes);
            for (i, pair) in history.windows(2).enumerate() {
                prop_assert_eq!(pair[1].previous_status, Some(pair[0].new_status));
                prop_assert_eq!(pair[1].sequence.value(), i as u64 + 2);
            }
            Ok(())
        })?;
    }
}
