//! Teardown semantics: terminate rejects everything outstanding, exactly
//! once, and the client stays safe to poke afterwards.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use ferry_client::{ClientError, WorkerClient};
    use ferry_protocol::MessageType;
    use ferry_worker::{handler_fn, WorkerConfig};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn terminate_rejects_all_outstanding_calls() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            |ctx| {
                ctx.register(MessageType::custom("test:never").unwrap(), never_handler())?;
                Ok(())
            },
        )
        .await;
        let client = std::sync::Arc::new(client);

        let mut calls = Vec::new();
        for _ in 0..5 {
            let client = std::sync::Arc::clone(&client);
            calls.push(tokio::spawn(async move {
                client
                    .send(MessageType::custom("test:never").unwrap(), serde_json::json!({}))
                    .await
            }));
        }

        // Let every call reach the pending table before tearing down.
        while client.pending_count() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        client.terminate();

        for call in calls {
            let result = call.await.unwrap();
            assert_eq!(result.unwrap_err(), ClientError::Terminated);
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn terminate_stops_in_flight_handler_work() {
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let started_flag = Arc::clone(&started);
        let finished_flag = Arc::clone(&finished);

        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            move |ctx| {
                let started = Arc::clone(&started_flag);
                let finished = Arc::clone(&finished_flag);
                ctx.register(
                    MessageType::custom("test:slowWrite").unwrap(),
                    handler_fn(move |_| {
                        let started = Arc::clone(&started);
                        let finished = Arc::clone(&finished);
                        async move {
                            started.store(true, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            finished.store(true, Ordering::SeqCst);
                            Ok(serde_json::Value::Null)
                        }
                    }),
                )?;
                Ok(())
            },
        )
        .await;
        let client = std::sync::Arc::new(client);

        let call = tokio::spawn({
            let client = std::sync::Arc::clone(&client);
            async move {
                client
                    .send(MessageType::custom("test:slowWrite").unwrap(), serde_json::json!({}))
                    .await
            }
        });

        // Tear down only once the handler is genuinely running.
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        client.terminate();

        assert_eq!(call.await.unwrap().unwrap_err(), ClientError::Terminated);

        // The handler was aborted with the worker; its side effect must
        // never land, no matter how long we wait.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            chat_setup,
        )
        .await;

        client.terminate();
        client.terminate();
        client.terminate();
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn send_after_terminate_is_rejected_immediately() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            chat_setup,
        )
        .await;
        client.terminate();

        let err = client
            .send(MessageType::ChatGetMessages, serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Terminated);
    }

    #[tokio::test]
    async fn send_before_initialize_is_rejected() {
        let client = WorkerClient::new();
        let err = client
            .send(MessageType::CoreGetStatus, serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::NotInitialized);
    }
}
