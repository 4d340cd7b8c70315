//! End-to-end request/response behavior: round trips, correlation under
//! out-of-order completion, timeout independence, transferables.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use bytes::Bytes;
    use ferry_client::ClientError;
    use ferry_protocol::{ErrorCode, MessageType};
    use ferry_worker::{transfer_handler_fn, RegisterOptions, WorkerConfig};
    use std::time::Duration;

    #[tokio::test]
    async fn round_trip_returns_handler_data() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            chat_setup,
        )
        .await;

        let payload = serde_json::json!({ "topic": "general", "limit": 10 });
        let data = client
            .send(MessageType::ChatGetMessages, payload.clone())
            .await
            .unwrap();
        assert_eq!(data, payload);

        client.terminate();
    }

    #[tokio::test]
    async fn unknown_type_rejects_with_handler_not_found() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            chat_setup,
        )
        .await;

        let err = client
            .send(
                MessageType::custom("nope:nope").unwrap(),
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HandlerNotFound);

        client.terminate();
    }

    #[tokio::test]
    async fn out_of_order_responses_never_swap() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            |ctx| {
                ctx.register(
                    MessageType::custom("test:slow").unwrap(),
                    sleepy_handler(Duration::from_millis(150), "slow"),
                )?;
                ctx.register(
                    MessageType::custom("test:fast").unwrap(),
                    sleepy_handler(Duration::from_millis(5), "fast"),
                )?;
                Ok(())
            },
        )
        .await;

        let (slow, fast) = tokio::join!(
            client.send(MessageType::custom("test:slow").unwrap(), serde_json::json!({})),
            client.send(MessageType::custom("test:fast").unwrap(), serde_json::json!({})),
        );
        assert_eq!(slow.unwrap(), serde_json::json!("slow"));
        assert_eq!(fast.unwrap(), serde_json::json!("fast"));

        client.terminate();
    }

    #[tokio::test]
    async fn timeout_severs_only_its_own_call() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            |ctx| {
                ctx.register(MessageType::custom("test:never").unwrap(), never_handler())?;
                ctx.register(MessageType::ChatGetMessages, echo_handler())?;
                Ok(())
            },
        )
        .await;

        let window = Duration::from_millis(100);
        let (stuck, quick) = tokio::join!(
            client.send_with_timeout(
                MessageType::custom("test:never").unwrap(),
                serde_json::json!({}),
                window,
            ),
            client.send(MessageType::ChatGetMessages, serde_json::json!("hi")),
        );

        let err = stuck.unwrap_err();
        assert_eq!(err, ClientError::Timeout { window });
        assert_eq!(err.code(), ErrorCode::HandlerTimeout);
        assert_eq!(quick.unwrap(), serde_json::json!("hi"));
        // The timed-out entry is gone; nothing is left pending.
        assert_eq!(client.pending_count(), 0);

        client.terminate();
    }

    #[tokio::test]
    async fn handler_failure_carries_its_code() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            |ctx| {
                ctx.register(
                    MessageType::AiChat,
                    failing_handler("model backend exploded"),
                )?;
                Ok(())
            },
        )
        .await;

        let err = client
            .send(MessageType::AiChat, serde_json::json!({ "prompt": "hi" }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OperationFailed);
        match err {
            ClientError::Rejected(error) => {
                assert_eq!(error.message, "model backend exploded");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }

        client.terminate();
    }

    #[tokio::test]
    async fn payload_validator_rejects_before_handler() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            |ctx| {
                ctx.register_with(
                    MessageType::ChatSendMessage,
                    echo_handler(),
                    RegisterOptions::default().with_validator(|payload| {
                        payload
                            .get("text")
                            .map(|_| ())
                            .ok_or_else(|| "missing field: text".to_string())
                    }),
                )?;
                Ok(())
            },
        )
        .await;

        let err = client
            .send(MessageType::ChatSendMessage, serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPayload);

        let ok = client
            .send(
                MessageType::ChatSendMessage,
                serde_json::json!({ "text": "hello" }),
            )
            .await
            .unwrap();
        assert_eq!(ok["text"], serde_json::json!("hello"));

        client.terminate();
    }

    #[tokio::test]
    async fn transferables_reach_the_handler_intact() {
        let client = connected_client(
            StubEstimator::new(1000, 100),
            WorkerConfig::default(),
            |ctx| {
                ctx.register(
                    MessageType::AiChat,
                    transfer_handler_fn(|payload, transferables: Vec<Bytes>| async move {
                        let total: usize = transferables.iter().map(Bytes::len).sum();
                        Ok(serde_json::json!({
                            "prompt": payload["prompt"],
                            "attachment_bytes": total,
                        }))
                    }),
                )?;
                Ok(())
            },
        )
        .await;

        let image = Bytes::from(vec![0u8; 4096]);
        let data = client
            .send_transfer(
                MessageType::AiChat,
                serde_json::json!({ "prompt": "describe" }),
                vec![image],
            )
            .await
            .unwrap();
        assert_eq!(data["attachment_bytes"], serde_json::json!(4096));

        client.terminate();
    }
}
